//! 3D-2D correspondences and the calibration-board coordinate builder.
//!
//! Board points are entered as `(col, row, layer)` grid triples. The builder
//! scales them to millimetres and applies the rig's edge offsets, which model
//! physical discontinuities of the target (a border strip past a given row or
//! column, and the thickness of raised faces).

use log::debug;
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::camera::CalibrationError;

/// Minimum number of correspondences for the 11 degrees of freedom of `P`.
pub const MIN_CORRESPONDENCES: usize = 6;

/// A world point paired with its observed pixel location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub world: Vector3<f64>,
    pub image: Vector2<f64>,
}

impl Correspondence {
    pub fn new(world: Vector3<f64>, image: Vector2<f64>) -> Self {
        Correspondence { world, image }
    }

    pub fn is_finite(&self) -> bool {
        self.world.iter().chain(self.image.iter()).all(|v| v.is_finite())
    }
}

/// Checks the preconditions shared by every stage consuming correspondences.
pub fn validate_correspondences(correspondences: &[Correspondence]) -> Result<(), CalibrationError> {
    if correspondences.len() < MIN_CORRESPONDENCES {
        return Err(CalibrationError::InvalidInput(format!(
            "need at least {} correspondences, got {}",
            MIN_CORRESPONDENCES,
            correspondences.len()
        )));
    }
    if let Some(index) = correspondences.iter().position(|c| !c.is_finite()) {
        return Err(CalibrationError::InvalidInput(format!(
            "correspondence {index} has non-finite coordinates"
        )));
    }
    Ok(())
}

/// Edge corrections of the physical calibration rig.
///
/// Thresholds are expressed in grid units; the offset in the same physical
/// unit as the square size. The defaults describe the reference board and
/// should be confirmed against the actual target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigOffsets {
    /// Rows beyond this many squares get `border_offset` added.
    pub row_threshold: f64,
    /// Columns beyond this many squares get `border_offset` added.
    pub col_threshold: f64,
    pub border_offset: f64,
}

impl Default for RigOffsets {
    fn default() -> Self {
        RigOffsets {
            row_threshold: 6.0,
            col_threshold: 8.0,
            border_offset: 15.0,
        }
    }
}

impl RigOffsets {
    /// A flat target: scaling only, no edge corrections.
    pub fn none() -> Self {
        RigOffsets {
            border_offset: 0.0,
            ..Default::default()
        }
    }

    /// Maps one grid triple to world coordinates.
    pub fn apply(&self, grid: [f64; 3], square_size: f64) -> Vector3<f64> {
        let [col, row, layer] = grid;
        let mut x = col * square_size;
        let mut y = row * square_size;
        let mut z = layer * square_size;

        if y > self.row_threshold * square_size {
            y += self.border_offset;
        }
        if layer != 0.0 {
            z += self.border_offset;
        }
        if x > self.col_threshold * square_size {
            x += self.border_offset;
        }

        Vector3::new(x, y, z)
    }
}

/// Raw board measurements: grid triples and the pixels where they were seen.
///
/// This is also the on-disk dataset layout read by [`crate::io`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridObservations {
    pub square_size: f64,
    #[serde(default)]
    pub rig: RigOffsets,
    pub grid: Vec<[f64; 3]>,
    pub pixels: Vec<[f64; 2]>,
}

impl GridObservations {
    pub fn correspondences(&self) -> Result<Vec<Correspondence>, CalibrationError> {
        build_correspondences(&self.grid, &self.pixels, self.square_size, &self.rig)
    }
}

/// Converts grid triples to millimetre world points and pairs them, in
/// order, with the observed pixels.
///
/// # Errors
///
/// [`CalibrationError::InvalidInput`] when the lists differ in length, hold
/// fewer than [`MIN_CORRESPONDENCES`] entries, contain non-finite values, or
/// `square_size` is not a positive finite number.
pub fn build_correspondences(
    grid: &[[f64; 3]],
    pixels: &[[f64; 2]],
    square_size: f64,
    rig: &RigOffsets,
) -> Result<Vec<Correspondence>, CalibrationError> {
    if grid.len() != pixels.len() {
        return Err(CalibrationError::InvalidInput(format!(
            "mismatched number of grid points ({}) and pixel observations ({})",
            grid.len(),
            pixels.len()
        )));
    }
    if !(square_size.is_finite() && square_size > 0.0) {
        return Err(CalibrationError::InvalidInput(format!(
            "square size must be positive and finite, got {square_size}"
        )));
    }
    if ![rig.row_threshold, rig.col_threshold, rig.border_offset]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(CalibrationError::InvalidInput(
            "rig offsets must be finite".to_string(),
        ));
    }

    let correspondences: Vec<Correspondence> = grid
        .iter()
        .zip(pixels)
        .map(|(g, px)| {
            Correspondence::new(rig.apply(*g, square_size), Vector2::new(px[0], px[1]))
        })
        .collect();

    validate_correspondences(&correspondences)?;
    debug!(
        "Built {} correspondences (square size {}, rig {:?})",
        correspondences.len(),
        square_size,
        rig
    );

    Ok(correspondences)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn six_pixels() -> Vec<[f64; 2]> {
        vec![[0.0, 0.0]; 6]
    }

    #[test]
    fn test_rig_offsets_rules() {
        let rig = RigOffsets::default();
        let s = 26.5;

        // Inside every threshold: plain scaling.
        assert_eq!(rig.apply([1.0, 1.0, 0.0], s), Vector3::new(26.5, 26.5, 0.0));
        // Exactly on a threshold is not beyond it.
        assert_eq!(rig.apply([8.0, 6.0, 0.0], s), Vector3::new(212.0, 159.0, 0.0));
        // Row past 6 squares.
        assert_eq!(rig.apply([2.0, 7.0, 0.0], s), Vector3::new(53.0, 200.5, 0.0));
        // Raised face.
        assert_eq!(rig.apply([2.0, 4.0, 1.0], s), Vector3::new(53.0, 106.0, 41.5));
        // All three corrections at once.
        assert_eq!(
            rig.apply([9.0, 7.0, 6.0], s),
            Vector3::new(253.5, 200.5, 174.0)
        );
    }

    #[test]
    fn test_rig_offsets_none_only_scales() {
        let rig = RigOffsets::none();
        assert_eq!(rig.apply([9.0, 7.0, 6.0], 10.0), Vector3::new(90.0, 70.0, 60.0));
    }

    #[test]
    fn test_custom_rig_layout() {
        let rig = RigOffsets {
            row_threshold: 2.0,
            col_threshold: 3.0,
            border_offset: 5.0,
        };
        assert_eq!(rig.apply([4.0, 3.0, 0.0], 10.0), Vector3::new(45.0, 35.0, 0.0));
        assert_eq!(rig.apply([3.0, 2.0, 1.0], 10.0), Vector3::new(30.0, 20.0, 15.0));
    }

    #[test]
    fn test_build_correspondences_pairs_in_order() {
        let grid = vec![
            [1.0, 1.0, 0.0],
            [2.0, 4.0, 0.0],
            [5.0, 4.0, 0.0],
            [6.0, 1.0, 0.0],
            [2.0, 7.0, 1.0],
            [9.0, 5.0, 6.0],
        ];
        let pixels: Vec<[f64; 2]> = (0..6).map(|i| [i as f64, 10.0 * i as f64]).collect();

        let correspondences =
            build_correspondences(&grid, &pixels, 26.5, &RigOffsets::default()).unwrap();

        assert_eq!(correspondences.len(), 6);
        assert_eq!(correspondences[1].world, Vector3::new(53.0, 106.0, 0.0));
        assert_eq!(correspondences[1].image, Vector2::new(1.0, 10.0));
        assert_eq!(correspondences[5].world, Vector3::new(253.5, 132.5, 174.0));
        assert_eq!(correspondences[5].image, Vector2::new(5.0, 50.0));
    }

    #[test]
    fn test_build_correspondences_rejects_mismatched_lengths() {
        let grid = vec![[1.0, 1.0, 0.0]; 7];
        let result = build_correspondences(&grid, &six_pixels(), 1.0, &RigOffsets::default());
        assert!(matches!(result, Err(CalibrationError::InvalidInput(_))));
    }

    #[test]
    fn test_build_correspondences_rejects_too_few_points() {
        let grid = vec![[1.0, 1.0, 0.0]; 5];
        let pixels = vec![[0.0, 0.0]; 5];
        let result = build_correspondences(&grid, &pixels, 1.0, &RigOffsets::default());
        assert!(matches!(result, Err(CalibrationError::InvalidInput(_))));
    }

    #[test]
    fn test_build_correspondences_rejects_bad_values() {
        let grid = vec![[1.0, 1.0, 0.0]; 6];
        for square_size in [0.0, -2.0, f64::NAN] {
            let result =
                build_correspondences(&grid, &six_pixels(), square_size, &RigOffsets::default());
            assert!(matches!(result, Err(CalibrationError::InvalidInput(_))));
        }

        let mut pixels = six_pixels();
        pixels[3] = [f64::INFINITY, 0.0];
        let result = build_correspondences(&grid, &pixels, 1.0, &RigOffsets::default());
        assert!(matches!(result, Err(CalibrationError::InvalidInput(_))));
    }
}
