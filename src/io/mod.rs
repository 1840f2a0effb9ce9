//! Loading calibration datasets from disk.
//!
//! Two layouts are supported:
//!
//! * YAML, mirroring [`GridObservations`]:
//!
//!   ```yaml
//!   square_size: 26.5
//!   rig: { row_threshold: 6.0, col_threshold: 8.0, border_offset: 15.0 }  # optional
//!   grid: [[1, 1, 0], [2, 4, 0], ...]
//!   pixels: [[675, 831], [651, 741], ...]
//!   ```
//!
//! * CSV with a `col,row,layer,u,v` header; `#` starts a comment line. The
//!   square size and rig are supplied by the caller.

use csv::{ReaderBuilder, Trim};
use log::info;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::camera::CalibrationError;
use crate::correspondence::{GridObservations, RigOffsets};

#[derive(Debug, Deserialize)]
struct ObservationRow {
    col: f64,
    row: f64,
    layer: f64,
    u: f64,
    v: f64,
}

/// Reads a YAML dataset. Lengths and values are checked later, when the
/// observations are turned into correspondences.
pub fn load_dataset_from_yaml<P: AsRef<Path>>(
    path: P,
) -> Result<GridObservations, CalibrationError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let observations: GridObservations = serde_yaml::from_str(&contents)?;
    info!(
        "Loaded {} grid points from {}",
        observations.grid.len(),
        path.display()
    );
    Ok(observations)
}

/// Reads `col,row,layer,u,v` rows from a CSV file.
pub fn load_observations_from_csv<P: AsRef<Path>>(
    path: P,
    square_size: f64,
    rig: RigOffsets,
) -> Result<GridObservations, CalibrationError> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_path(path)?;

    let mut grid = Vec::new();
    let mut pixels = Vec::new();
    for record in rdr.deserialize() {
        let row: ObservationRow = record?;
        grid.push([row.col, row.row, row.layer]);
        pixels.push([row.u, row.v]);
    }
    info!("Loaded {} grid points from {}", grid.len(), path.display());

    Ok(GridObservations {
        square_size,
        rig,
        grid,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "dlt_calibration_{}_{}",
            std::process::id(),
            name
        ));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_yaml_with_default_rig() {
        let path = temp_file(
            "dataset.yaml",
            "square_size: 10.0\ngrid: [[1, 2, 0], [9, 7, 1]]\npixels: [[100.5, 200.0], [300, 400]]\n",
        );
        let observations = load_dataset_from_yaml(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(observations.square_size, 10.0);
        assert_eq!(observations.rig, RigOffsets::default());
        assert_eq!(observations.grid, vec![[1.0, 2.0, 0.0], [9.0, 7.0, 1.0]]);
        assert_eq!(observations.pixels[0], [100.5, 200.0]);
    }

    #[test]
    fn test_load_yaml_with_custom_rig() {
        let path = temp_file(
            "dataset_rig.yaml",
            "square_size: 5\nrig:\n  border_offset: 2.5\ngrid: []\npixels: []\n",
        );
        let observations = load_dataset_from_yaml(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(observations.rig.border_offset, 2.5);
        assert_eq!(
            observations.rig.row_threshold,
            RigOffsets::default().row_threshold
        );
    }

    #[test]
    fn test_load_yaml_missing_file() {
        let result = load_dataset_from_yaml("does/not/exist.yaml");
        assert!(matches!(result, Err(CalibrationError::IOError(_))));
    }

    #[test]
    fn test_load_yaml_malformed() {
        let path = temp_file("bad.yaml", "square_size: [oops\n");
        let result = load_dataset_from_yaml(&path);
        fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(CalibrationError::YamlError(_))));
    }

    #[test]
    fn test_load_csv() {
        let path = temp_file(
            "points.csv",
            "col,row,layer,u,v\n# first corner\n1, 1, 0, 675, 831\n2,4,0,651.5,741\n",
        );
        let observations = load_observations_from_csv(&path, 26.5, RigOffsets::none()).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(observations.square_size, 26.5);
        assert_eq!(observations.rig, RigOffsets::none());
        assert_eq!(observations.grid, vec![[1.0, 1.0, 0.0], [2.0, 4.0, 0.0]]);
        assert_eq!(observations.pixels, vec![[675.0, 831.0], [651.5, 741.0]]);
    }

    #[test]
    fn test_load_csv_bad_value() {
        let path = temp_file("bad.csv", "col,row,layer,u,v\n1,1,zero,675,831\n");
        let result = load_observations_from_csv(&path, 1.0, RigOffsets::default());
        fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(CalibrationError::CsvError(_))));
    }
}
