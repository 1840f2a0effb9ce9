//! End-to-end calibration: correspondences in, camera model out.
//!
//! Stages run strictly forward: DLT estimate, optional geometric refinement,
//! RQ decomposition, camera center, reprojection statistics. Every run owns
//! its inputs and returns an owned [`CalibrationResult`].

use log::{info, warn};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::camera::{CalibrationError, Intrinsics, PinholeCamera, ProjectionMatrix};
use crate::correspondence::{Correspondence, GridObservations};
use crate::decomposition::{camera_center, decompose_projection};
use crate::estimation::{estimate_projection, DltConfig};
use crate::geometry::{compute_reprojection_error, ProjectionError};
use crate::optimization::{Optimizer, ProjectionRefinement};

/// Settings for a calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub dlt: DltConfig,
    /// Refine the DLT estimate by minimising pixel reprojection error.
    pub refine: bool,
}

impl CalibrationConfig {
    /// Loads settings from a YAML file; missing fields take their defaults.
    pub fn load_from_yaml(path: &str) -> Result<Self, CalibrationError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}

/// Everything recovered by one calibration run.
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    /// `P`, unit Frobenius norm.
    pub projection: ProjectionMatrix,
    /// `K`: upper triangular, positive diagonal, `K[2,2] = 1`.
    pub intrinsic: Matrix3<f64>,
    /// `R`: world-to-camera rotation, `det(R) = +1`.
    pub rotation: Matrix3<f64>,
    /// `C`: camera center in world coordinates.
    pub center: Vector3<f64>,
    pub intrinsics: Intrinsics,
    /// Singular values of the DLT system actually solved, descending. With
    /// normalization enabled these belong to the Hartley-normalized system.
    pub singular_values: Vec<f64>,
    /// `||Â·p̂||` of the system actually solved (normalized by default).
    pub algebraic_residual: f64,
    /// `||A·p||` of the linear estimate against the design matrix of the
    /// input coordinates.
    pub design_residual: f64,
    pub reprojection_error: ProjectionError,
    /// Whether `projection` came out of the geometric refinement.
    pub refined: bool,
}

/// Serializable snapshot of a [`CalibrationResult`], matrices as row arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub projection: [[f64; 4]; 3],
    pub intrinsic: [[f64; 3]; 3],
    pub rotation: [[f64; 3]; 3],
    pub center: [f64; 3],
    pub intrinsics: Intrinsics,
    pub singular_values: Vec<f64>,
    pub algebraic_residual: f64,
    pub design_residual: f64,
    pub reprojection_error: ProjectionError,
    pub refined: bool,
}

fn matrix3_rows(m: &Matrix3<f64>) -> [[f64; 3]; 3] {
    let mut rows = [[0.0; 3]; 3];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, value) in row.iter_mut().enumerate() {
            *value = m[(r, c)];
        }
    }
    rows
}

impl CalibrationResult {
    pub fn camera(&self) -> PinholeCamera {
        PinholeCamera {
            intrinsics: self.intrinsics,
            rotation: self.rotation,
            center: self.center,
        }
    }

    pub fn to_report(&self) -> CalibrationReport {
        CalibrationReport {
            projection: self.projection.to_rows(),
            intrinsic: matrix3_rows(&self.intrinsic),
            rotation: matrix3_rows(&self.rotation),
            center: [self.center.x, self.center.y, self.center.z],
            intrinsics: self.intrinsics,
            singular_values: self.singular_values.clone(),
            algebraic_residual: self.algebraic_residual,
            design_residual: self.design_residual,
            reprojection_error: self.reprojection_error.clone(),
            refined: self.refined,
        }
    }

    pub fn save_to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), CalibrationError> {
        let yaml_string = serde_yaml::to_string(&self.to_report())?;
        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;
        Ok(())
    }

    pub fn save_to_json<P: AsRef<Path>>(&self, path: P) -> Result<(), CalibrationError> {
        let json_string = serde_json::to_string_pretty(&self.to_report())?;
        let mut file = fs::File::create(path)?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }
}

/// Calibrates a camera from 3D-2D correspondences.
///
/// # Errors
///
/// * [`CalibrationError::InvalidInput`] - fewer than six or non-finite correspondences.
/// * [`CalibrationError::DegenerateConfiguration`] - coplanar or otherwise rank-deficient points.
/// * [`CalibrationError::SingularProjection`] - the estimated `P` has a singular left block.
/// * [`CalibrationError::NumericalError`] - SVD failure or points projecting to infinity.
pub fn calibrate(
    correspondences: &[Correspondence],
    config: &CalibrationConfig,
) -> Result<CalibrationResult, CalibrationError> {
    info!(
        "Calibrating from {} correspondences (normalize: {}, refine: {})",
        correspondences.len(),
        config.dlt.normalize,
        config.refine
    );

    let estimate = estimate_projection(correspondences, &config.dlt)?;
    let mut projection = estimate.projection;
    let mut refined = false;

    if config.refine {
        let mut refinement = ProjectionRefinement::new(projection, correspondences.to_vec())
            .with_dlt_config(config.dlt);
        match refinement.optimize(true) {
            Ok(()) => {
                refined = refinement.get_projection() != projection;
                projection = refinement.get_projection();
            }
            Err(e) => warn!("Refinement failed ({e}); using the linear estimate"),
        }
    }

    let (intrinsic, rotation) = decompose_projection(&projection)?;
    let center = camera_center(&projection)?;
    let reprojection_error = compute_reprojection_error(&projection, correspondences)?;

    info!("Calibration finished: {:?}", reprojection_error);

    Ok(CalibrationResult {
        projection,
        intrinsic,
        rotation,
        center,
        intrinsics: Intrinsics::from_matrix(&intrinsic),
        singular_values: estimate.singular_values,
        algebraic_residual: estimate.algebraic_residual,
        design_residual: estimate.design_residual,
        reprojection_error,
        refined,
    })
}

/// Builds correspondences from board measurements, then calibrates.
pub fn calibrate_grid(
    observations: &GridObservations,
    config: &CalibrationConfig,
) -> Result<CalibrationResult, CalibrationError> {
    let correspondences = observations.correspondences()?;
    calibrate(&correspondences, config)
}

/// Calibrates several independent views. Each entry of the output belongs to
/// the input at the same index; one failure does not affect the others.
pub fn calibrate_batch(
    views: Vec<GridObservations>,
    config: &CalibrationConfig,
) -> Vec<Result<CalibrationResult, CalibrationError>> {
    views
        .into_iter()
        .enumerate()
        .map(|(i, view)| {
            let result = calibrate_grid(&view, config);
            if let Err(e) = &result {
                warn!("View {i} failed to calibrate: {e}");
            }
            result
        })
        .collect()
}
