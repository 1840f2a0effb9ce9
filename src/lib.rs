//! DLT Calibration Library
//!
//! Monocular camera calibration from known 3D world points and their observed
//! pixel locations. The pipeline runs in four stages:
//! - Correspondence building from calibration-board grid coordinates
//! - Projection matrix estimation with the Direct Linear Transform (SVD)
//! - RQ decomposition of the projection matrix into intrinsics and rotation
//! - Camera center recovery as the null space of the projection matrix
//!
//! An optional Levenberg-Marquardt refinement of the projection matrix uses
//! the tiny-solver optimization framework.

pub mod camera;
pub mod correspondence;
pub mod decomposition;
pub mod estimation;
pub mod geometry;
pub mod io;
pub mod optimization;
pub mod pipeline;

#[cfg(test)]
mod test_fixtures;

// Re-export commonly used types
pub use camera::{CalibrationError, CameraModel, Intrinsics, PinholeCamera, ProjectionMatrix};
pub use correspondence::{build_correspondences, Correspondence, GridObservations, RigOffsets};
pub use decomposition::{camera_center, decompose_projection, rq_decompose};
pub use estimation::{estimate_projection, DltConfig, ProjectionEstimate};
pub use optimization::{Optimizer, ProjectionRefinement};
pub use pipeline::{
    calibrate, calibrate_batch, calibrate_grid, CalibrationConfig, CalibrationReport,
    CalibrationResult,
};
