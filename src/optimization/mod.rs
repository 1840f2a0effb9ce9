//! The `optimization` module refines a linear calibration estimate.
//!
//! The DLT minimises an algebraic error that has no direct geometric meaning.
//! The refinement here starts from that estimate and minimises the pixel
//! reprojection error of the single view with Levenberg-Marquardt
//! (`tiny_solver`). Lens distortion and multi-view adjustment are out of scope.

pub mod projection;

pub use projection::ProjectionRefinement;

use crate::camera::{CalibrationError, ProjectionMatrix};

/// A trait for projection-matrix optimization tasks.
///
/// Implementors hold a set of 3D-2D correspondences and a current estimate
/// of `P`, which `linear_estimation` initialises and `optimize` refines.
pub trait Optimizer {
    /// Performs non-linear optimization of the current projection matrix.
    ///
    /// # Arguments
    ///
    /// * `verbose` - If `true`, logs progress at `info` level.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The estimate was refined (or kept, if refinement did not
    ///   lower the reprojection error).
    /// * `Err(CalibrationError)` - The solver did not produce a solution.
    fn optimize(&mut self, verbose: bool) -> Result<(), CalibrationError>;

    /// Replaces the current estimate with the linear DLT solution.
    fn linear_estimation(&mut self) -> Result<(), CalibrationError>
    where
        Self: Sized;

    /// Retrieves the current projection matrix.
    fn get_projection(&self) -> ProjectionMatrix;
}
