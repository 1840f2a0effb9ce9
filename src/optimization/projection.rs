//! Levenberg-Marquardt refinement of a projection matrix.
//!
//! The twelve entries of `P` are refined to minimise
//! `Σ ‖π(P·X̃ᵢ) − xᵢ‖²`. The solve runs in Hartley-normalized coordinates so
//! all parameters have comparable magnitude; since the image normalization is
//! a similarity, the objective only changes by a constant factor.

use crate::camera::{CalibrationError, ProjectionMatrix};
use crate::correspondence::{validate_correspondences, Correspondence};
use crate::estimation::{estimate_projection, DltConfig};
use crate::geometry::{compute_reprojection_error, normalize_points_2d, normalize_points_3d};
use crate::optimization::Optimizer;

use log::{info, warn};
use nalgebra::{DVector, Vector2, Vector3};
use std::collections::HashMap;
use tiny_solver::factors::Factor;
use tiny_solver::{LevenbergMarquardtOptimizer, Optimizer as TinySolverOptimizer};

/// Cost function for `tiny_solver` optimization of a projection matrix.
///
/// Parameters are the row-major entries of `P`; residuals are the `(u, v)`
/// differences between projected and observed points.
#[derive(Debug, Clone)]
struct ReprojectionCost {
    points3d: Vec<Vector3<f64>>,
    points2d: Vec<Vector2<f64>>,
}

impl<T: nalgebra::RealField> Factor<T> for ReprojectionCost {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let p = &params[0];
        let mut residuals = DVector::zeros(self.points2d.len() * 2);

        for (i, (p3d, p2d)) in self.points3d.iter().zip(&self.points2d).enumerate() {
            let x: T = nalgebra::convert(p3d.x);
            let y: T = nalgebra::convert(p3d.y);
            let z: T = nalgebra::convert(p3d.z);
            let u: T = nalgebra::convert(p2d.x);
            let v: T = nalgebra::convert(p2d.y);

            let row = |r: usize| {
                p[4 * r].clone() * x.clone()
                    + p[4 * r + 1].clone() * y.clone()
                    + p[4 * r + 2].clone() * z.clone()
                    + p[4 * r + 3].clone()
            };
            let w = row(2);

            residuals[i * 2] = row(0) / w.clone() - u;
            residuals[i * 2 + 1] = row(1) / w - v;
        }
        residuals
    }
}

/// Geometric refinement of a projection matrix over one view.
#[derive(Debug, Clone)]
pub struct ProjectionRefinement {
    projection: ProjectionMatrix,
    correspondences: Vec<Correspondence>,
    dlt: DltConfig,
}

impl ProjectionRefinement {
    /// Creates a refinement task starting from `projection`.
    pub fn new(projection: ProjectionMatrix, correspondences: Vec<Correspondence>) -> Self {
        ProjectionRefinement {
            projection,
            correspondences,
            dlt: DltConfig::default(),
        }
    }

    /// Settings used by [`Optimizer::linear_estimation`].
    pub fn with_dlt_config(mut self, dlt: DltConfig) -> Self {
        self.dlt = dlt;
        self
    }
}

impl Optimizer for ProjectionRefinement {
    /// Refines `P` with Levenberg-Marquardt.
    ///
    /// The refined matrix replaces the current one only if it lowers the RMS
    /// reprojection error; otherwise the current estimate is kept and a
    /// warning is logged.
    fn optimize(&mut self, verbose: bool) -> Result<(), CalibrationError> {
        validate_correspondences(&self.correspondences)?;

        let world: Vec<Vector3<f64>> = self.correspondences.iter().map(|c| c.world).collect();
        let image: Vec<Vector2<f64>> = self.correspondences.iter().map(|c| c.image).collect();

        let degenerate = || {
            CalibrationError::NumericalError(
                "degenerate point configuration for normalization".to_string(),
            )
        };
        let (world_n, t_world) = normalize_points_3d(&world).ok_or_else(degenerate)?;
        let (image_n, t_image) = normalize_points_2d(&image).ok_or_else(degenerate)?;
        let t_world_inv = t_world.try_inverse().ok_or_else(degenerate)?;
        let t_image_inv = t_image.try_inverse().ok_or_else(degenerate)?;

        let initial = ProjectionMatrix::new(t_image * self.projection.matrix() * t_world_inv)
            .normalized();
        let initial_params = DVector::from_row_slice(&initial.to_row_vector());

        let mut problem = tiny_solver::Problem::new();
        let cost_function = ReprojectionCost {
            points3d: world_n,
            points2d: image_n,
        };
        let num_residuals = self.correspondences.len() * 2;
        problem.add_residual_block(num_residuals, &["params"], Box::new(cost_function), None);

        let mut initial_values = HashMap::new();
        initial_values.insert("params".to_string(), initial_params);

        if verbose {
            info!(
                "Starting projection refinement with tiny-solver Levenberg-Marquardt ({} points)",
                self.correspondences.len()
            );
        }

        let optimizer = LevenbergMarquardtOptimizer::default();
        let result = optimizer
            .optimize(&problem, &initial_values, None)
            .ok_or_else(|| CalibrationError::NumericalError("Optimization failed".to_string()))?;
        let optimized_params = result.get("params").ok_or_else(|| {
            CalibrationError::NumericalError("Optimizer returned no parameters".to_string())
        })?;

        let refined_hat = ProjectionMatrix::from_row_slice(optimized_params.as_slice());
        let refined =
            ProjectionMatrix::new(t_image_inv * refined_hat.matrix() * t_world).normalized();

        let before = compute_reprojection_error(&self.projection, &self.correspondences)?;
        match compute_reprojection_error(&refined, &self.correspondences) {
            Ok(after) if refined.is_finite() && after.rmse <= before.rmse => {
                if verbose {
                    info!(
                        "Refinement finished: rmse {:.4} px -> {:.4} px",
                        before.rmse, after.rmse
                    );
                }
                self.projection = refined;
            }
            Ok(after) => {
                warn!(
                    "Refinement raised rmse from {:.4} px to {:.4} px; keeping linear estimate",
                    before.rmse, after.rmse
                );
            }
            Err(e) => {
                warn!("Refined projection is unusable ({e}); keeping linear estimate");
            }
        }

        Ok(())
    }

    fn linear_estimation(&mut self) -> Result<(), CalibrationError> {
        let estimate = estimate_projection(&self.correspondences, &self.dlt)?;
        self.projection = estimate.projection;
        Ok(())
    }

    fn get_projection(&self) -> ProjectionMatrix {
        self.projection
    }
}
