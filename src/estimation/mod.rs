//! Projection matrix estimation with the Direct Linear Transform.
//!
//! Each correspondence `(X, Y, Z) -> (u, v)` contributes two rows to the
//! homogeneous system `A·p = 0`:
//!
//! ```text
//! [-X -Y -Z -1   0  0  0  0   uX uY uZ u]
//! [ 0  0  0  0  -X -Y -Z -1   vX vY vZ v]
//! ```
//!
//! The solution minimising `||A·p||` subject to `||p|| = 1` is the right
//! singular vector of the smallest singular value, reshaped row by row into
//! the 3×4 matrix `P`.

use log::{debug, info};
use nalgebra::{DMatrix, DVector, Matrix3x4, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::camera::{CalibrationError, ProjectionMatrix};
use crate::correspondence::{validate_correspondences, Correspondence};
use crate::geometry::{normalize_points_2d, normalize_points_3d};

/// Solver settings for [`estimate_projection`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DltConfig {
    /// Hartley-normalize world and image points before building `A`.
    pub normalize: bool,
    /// Lower bound on `σ₁₁ / σ₁`; below it `A` is treated as rank < 11.
    pub min_singular_ratio: f64,
}

impl Default for DltConfig {
    fn default() -> Self {
        DltConfig {
            normalize: true,
            min_singular_ratio: 1e-10,
        }
    }
}

/// Output of the DLT solve.
#[derive(Debug, Clone)]
pub struct ProjectionEstimate {
    /// `P` in the input coordinate frame, scaled to unit Frobenius norm.
    pub projection: ProjectionMatrix,
    /// Singular values of the system actually solved, in descending order.
    /// With [`DltConfig::normalize`] this is the Hartley-normalized system,
    /// not [`design_matrix`] of the input points.
    pub singular_values: Vec<f64>,
    /// `||Â·p̂||` of the system actually solved; equals its smallest singular
    /// value.
    pub algebraic_residual: f64,
    /// `||A·p||` with `A = design_matrix(correspondences)` and `p` the
    /// returned unit-norm `P`, comparable across both modes.
    pub design_residual: f64,
}

impl ProjectionEstimate {
    pub fn smallest_singular_value(&self) -> f64 {
        self.singular_values.last().copied().unwrap_or(0.0)
    }

    /// `σ₁₁ / σ₁`, the quantity tested against [`DltConfig::min_singular_ratio`].
    pub fn rank_ratio(&self) -> f64 {
        singular_ratio(&self.singular_values)
    }
}

/// Builds the `2N×12` coefficient matrix `A` from raw point coordinates.
pub fn design_matrix(correspondences: &[Correspondence]) -> DMatrix<f64> {
    let world: Vec<Vector3<f64>> = correspondences.iter().map(|c| c.world).collect();
    let image: Vec<Vector2<f64>> = correspondences.iter().map(|c| c.image).collect();
    design_matrix_from_points(&world, &image)
}

fn design_matrix_from_points(world: &[Vector3<f64>], image: &[Vector2<f64>]) -> DMatrix<f64> {
    let mut a = DMatrix::<f64>::zeros(2 * world.len(), 12);

    for (i, (pw, pi)) in world.iter().zip(image).enumerate() {
        let (x, y, z) = (pw.x, pw.y, pw.z);
        let (u, v) = (pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -z;
        a[(r0, 3)] = -1.0;
        a[(r0, 8)] = u * x;
        a[(r0, 9)] = u * y;
        a[(r0, 10)] = u * z;
        a[(r0, 11)] = u;

        a[(r1, 4)] = -x;
        a[(r1, 5)] = -y;
        a[(r1, 6)] = -z;
        a[(r1, 7)] = -1.0;
        a[(r1, 8)] = v * x;
        a[(r1, 9)] = v * y;
        a[(r1, 10)] = v * z;
        a[(r1, 11)] = v;
    }

    a
}

/// `σ[n-2] / σ[0]` for singular values sorted in descending order.
fn singular_ratio(sorted_desc: &[f64]) -> f64 {
    match (sorted_desc.first(), sorted_desc.len()) {
        (Some(&largest), n) if n >= 2 && largest > 0.0 => sorted_desc[n - 2] / largest,
        _ => 0.0,
    }
}

/// Estimates `P` from at least six non-coplanar correspondences.
///
/// # Errors
///
/// * [`CalibrationError::InvalidInput`] for fewer than six or non-finite correspondences.
/// * [`CalibrationError::DegenerateConfiguration`] when `A` has rank < 11, e.g. all
///   world points on one plane.
/// * [`CalibrationError::NumericalError`] if the SVD or de-normalization fails.
pub fn estimate_projection(
    correspondences: &[Correspondence],
    config: &DltConfig,
) -> Result<ProjectionEstimate, CalibrationError> {
    validate_correspondences(correspondences)?;

    let world: Vec<Vector3<f64>> = correspondences.iter().map(|c| c.world).collect();
    let image: Vec<Vector2<f64>> = correspondences.iter().map(|c| c.image).collect();

    let (a, transforms) = if config.normalize {
        let degenerate = || CalibrationError::DegenerateConfiguration {
            ratio: 0.0,
            threshold: config.min_singular_ratio,
        };
        let (world_n, t_world) = normalize_points_3d(&world).ok_or_else(degenerate)?;
        let (image_n, t_image) = normalize_points_2d(&image).ok_or_else(degenerate)?;
        (
            design_matrix_from_points(&world_n, &image_n),
            Some((t_world, t_image)),
        )
    } else {
        (design_matrix_from_points(&world, &image), None)
    };

    let svd = a.clone().svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| CalibrationError::NumericalError("SVD did not return V^T".to_string()))?;

    let mut singular_values: Vec<f64> = svd.singular_values.iter().copied().collect();
    singular_values.sort_by(|a, b| b.total_cmp(a));

    let ratio = singular_ratio(&singular_values);
    debug!("DLT singular values: {:?}", singular_values);
    if !(ratio >= config.min_singular_ratio) {
        return Err(CalibrationError::DegenerateConfiguration {
            ratio,
            threshold: config.min_singular_ratio,
        });
    }

    let min_index = svd.singular_values.imin();
    let p: DVector<f64> = v_t.row(min_index).transpose();
    let algebraic_residual = (&a * &p).norm();

    let mut p_hat = Matrix3x4::zeros();
    for r in 0..3 {
        for c in 0..4 {
            p_hat[(r, c)] = p[4 * r + c];
        }
    }

    let projection = match transforms {
        Some((t_world, t_image)) => {
            let t_image_inv = t_image.try_inverse().ok_or_else(|| {
                CalibrationError::NumericalError(
                    "image normalization is not invertible".to_string(),
                )
            })?;
            ProjectionMatrix::new(t_image_inv * p_hat * t_world).normalized()
        }
        None => ProjectionMatrix::new(p_hat),
    };

    if !projection.is_finite() {
        return Err(CalibrationError::NumericalError(
            "DLT produced a non-finite projection matrix".to_string(),
        ));
    }

    let design_residual =
        (design_matrix(correspondences) * DVector::from_row_slice(&projection.to_row_vector()))
            .norm();

    let estimate = ProjectionEstimate {
        projection,
        singular_values,
        algebraic_residual,
        design_residual,
    };
    info!(
        "DLT solved from {} correspondences (rank ratio {:.3e}, residual {:.3e}, design residual {:.3e})",
        correspondences.len(),
        estimate.rank_ratio(),
        estimate.algebraic_residual,
        estimate.design_residual
    );

    Ok(estimate)
}
