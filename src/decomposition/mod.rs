//! Factorization of a projection matrix into intrinsics, rotation and
//! camera center.
//!
//! For `P = [M | p4]`, `M = K·R` with `K` upper triangular and `R` a
//! rotation, and the camera center is `C = -M⁻¹·p4`. Both results are
//! independent of the arbitrary scale of `P`.

use log::debug;
use nalgebra::{Matrix3, Vector3};

use crate::camera::{CalibrationError, ProjectionMatrix};

/// RQ decomposition of a 3×3 matrix.
///
/// Returns `(K, R)` with `K` upper triangular, `R` orthogonal and
/// `K·R = m`. No sign convention is applied; see [`correct_signs`].
pub fn rq_decompose(m: &Matrix3<f64>) -> (Matrix3<f64>, Matrix3<f64>) {
    // Row-reversal permutation: QR of the flipped transpose is RQ of `m`.
    let j = Matrix3::new(0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0);

    let qr = (j * m.transpose() * j).qr();
    let k = j * qr.r().transpose() * j;
    let r = j * qr.q().transpose() * j;

    (k, r)
}

/// Resolves the ±1 ambiguity of RQ: `T = diag(sign(diag(K)))`,
/// `K ← K·T`, `R ← T·R`. The product `K·R` is unchanged since `T·T = I`.
pub fn correct_signs(k: &Matrix3<f64>, r: &Matrix3<f64>) -> (Matrix3<f64>, Matrix3<f64>) {
    let mut t = Matrix3::identity();
    for i in 0..3 {
        if k[(i, i)] < 0.0 {
            t[(i, i)] = -1.0;
        }
    }
    (k * t, t * r)
}

/// Checks that `M` is invertible and returns its inverse.
fn invert_m(m: &Matrix3<f64>) -> Result<Matrix3<f64>, CalibrationError> {
    let det = m.determinant();
    let scale = m.norm();
    if !det.is_finite() || det.abs() <= f64::EPSILON * scale.powi(3) {
        return Err(CalibrationError::SingularProjection(format!(
            "left 3x3 block is singular (det = {det:e})"
        )));
    }
    m.try_inverse().ok_or_else(|| {
        CalibrationError::SingularProjection("left 3x3 block is not invertible".to_string())
    })
}

/// Splits `P` into the normalized intrinsic matrix `K` and rotation `R`.
///
/// Guarantees on success: `K` is upper triangular with a strictly positive
/// diagonal and `K[2,2] == 1.0`, `R` is orthonormal with `det(R) = +1`, and
/// `K·R = s·M` for the scale `s` that normalizes `K`.
///
/// # Errors
///
/// [`CalibrationError::SingularProjection`] when `M = P[:, 0:3]` is singular.
pub fn decompose_projection(
    projection: &ProjectionMatrix,
) -> Result<(Matrix3<f64>, Matrix3<f64>), CalibrationError> {
    let mut m = projection.m();
    invert_m(&m)?;

    // P is only known up to scale, including sign. Choosing det(M) > 0 makes
    // det(R) = +1 once K has a positive diagonal.
    if m.determinant() < 0.0 {
        m = -m;
    }

    let (k, r) = rq_decompose(&m);
    let (mut k, r) = correct_signs(&k, &r);

    let scale = k[(2, 2)];
    if !(scale > 0.0) {
        return Err(CalibrationError::SingularProjection(format!(
            "intrinsic matrix has a degenerate homogeneous entry ({scale:e})"
        )));
    }
    k /= scale;
    k[(2, 2)] = 1.0;

    debug!("K = {k}, R = {r}");
    Ok((k, r))
}

/// Camera center `C = -M⁻¹·p4` in world coordinates.
///
/// # Errors
///
/// [`CalibrationError::SingularProjection`] when `M` is singular.
pub fn camera_center(projection: &ProjectionMatrix) -> Result<Vector3<f64>, CalibrationError> {
    let m_inv = invert_m(&projection.m())?;
    Ok(-(m_inv * projection.p4()))
}
