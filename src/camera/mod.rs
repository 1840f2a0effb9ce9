//! Camera representations recovered by the calibration pipeline.
//!
//! This module holds the shared error type, the [`Intrinsics`] view of an
//! upper-triangular intrinsic matrix, the [`ProjectionMatrix`] newtype and the
//! [`PinholeCamera`] model assembled from a decomposed projection.

use nalgebra::{Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

pub mod pinhole;
pub mod projection;

pub use pinhole::PinholeCamera;
pub use projection::ProjectionMatrix;

/// Intrinsic parameters read off a normalized intrinsic matrix `K`.
///
/// ```text
/// K = | fx  skew cx |
///     | 0   fy   cy |
///     | 0   0    1  |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub skew: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    /// Reads the parameters from `K`, dividing by `K[2,2]` so un-normalized
    /// matrices yield the same values.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        let w = k[(2, 2)];
        Intrinsics {
            fx: k[(0, 0)] / w,
            fy: k[(1, 1)] / w,
            skew: k[(0, 1)] / w,
            cx: k[(0, 2)] / w,
            cy: k[(1, 2)] / w,
        }
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, self.skew, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error(
        "Degenerate point configuration: singular value ratio {ratio:e} is below {threshold:e}"
    )]
    DegenerateConfiguration { ratio: f64, threshold: f64 },
    #[error("Singular projection: {0}")]
    SingularProjection(String),
    #[error("Point lies on or behind the camera plane")]
    PointBehindCamera,
    #[error("Focal length must be positive")]
    FocalLengthMustBePositive,
    #[error("Principal point must be finite")]
    PrincipalPointMustBeFinite,
    #[error("Rotation is not a proper orthonormal matrix")]
    InvalidRotation,
    #[error("Numerical error in computation: {0}")]
    NumericalError(String),
    #[error("Failed to process YAML: {0}")]
    YamlError(String),
    #[error("Failed to process JSON: {0}")]
    JsonError(String),
    #[error("Failed to read CSV: {0}")]
    CsvError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for CalibrationError {
    fn from(err: std::io::Error) -> Self {
        CalibrationError::IOError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CalibrationError {
    fn from(err: serde_yaml::Error) -> Self {
        CalibrationError::YamlError(err.to_string())
    }
}

impl From<serde_json::Error> for CalibrationError {
    fn from(err: serde_json::Error) -> Self {
        CalibrationError::JsonError(err.to_string())
    }
}

impl From<csv::Error> for CalibrationError {
    fn from(err: csv::Error) -> Self {
        CalibrationError::CsvError(err.to_string())
    }
}

/// Trait defining the core functionality for calibrated camera models
pub trait CameraModel {
    /// Project a 3D world point to 2D image coordinates
    fn project(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CalibrationError>;

    /// Unproject 2D image coordinates to a unit viewing ray in world coordinates
    fn unproject(&self, point_2d: &Vector2<f64>) -> Result<Vector3<f64>, CalibrationError>;

    /// Load camera parameters from a YAML file
    fn load_from_yaml(path: &str) -> Result<Self, CalibrationError>
    where
        Self: Sized;

    /// Save camera parameters to a YAML file
    fn save_to_yaml(&self, path: &str) -> Result<(), CalibrationError>;

    /// Validate camera parameters
    fn validate_params(&self) -> Result<(), CalibrationError>;
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    /// Tolerance used when checking orthonormality of a rotation.
    pub const ROTATION_TOLERANCE: f64 = 1e-6;

    pub fn validate_intrinsics(intrinsics: &Intrinsics) -> Result<(), CalibrationError> {
        if !(intrinsics.fx > 0.0 && intrinsics.fy > 0.0) {
            return Err(CalibrationError::FocalLengthMustBePositive);
        }
        if !intrinsics.cx.is_finite() || !intrinsics.cy.is_finite() || !intrinsics.skew.is_finite()
        {
            return Err(CalibrationError::PrincipalPointMustBeFinite);
        }
        Ok(())
    }

    pub fn validate_rotation(rotation: &Matrix3<f64>) -> Result<(), CalibrationError> {
        let orthogonality = (rotation.transpose() * rotation - Matrix3::identity()).norm();
        let det = rotation.determinant();
        if !(orthogonality < ROTATION_TOLERANCE && (det - 1.0).abs() < ROTATION_TOLERANCE) {
            return Err(CalibrationError::InvalidRotation);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_intrinsics_matrix_roundtrip() {
        let intrinsics = Intrinsics {
            fx: 800.0,
            fy: 780.0,
            skew: 0.5,
            cx: 640.0,
            cy: 360.0,
        };
        let k = intrinsics.to_matrix();
        assert_eq!(k[(2, 2)], 1.0);
        assert_eq!(k[(1, 0)], 0.0);
        assert_eq!(Intrinsics::from_matrix(&k), intrinsics);

        // Scaling K does not change the parameters.
        let scaled = Intrinsics::from_matrix(&(k * 3.5));
        assert_relative_eq!(scaled.fx, intrinsics.fx, epsilon = 1e-12);
        assert_relative_eq!(scaled.cy, intrinsics.cy, epsilon = 1e-12);
    }

    #[test]
    fn test_validate_intrinsics() {
        let mut intrinsics = Intrinsics {
            fx: 500.0,
            fy: 500.0,
            skew: 0.0,
            cx: 320.0,
            cy: 240.0,
        };
        assert!(validation::validate_intrinsics(&intrinsics).is_ok());

        intrinsics.fy = -1.0;
        assert!(matches!(
            validation::validate_intrinsics(&intrinsics),
            Err(CalibrationError::FocalLengthMustBePositive)
        ));

        intrinsics.fy = 500.0;
        intrinsics.cx = f64::NAN;
        assert!(matches!(
            validation::validate_intrinsics(&intrinsics),
            Err(CalibrationError::PrincipalPointMustBeFinite)
        ));
    }

    #[test]
    fn test_validate_rotation() {
        let rotation = *nalgebra::Rotation3::from_euler_angles(0.3, -0.1, 0.7).matrix();
        assert!(validation::validate_rotation(&rotation).is_ok());

        // A reflection is orthogonal but has determinant -1.
        let reflection = -rotation;
        assert!(matches!(
            validation::validate_rotation(&reflection),
            Err(CalibrationError::InvalidRotation)
        ));
    }
}
