//! Implements the calibrated pinhole camera.
//!
//! A [`PinholeCamera`] is the physical reading of a projection matrix:
//! `P = K·[R | -R·C]`. It is built from a decomposed `P` and can project world
//! points, cast viewing rays and persist itself as YAML. Lens distortion is not
//! modelled.

use crate::camera::{
    validation, CalibrationError, CameraModel, Intrinsics, ProjectionMatrix,
};
use crate::decomposition::{camera_center, decompose_projection};
use nalgebra::{Matrix3, Matrix3x4, Vector2, Vector3};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::io::Write;

/// A pinhole camera with intrinsics, world-to-camera rotation and center.
///
/// # Examples
///
/// ```rust
/// use nalgebra::{Matrix3, Vector3};
/// use dlt_calibration::camera::{CameraModel, Intrinsics, PinholeCamera};
///
/// let intrinsics = Intrinsics { fx: 500.0, fy: 500.0, skew: 0.0, cx: 320.0, cy: 240.0 };
/// let camera = PinholeCamera::new(intrinsics, Matrix3::identity(), Vector3::zeros()).unwrap();
///
/// let uv = camera.project(&Vector3::new(0.1, 0.2, 1.0)).unwrap();
/// assert!((uv.x - 370.0).abs() < 1e-9);
/// assert!((uv.y - 340.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeCamera {
    pub intrinsics: Intrinsics,
    /// World-to-camera rotation `R`.
    pub rotation: Matrix3<f64>,
    /// Camera center `C` in world coordinates.
    pub center: Vector3<f64>,
}

impl PinholeCamera {
    /// Creates a camera after validating its parameters.
    ///
    /// # Errors
    ///
    /// * [`CalibrationError::FocalLengthMustBePositive`]
    /// * [`CalibrationError::PrincipalPointMustBeFinite`]
    /// * [`CalibrationError::InvalidRotation`]
    /// * [`CalibrationError::InvalidInput`] for a non-finite center
    pub fn new(
        intrinsics: Intrinsics,
        rotation: Matrix3<f64>,
        center: Vector3<f64>,
    ) -> Result<Self, CalibrationError> {
        let camera = PinholeCamera {
            intrinsics,
            rotation,
            center,
        };
        camera.validate_params()?;
        Ok(camera)
    }

    /// Decomposes `P` into a camera; see [`decompose_projection`] and
    /// [`camera_center`].
    pub fn from_projection(projection: &ProjectionMatrix) -> Result<Self, CalibrationError> {
        let (k, rotation) = decompose_projection(projection)?;
        let center = camera_center(projection)?;
        PinholeCamera::new(Intrinsics::from_matrix(&k), rotation, center)
    }

    pub fn intrinsic_matrix(&self) -> Matrix3<f64> {
        self.intrinsics.to_matrix()
    }

    /// Translation `t = -R·C` of the world origin in camera coordinates.
    pub fn translation(&self) -> Vector3<f64> {
        -(self.rotation * self.center)
    }

    /// Recomposes `P = K·[R | t]`.
    pub fn projection_matrix(&self) -> ProjectionMatrix {
        let k = self.intrinsic_matrix();
        let mut p = Matrix3x4::zeros();
        p.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(k * self.rotation));
        p.set_column(3, &(k * self.translation()));
        ProjectionMatrix::new(p)
    }
}

fn yaml_array(values: &[f64]) -> Value {
    Value::Sequence(values.iter().map(|v| Value::from(*v)).collect())
}

fn read_yaml_floats(
    node: &Value,
    name: &str,
    expected: usize,
) -> Result<Vec<f64>, CalibrationError> {
    let seq = node.as_sequence().ok_or_else(|| {
        CalibrationError::InvalidInput(format!("YAML missing '{name}' or not an array"))
    })?;
    if seq.len() != expected {
        return Err(CalibrationError::InvalidInput(format!(
            "'{name}' must have {expected} entries, found {}",
            seq.len()
        )));
    }
    seq.iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                CalibrationError::InvalidInput(format!("Invalid '{name}' entry: not a number"))
            })
        })
        .collect()
}

impl CameraModel for PinholeCamera {
    /// Projects a world point to pixels.
    ///
    /// # Errors
    ///
    /// [`CalibrationError::PointBehindCamera`] if the point's depth in the
    /// camera frame is not positive.
    fn project(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CalibrationError> {
        let p_cam = self.rotation * (point_3d - self.center);
        if p_cam.z < f64::EPSILON.sqrt() {
            return Err(CalibrationError::PointBehindCamera);
        }
        let i = &self.intrinsics;
        let x = p_cam.x / p_cam.z;
        let y = p_cam.y / p_cam.z;
        Ok(Vector2::new(
            i.fx * x + i.skew * y + i.cx,
            i.fy * y + i.cy,
        ))
    }

    /// Returns the unit viewing ray through a pixel, in world coordinates.
    fn unproject(&self, point_2d: &Vector2<f64>) -> Result<Vector3<f64>, CalibrationError> {
        let k_inv = self.intrinsic_matrix().try_inverse().ok_or_else(|| {
            CalibrationError::NumericalError("intrinsic matrix is not invertible".to_string())
        })?;
        let ray_cam = k_inv * Vector3::new(point_2d.x, point_2d.y, 1.0);
        Ok((self.rotation.transpose() * ray_cam).normalize())
    }

    /// Loads a camera saved by [`CameraModel::save_to_yaml`].
    ///
    /// Expected layout:
    ///
    /// ```yaml
    /// cam0:
    ///   camera_model: pinhole
    ///   intrinsics: [fx, fy, skew, cx, cy]
    ///   rotation: [r00, r01, r02, r10, r11, r12, r20, r21, r22]
    ///   center: [x, y, z]
    /// ```
    fn load_from_yaml(path: &str) -> Result<Self, CalibrationError> {
        let contents = fs::read_to_string(path)?;
        let doc: Value = serde_yaml::from_str(&contents)?;
        let cam = &doc["cam0"];

        let intr = read_yaml_floats(&cam["intrinsics"], "intrinsics", 5)?;
        let rot = read_yaml_floats(&cam["rotation"], "rotation", 9)?;
        let center = read_yaml_floats(&cam["center"], "center", 3)?;

        let intrinsics = Intrinsics {
            fx: intr[0],
            fy: intr[1],
            skew: intr[2],
            cx: intr[3],
            cy: intr[4],
        };

        PinholeCamera::new(
            intrinsics,
            Matrix3::from_row_slice(&rot),
            Vector3::new(center[0], center[1], center[2]),
        )
    }

    fn save_to_yaml(&self, path: &str) -> Result<(), CalibrationError> {
        let i = &self.intrinsics;
        let r = &self.rotation;
        let mut cam = Mapping::new();
        cam.insert(
            Value::String("camera_model".to_string()),
            Value::String("pinhole".to_string()),
        );
        cam.insert(
            Value::String("intrinsics".to_string()),
            yaml_array(&[i.fx, i.fy, i.skew, i.cx, i.cy]),
        );
        cam.insert(
            Value::String("rotation".to_string()),
            yaml_array(&[
                r[(0, 0)],
                r[(0, 1)],
                r[(0, 2)],
                r[(1, 0)],
                r[(1, 1)],
                r[(1, 2)],
                r[(2, 0)],
                r[(2, 1)],
                r[(2, 2)],
            ]),
        );
        cam.insert(
            Value::String("center".to_string()),
            yaml_array(&[self.center.x, self.center.y, self.center.z]),
        );

        let mut root = Mapping::new();
        root.insert(Value::String("cam0".to_string()), Value::Mapping(cam));
        let yaml_string = serde_yaml::to_string(&Value::Mapping(root))?;

        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;

        Ok(())
    }

    fn validate_params(&self) -> Result<(), CalibrationError> {
        validation::validate_intrinsics(&self.intrinsics)?;
        validation::validate_rotation(&self.rotation)?;
        if !self.center.iter().all(|v| v.is_finite()) {
            return Err(CalibrationError::InvalidInput(
                "camera center must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{sample_camera, volume_world_points};
    use approx::assert_relative_eq;

    #[test]
    fn test_project_matches_projection_matrix() {
        let camera = sample_camera();
        let p = camera.projection_matrix();

        for point in volume_world_points() {
            let direct = camera.project(&point).unwrap();
            let via_p = p.project(&point).unwrap();
            assert_relative_eq!(direct, via_p, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_project_unproject() {
        let camera = sample_camera();
        let point = Vector3::new(80.0, 40.0, 60.0);

        let uv = camera.project(&point).unwrap();
        let ray = camera.unproject(&uv).unwrap();
        let expected = (point - camera.center).normalize();

        assert_relative_eq!(ray, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_point_behind_camera() {
        let camera = sample_camera();
        let behind = camera.center - camera.rotation.transpose() * Vector3::new(0.0, 0.0, 10.0);
        assert!(matches!(
            camera.project(&behind),
            Err(CalibrationError::PointBehindCamera)
        ));
    }

    #[test]
    fn test_from_projection_roundtrip() {
        let camera = sample_camera();
        let recovered =
            PinholeCamera::from_projection(&camera.projection_matrix().scaled(-0.02)).unwrap();

        assert_relative_eq!(recovered.intrinsics.fx, camera.intrinsics.fx, epsilon = 1e-8);
        assert_relative_eq!(recovered.intrinsics.skew, camera.intrinsics.skew, epsilon = 1e-8);
        assert_relative_eq!(recovered.intrinsics.cy, camera.intrinsics.cy, epsilon = 1e-8);
        assert_relative_eq!(recovered.rotation, camera.rotation, epsilon = 1e-10);
        assert_relative_eq!(recovered.center, camera.center, epsilon = 1e-8);
    }

    #[test]
    fn test_new_rejects_invalid_rotation() {
        let camera = sample_camera();
        let result = PinholeCamera::new(camera.intrinsics, camera.rotation * 2.0, camera.center);
        assert!(matches!(result, Err(CalibrationError::InvalidRotation)));
    }

    #[test]
    fn test_save_and_load_yaml() {
        let camera = sample_camera();
        let path = std::env::temp_dir().join(format!(
            "dlt_calibration_pinhole_{}.yaml",
            std::process::id()
        ));
        let path = path.to_str().unwrap();

        camera.save_to_yaml(path).unwrap();
        let loaded = PinholeCamera::load_from_yaml(path).unwrap();
        std::fs::remove_file(path).unwrap();

        assert_relative_eq!(loaded.intrinsics.fx, camera.intrinsics.fx, epsilon = 1e-12);
        assert_relative_eq!(loaded.intrinsics.skew, camera.intrinsics.skew, epsilon = 1e-12);
        assert_relative_eq!(loaded.rotation, camera.rotation, epsilon = 1e-12);
        assert_relative_eq!(loaded.center, camera.center, epsilon = 1e-12);
    }

    #[test]
    fn test_load_from_yaml_missing_field() {
        let path = std::env::temp_dir().join(format!(
            "dlt_calibration_pinhole_missing_{}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, "cam0:\n  intrinsics: [1.0, 1.0, 0.0, 0.0, 0.0]\n").unwrap();
        let result = PinholeCamera::load_from_yaml(path.to_str().unwrap());
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(CalibrationError::InvalidInput(_))));
    }
}
