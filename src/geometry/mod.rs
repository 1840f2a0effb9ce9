//! Point normalization and reprojection diagnostics.

use nalgebra::{Matrix3, Matrix4, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::camera::{CalibrationError, ProjectionMatrix};
use crate::correspondence::Correspondence;

/// Hartley normalization of 2D points.
///
/// Returns the normalized points and the similarity `T` mapping the input to
/// them: centroid at the origin, mean distance `√2`. `None` if every point
/// coincides.
pub fn normalize_points_2d(points: &[Vector2<f64>]) -> Option<(Vec<Vector2<f64>>, Matrix3<f64>)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let centroid = points.iter().fold(Vector2::zeros(), |acc, p| acc + p) / n;
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if !(mean_dist > f64::EPSILON) {
        return None;
    }
    let scale = std::f64::consts::SQRT_2 / mean_dist;

    let normalized = points.iter().map(|p| (p - centroid) * scale).collect();
    let transform = Matrix3::new(
        scale,
        0.0,
        -scale * centroid.x,
        0.0,
        scale,
        -scale * centroid.y,
        0.0,
        0.0,
        1.0,
    );
    Some((normalized, transform))
}

/// Hartley normalization of 3D points (mean distance `√3`).
pub fn normalize_points_3d(points: &[Vector3<f64>]) -> Option<(Vec<Vector3<f64>>, Matrix4<f64>)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let centroid = points.iter().fold(Vector3::zeros(), |acc, p| acc + p) / n;
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if !(mean_dist > f64::EPSILON) {
        return None;
    }
    let scale = 3.0_f64.sqrt() / mean_dist;

    let normalized = points.iter().map(|p| (p - centroid) * scale).collect();
    let mut transform = Matrix4::identity() * scale;
    transform[(3, 3)] = 1.0;
    transform[(0, 3)] = -scale * centroid.x;
    transform[(1, 3)] = -scale * centroid.y;
    transform[(2, 3)] = -scale * centroid.z;
    Some((normalized, transform))
}

/// Summary statistics of pixel reprojection errors.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProjectionError {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
}

impl fmt::Debug for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Projection Error [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {} ]",
            self.rmse, self.min, self.max, self.mean, self.stddev, self.median
        )
    }
}

/// Pixel distance between each observation and the projection of its world
/// point through `projection`.
pub fn reprojection_errors(
    projection: &ProjectionMatrix,
    correspondences: &[Correspondence],
) -> Result<Vec<f64>, CalibrationError> {
    correspondences
        .iter()
        .enumerate()
        .map(|(i, c)| {
            projection
                .project(&c.world)
                .map(|uv| (uv - c.image).norm())
                .ok_or_else(|| {
                    CalibrationError::NumericalError(format!(
                        "point {i} projects to infinity"
                    ))
                })
        })
        .collect()
}

pub fn compute_reprojection_error(
    projection: &ProjectionMatrix,
    correspondences: &[Correspondence],
) -> Result<ProjectionError, CalibrationError> {
    let errors = reprojection_errors(projection, correspondences)?;
    if errors.is_empty() {
        return Err(CalibrationError::InvalidInput(
            "no correspondences to evaluate".to_string(),
        ));
    }

    let n = errors.len() as f64;
    let mean = errors.iter().sum::<f64>() / n;
    let variance = errors.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let rmse = (errors.iter().map(|x| x.powi(2)).sum::<f64>() / n).sqrt();
    let min = errors.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = errors.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

    let mut sorted_errors = errors;
    sorted_errors.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted_errors.len() / 2;
    let median = if sorted_errors.len() % 2 == 0 {
        (sorted_errors[mid - 1] + sorted_errors[mid]) / 2.0
    } else {
        sorted_errors[mid]
    };

    Ok(ProjectionError {
        rmse,
        min,
        max,
        mean,
        stddev,
        median,
    })
}
