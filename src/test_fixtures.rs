//! Shared synthetic scenes for unit tests.

use nalgebra::{Rotation3, Vector3};

use crate::camera::{Intrinsics, PinholeCamera};
use crate::correspondence::Correspondence;

/// A camera about 700 mm in front of a board-sized volume.
pub fn sample_camera() -> PinholeCamera {
    let intrinsics = Intrinsics {
        fx: 800.0,
        fy: 780.0,
        skew: 0.5,
        cx: 640.0,
        cy: 360.0,
    };
    let rotation = *Rotation3::from_euler_angles(0.1, -0.2, 0.05).matrix();
    let center = Vector3::new(120.0, 90.0, -700.0);
    PinholeCamera::new(intrinsics, rotation, center).unwrap()
}

/// A 4×3×3 lattice filling a 240×180×150 mm box.
pub fn volume_world_points() -> Vec<Vector3<f64>> {
    let mut points = Vec::new();
    for k in 0..3 {
        for j in 0..3 {
            for i in 0..4 {
                points.push(Vector3::new(
                    i as f64 * 80.0,
                    j as f64 * 90.0,
                    k as f64 * 75.0,
                ));
            }
        }
    }
    points
}

/// Six points in general position.
pub fn minimal_world_points() -> Vec<Vector3<f64>> {
    vec![
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(200.0, 0.0, 0.0),
        Vector3::new(0.0, 150.0, 0.0),
        Vector3::new(0.0, 0.0, 120.0),
        Vector3::new(180.0, 140.0, 60.0),
        Vector3::new(90.0, 30.0, 150.0),
    ]
}

/// Exact observations of `points` through `camera`.
pub fn synthetic_correspondences(
    camera: &PinholeCamera,
    points: &[Vector3<f64>],
) -> Vec<Correspondence> {
    let projection = camera.projection_matrix();
    points
        .iter()
        .map(|p| Correspondence::new(*p, projection.project(p).unwrap()))
        .collect()
}
