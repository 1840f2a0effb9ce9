//! The 3×4 projective camera matrix `P`.
//!
//! `P` maps homogeneous world points to homogeneous pixels and is only
//! defined up to a nonzero scale factor. [`ProjectionMatrix`] wraps the raw
//! [`Matrix3x4`] and exposes the blocks used by the decomposition stages.

use nalgebra::{Matrix3, Matrix3x4, Vector2, Vector3, Vector4};

/// A 3×4 projection matrix `P = [M | p4]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionMatrix(Matrix3x4<f64>);

impl ProjectionMatrix {
    pub fn new(matrix: Matrix3x4<f64>) -> Self {
        ProjectionMatrix(matrix)
    }

    /// Builds `P` from 12 values laid out row by row, the order used by the
    /// DLT solution vector `p`.
    pub fn from_row_slice(values: &[f64]) -> Self {
        ProjectionMatrix(Matrix3x4::from_row_slice(values))
    }

    /// Builds `P` from three rows of four values.
    pub fn from_rows(rows: &[[f64; 4]; 3]) -> Self {
        let mut matrix = Matrix3x4::zeros();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                matrix[(r, c)] = *value;
            }
        }
        ProjectionMatrix(matrix)
    }

    pub fn matrix(&self) -> &Matrix3x4<f64> {
        &self.0
    }

    /// The left 3×3 block `M = P[:, 0:3]`.
    pub fn m(&self) -> Matrix3<f64> {
        self.0.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// The last column `p4 = P[:, 3]`.
    pub fn p4(&self) -> Vector3<f64> {
        self.0.column(3).into_owned()
    }

    /// Returns `λ·P`; the projective map is unchanged for any nonzero `λ`.
    pub fn scaled(&self, lambda: f64) -> Self {
        ProjectionMatrix(self.0 * lambda)
    }

    /// Returns `P` rescaled to unit Frobenius norm.
    pub fn normalized(&self) -> Self {
        let norm = self.0.norm();
        if norm > 0.0 {
            self.scaled(1.0 / norm)
        } else {
            *self
        }
    }

    /// Projects a world point: `u = (p1·X̃)/(p3·X̃)`, `v = (p2·X̃)/(p3·X̃)`.
    ///
    /// Returns `None` when the point maps to infinity (`p3·X̃ ≈ 0`).
    pub fn project(&self, point_3d: &Vector3<f64>) -> Option<Vector2<f64>> {
        let homogeneous = self.0 * Vector4::new(point_3d.x, point_3d.y, point_3d.z, 1.0);
        let w = homogeneous.z;
        if !w.is_finite() || w.abs() <= f64::EPSILON * homogeneous.norm() {
            return None;
        }
        Some(Vector2::new(homogeneous.x / w, homogeneous.y / w))
    }

    pub fn to_rows(&self) -> [[f64; 4]; 3] {
        let mut rows = [[0.0; 4]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = self.0[(r, c)];
            }
        }
        rows
    }

    /// The 12 entries in row-major order.
    pub fn to_row_vector(&self) -> [f64; 12] {
        let mut values = [0.0; 12];
        for r in 0..3 {
            for c in 0..4 {
                values[4 * r + c] = self.0[(r, c)];
            }
        }
        values
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}
