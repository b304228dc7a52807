//! Simulation cell arithmetic: periodic wrapping and minimum-image vectors.
//!
//! Mirrors the reference engine's `AnalysisEnvironment`: a 3x3 basis matrix plus an origin
//! and per-axis periodic flags, with wrapping done through the reciprocal (inverse) matrix
//! rather than assuming an orthogonal cell.

use crate::error::{DxaError, Result};
use nalgebra::{Matrix3, Vector3};

/// A 3x3 simulation cell: column `i` of `matrix` is the cell's `i`-th basis vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
    origin: Vector3<f64>,
    /// Per-axis periodic boundary flags.
    pub pbc: [bool; 3],
}

impl Cell {
    /// Construct a cell from its basis matrix, origin and periodic flags.
    ///
    /// # Errors
    /// Returns [`DxaError::CellDegenerate`] if `det(matrix) == 0`.
    pub fn new(matrix: Matrix3<f64>, origin: Vector3<f64>, pbc: [bool; 3]) -> Result<Self> {
        let det = matrix.determinant();
        if det.abs() < 1e-12 {
            return Err(DxaError::CellDegenerate {
                reason: format!("cell matrix is singular (det = {det})"),
            });
        }
        let inverse = matrix
            .try_inverse()
            .ok_or_else(|| DxaError::CellDegenerate {
                reason: "cell matrix has no inverse".to_string(),
            })?;
        Ok(Self { matrix, inverse, origin, pbc })
    }

    /// A cubic cell of edge length `a` with no periodicity, origin at zero.
    pub fn cubic_non_periodic(a: f64) -> Self {
        Self::new(Matrix3::from_diagonal_element(a), Vector3::zeros(), [false; 3])
            .expect("positive edge length is never degenerate")
    }

    /// A cubic cell of edge length `a`, periodic on all axes, origin at zero.
    pub fn cubic_periodic(a: f64) -> Self {
        Self::new(Matrix3::from_diagonal_element(a), Vector3::zeros(), [true; 3])
            .expect("positive edge length is never degenerate")
    }

    /// The basis matrix.
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Cell origin in simulation-frame coordinates.
    pub fn origin(&self) -> Vector3<f64> {
        self.origin
    }

    /// Unsigned cell volume, `|det(matrix)|`.
    pub fn volume(&self) -> f64 {
        self.matrix.determinant().abs()
    }

    /// Perpendicular height of the cell along axis `axis` (0=x, 1=y, 2=z): the cell volume
    /// divided by the area spanned by the other two basis vectors.
    pub fn perpendicular_height(&self, axis: usize) -> f64 {
        let a = self.matrix.column((axis + 1) % 3).into_owned();
        let b = self.matrix.column((axis + 2) % 3).into_owned();
        let cross = a.cross(&b);
        let area = cross.norm();
        if area < 1e-300 { 0.0 } else { self.volume() / area }
    }

    /// Validate that every periodic axis is wider than `2 * cutoff`.
    ///
    /// # Errors
    /// Returns [`DxaError::CellDegenerate`] on the first axis that is too narrow.
    pub fn check_cutoff_fits(&self, cutoff: f64) -> Result<()> {
        for axis in 0..3 {
            if self.pbc[axis] {
                let height = self.perpendicular_height(axis);
                if height <= 2.0 * cutoff {
                    return Err(DxaError::CellDegenerate {
                        reason: format!(
                            "periodic cell is too narrow along axis {axis}: height {height} \
                             does not exceed 2x cutoff {cutoff}"
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Map an absolute (simulation-frame) point to reduced (fractional) coordinates.
    pub fn reduced_from_absolute(&self, point: Vector3<f64>) -> Vector3<f64> {
        self.inverse * (point - self.origin)
    }

    /// Map reduced (fractional) coordinates back to an absolute point.
    pub fn absolute_from_reduced(&self, reduced: Vector3<f64>) -> Vector3<f64> {
        self.matrix * reduced + self.origin
    }

    /// Wrap a displacement vector into its minimum image under the active `pbc` flags.
    ///
    /// Non-periodic axes are returned unmodified. This is the cell analogue of the
    /// reference engine's `wrapVector`.
    pub fn wrap_vector(&self, v: Vector3<f64>) -> Vector3<f64> {
        let mut reduced = self.inverse * v;
        for axis in 0..3 {
            if self.pbc[axis] {
                reduced[axis] -= reduced[axis].round();
            }
        }
        self.matrix * reduced
    }

    /// Wrap an absolute point into the cell's fundamental domain along periodic axes.
    pub fn wrap_point(&self, point: Vector3<f64>) -> Vector3<f64> {
        let mut reduced = self.reduced_from_absolute(point);
        for axis in 0..3 {
            if self.pbc[axis] {
                reduced[axis] -= reduced[axis].floor();
            }
        }
        self.absolute_from_reduced(reduced)
    }

    /// Minimum-image distance between two absolute points.
    pub fn minimum_image_distance(&self, a: Vector3<f64>, b: Vector3<f64>) -> f64 {
        self.wrap_vector(b - a).norm()
    }

    /// Squared minimum-image distance (avoids the sqrt on hot paths).
    pub fn minimum_image_distance_squared(&self, a: Vector3<f64>, b: Vector3<f64>) -> f64 {
        self.wrap_vector(b - a).norm_squared()
    }
}
