//! Error types for the dxa crate.

use thiserror::Error;

/// Main error type for DXA operations.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Error variant fields are self-documenting via #[error] attribute
pub enum DxaError {
    /// A configuration value violates a documented bound.
    #[error("invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    /// The simulation cell is singular, or a periodic axis is narrower than twice the cutoff.
    #[error("degenerate simulation cell: {reason}")]
    CellDegenerate { reason: String },

    /// The frame parser (out of scope) ran out of input mid-frame.
    #[error("input truncated while reading frame {timestep}: {reason}")]
    InputTruncated { timestep: i64, reason: String },

    /// A per-atom structural precondition was violated; the affected atom becomes OTHER.
    #[error("invalid input at atom {atom}: {reason}")]
    InvalidInput { atom: usize, reason: String },

    /// A mesh validation invariant from the interface-mesh build failed.
    #[error("interface mesh topology broken: {reason}")]
    MeshTopologyBroken { reason: String },

    /// A singular matrix appeared during orientation inversion.
    #[error("numeric degeneracy during {operation}: {reason}")]
    NumericDegenerate { operation: String, reason: String },
}

/// Result type alias for DXA operations.
pub type Result<T> = std::result::Result<T, DxaError>;

/// A non-fatal warning recorded during a frame, surfaced on [`crate::frame::FrameOutput`] and
/// logged through `tracing::warn!` at the point it is raised.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DxaWarning {
    /// Index of the atom the warning is about, if any.
    pub atom: Option<usize>,
    /// Human-readable explanation.
    pub reason: String,
}

// === Validation helpers ===

/// Check that a cutoff radius is strictly positive.
#[inline]
pub fn check_positive_cutoff(cutoff: f64) -> Result<()> {
    if !(cutoff > 0.0) {
        return Err(DxaError::ConfigInvalid {
            reason: format!("cna_cutoff must be positive, got {cutoff}"),
        });
    }
    Ok(())
}

/// Check that `max_circuit_size` is at least 3.
///
/// The primary circuit search only ever materializes odd-length loops (it grows a BFS radius
/// of `(max_circuit_size - 1) / 2` from each side), but the *limit* itself is not required to
/// be odd — the default of 14 is even, and every even limit still permits odd-length circuits
/// up to the next odd number below it.
#[inline]
pub fn check_max_circuit_size(max_circuit_size: u32) -> Result<()> {
    if max_circuit_size < 3 {
        return Err(DxaError::ConfigInvalid {
            reason: format!("max_circuit_size must be >= 3, got {max_circuit_size}"),
        });
    }
    Ok(())
}

/// Check that `extended_circuit_size >= max_circuit_size`.
#[inline]
pub fn check_extended_circuit_size(extended: u32, max_circuit_size: u32) -> Result<()> {
    if extended < max_circuit_size {
        return Err(DxaError::ConfigInvalid {
            reason: format!(
                "extended_circuit_size ({extended}) must be >= max_circuit_size \
                 ({max_circuit_size})"
            ),
        });
    }
    Ok(())
}

/// Check that a site/atom index is within bounds.
#[inline]
pub fn check_atom_bounds(atom_idx: usize, n_atoms: usize) -> Result<()> {
    if atom_idx >= n_atoms {
        return Err(DxaError::InvalidInput {
            atom: atom_idx,
            reason: format!("atom index {atom_idx} out of bounds ({n_atoms} atoms)"),
        });
    }
    Ok(())
}
