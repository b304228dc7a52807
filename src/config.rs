//! Per-run configuration: crystal structure, identification mode, circuit-size bounds, and
//! smoothing/output knobs.

use crate::atom::StructureType;
use crate::error::{DxaError, Result};
use serde::{Deserialize, Serialize};

/// How per-atom crystal structure is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentificationMode {
    /// Common Neighbor Analysis.
    Cna,
    /// Polyhedral Template Matching.
    Ptm,
}

/// Configuration for one DXA run, frozen per frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DxaConfig {
    /// The crystal structure the bulk of the input is expected to be.
    pub input_crystal_structure: StructureType,
    /// CNA or PTM.
    pub identification_mode: IdentificationMode,
    /// CNA bond cutoff. Required when `identification_mode == Cna`; when `None`, estimated
    /// from nearest-neighbor density at run time.
    pub cna_cutoff: Option<f64>,
    /// Periodic boundary flags, per axis.
    pub pbc: [bool; 3],
    /// Maximum circuit size during primary search and refinement (odd, ≥ 3).
    pub max_circuit_size: u32,
    /// Maximum circuit size the incremental refinement loop grows to (≥ `max_circuit_size`).
    pub extended_circuit_size: u32,
    /// Number of Taubin smoothing iterations applied to each output polyline.
    pub line_smoothing_level: u32,
    /// Coarsening interval: drop every k-th interior polyline point before smoothing.
    pub line_point_interval: u32,
    /// Number of Taubin smoothing passes applied to the output triangle mesh.
    pub defect_mesh_smoothing_level: u32,
    /// Reject segments whose Burgers vector is not a full lattice translation.
    pub only_perfect_dislocations: bool,
    /// Run §4.E.8 core-atom identification.
    pub mark_core_atoms: bool,
    /// Index bias applied when re-associating core-atom flags to caller-owned atom ids.
    /// Pass-through only; never interpreted by the core.
    pub atom_offset: i64,
    /// Per-axis unit-conversion multiplier applied to positions and the cell matrix before
    /// any geometry runs. `None` means the input is already in its native length unit.
    pub scale_factors: Option<[f64; 3]>,
}

impl Default for DxaConfig {
    fn default() -> Self {
        Self {
            input_crystal_structure: StructureType::Fcc,
            identification_mode: IdentificationMode::Cna,
            cna_cutoff: None,
            pbc: [false, false, false],
            max_circuit_size: 14,
            extended_circuit_size: 32,
            line_smoothing_level: 4,
            line_point_interval: 2,
            defect_mesh_smoothing_level: 0,
            only_perfect_dislocations: false,
            mark_core_atoms: false,
            atom_offset: 0,
            scale_factors: None,
        }
    }
}

impl DxaConfig {
    /// Validate circuit-size bounds, cutoff sign, and the supplemental fields' constraints.
    pub fn validate(&self) -> Result<()> {
        crate::error::check_max_circuit_size(self.max_circuit_size)?;
        crate::error::check_extended_circuit_size(self.extended_circuit_size, self.max_circuit_size)?;
        if let Some(cutoff) = self.cna_cutoff {
            crate::error::check_positive_cutoff(cutoff)?;
        }
        if self.identification_mode == IdentificationMode::Cna && self.cna_cutoff.is_none() {
            // Permitted: the pipeline estimates a cutoff from nearest-neighbor density. No
            // error here, just documenting that this is the one field allowed to be absent.
        }
        if let Some(scales) = self.scale_factors {
            if scales.iter().any(|&s| s <= 0.0) {
                return Err(DxaError::ConfigInvalid { reason: "scale_factors components must be positive".to_string() });
            }
        }
        Ok(())
    }
}
