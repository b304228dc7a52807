//! Input frame and per-frame output types.

use crate::atom::StructureType;
use crate::cell::Cell;
use crate::cluster::ClusterIdx;
use crate::error::DxaWarning;
use nalgebra::{Matrix3, Vector3};
use serde::Serialize;

/// One frame of input: positions plus the simulation cell they sit in. The frame parser
/// itself (LAMMPS dumps, VTK readers, etc.) is out of scope; this is the boundary type it
/// hands to the core.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Caller-assigned timestep, carried through to the output and any error messages.
    pub timestep: i64,
    /// The simulation cell this frame's positions are expressed in.
    pub cell: Cell,
    /// Atomic positions, simulation frame.
    pub positions: Vec<Vector3<f64>>,
    /// Opaque per-atom tags, if the source format carries them. Never interpreted by the
    /// core; survives into the output verbatim.
    pub tags: Option<Vec<i64>>,
}

/// Serializable cluster-graph vertex for output.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterOutput {
    /// Stable cluster id.
    pub id: usize,
    /// Crystal structure.
    pub structure_type: StructureType,
    /// Number of atoms assigned.
    pub atom_count: usize,
    /// Reference orientation.
    pub reference_orientation: Matrix3<f64>,
}

/// Serializable cluster transition for output.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterTransitionOutput {
    /// Source cluster id.
    pub from: usize,
    /// Target cluster id.
    pub to: usize,
    /// Rigid rotation.
    pub tm: Matrix3<f64>,
    /// Hop distance from the canonical cluster.
    pub distance: u32,
}

/// Serializable dislocation segment for output.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentOutput {
    /// Stable segment id.
    pub id: usize,
    /// Polyline points, simulation frame.
    pub line: Vec<Vector3<f64>>,
    /// Total line length.
    pub length: f64,
    /// Burgers vector, simulation frame.
    pub burgers_vector: Vector3<f64>,
    /// Burgers vector, fractional string form (e.g. `"[1/2 1/2 0]"`).
    pub burgers_vector_fractional: String,
    /// Number of core atoms per point, if §4.E.8 ran; empty otherwise.
    pub core_size: Vec<usize>,
}

/// Serializable interface mesh for output: vertex positions plus triangle index triples.
#[derive(Debug, Clone, Serialize, Default)]
pub struct MeshOutput {
    /// Vertex positions.
    pub vertices: Vec<Vector3<f64>>,
    /// Triangle vertex-index triples.
    pub triangles: Vec<[usize; 3]>,
}

/// Aggregate per-frame statistics.
#[derive(Debug, Clone, Serialize, Default)]
pub struct FrameStatistics {
    /// Scalar dislocation density.
    pub density_scalar: f64,
    /// Dislocation density tensor.
    pub density_tensor: Matrix3<f64>,
}

/// The complete output for one frame.
#[derive(Debug, Clone, Serialize, Default)]
pub struct FrameOutput {
    /// Timestep this output was computed for.
    pub timestep: i64,
    /// Dislocation segments.
    pub segments: Vec<SegmentOutput>,
    /// Cluster-graph clusters.
    pub clusters: Vec<ClusterOutput>,
    /// Cluster-graph transitions.
    pub transitions: Vec<ClusterTransitionOutput>,
    /// Interface mesh.
    pub mesh: MeshOutput,
    /// Aggregate statistics.
    pub statistics: FrameStatistics,
    /// Non-fatal warnings accumulated while processing this frame.
    pub warnings: Vec<DxaWarning>,
}

impl FrameOutput {
    /// A fresh, empty output for `timestep`.
    pub fn new(timestep: i64) -> Self {
        Self { timestep, ..Self::default() }
    }
}

/// Reference to a cluster in an owning [`crate::cluster::ClusterGraph`], kept distinct from
/// the bare index type so output assembly reads clearly at call sites.
pub type ClusterRef = ClusterIdx;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_output_new_is_empty() {
        let output = FrameOutput::new(7);
        assert_eq!(output.timestep, 7);
        assert!(output.segments.is_empty());
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_frame_output_serializes_to_json() {
        let mut output = FrameOutput::new(3);
        output.segments.push(SegmentOutput {
            id: 0,
            line: vec![Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)],
            length: 1.0,
            burgers_vector: Vector3::new(0.5, 0.5, 0.0),
            burgers_vector_fractional: "1/2[1 1 0]".to_string(),
            core_size: Vec::new(),
        });
        let json = serde_json::to_string(&output).expect("[BUG] FrameOutput must serialize to JSON");
        assert!(json.contains("\"timestep\":3"));
        assert!(json.contains("burgers_vector_fractional"));
    }
}
