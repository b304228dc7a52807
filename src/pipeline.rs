//! Global orchestration: runs the full A-G pipeline over one frame, and folds it over a
//! trajectory with a progress callback.

use crate::atom::Atom;
use crate::cell::Cell;
use crate::cluster::build_cluster_graph;
use crate::cna::classify_cna;
use crate::config::{DxaConfig, IdentificationMode};
use crate::error::Result;
use crate::frame::{ClusterOutput, ClusterTransitionOutput, Frame, FrameOutput, FrameStatistics, MeshOutput, SegmentOutput};
use crate::mesh::build_interface_mesh;
use crate::neighbors::build_neighbor_list;
use crate::ptm::{DEFAULT_PTM_TOLERANCE, classify_ptm};
use crate::refine::{mark_core_atoms, trace_dislocations};
use crate::smoothing::{clip_line_pbc, coarsen_line, density_scalar, density_tensor, smooth_line, smooth_surface};
use nalgebra::Vector3;
use tracing::{info_span, instrument, warn};

/// Estimate a CNA bond cutoff from the mean nearest-neighbor distance, when the caller has
/// not provided one explicitly. A generous over-estimate (x1.35) keeps the cutoff past the
/// true first shell even for modestly disordered input.
fn estimate_cna_cutoff(positions: &[Vector3<f64>], cell: &Cell) -> f64 {
    if positions.len() < 2 {
        return 1.0;
    }
    let probe = (cell.volume() / positions.len() as f64).cbrt();
    let radius = probe * 1.8;
    let neighbors = build_neighbor_list(positions, cell, radius);
    let mut total = 0.0;
    let mut count = 0usize;
    for i in 0..positions.len() {
        let nearest = neighbors.neighbors_of(i).iter().map(|r| r.distance).fold(f64::INFINITY, f64::min);
        if nearest.is_finite() {
            total += nearest;
            count += 1;
        }
    }
    if count == 0 {
        probe
    } else {
        (total / count as f64) * 1.35
    }
}

/// Run the full extraction pipeline (A-G) on one frame, producing its output and the
/// non-fatal warnings collected along the way.
#[instrument(skip(frame, config), fields(timestep = frame.timestep, n_atoms = frame.positions.len()))]
pub fn run_frame(frame: &Frame, config: &DxaConfig) -> Result<FrameOutput> {
    config.validate()?;

    let (cell, positions) = apply_scale_factors(frame, config)?;

    let mut output = FrameOutput::new(frame.timestep);

    // A. neighbor enumeration
    let cutoff = match (config.identification_mode, config.cna_cutoff) {
        (IdentificationMode::Cna, Some(c)) => c,
        _ => estimate_cna_cutoff(&positions, &cell),
    };
    cell.check_cutoff_fits(cutoff)?;
    let neighbors = {
        let _span = info_span!("neighbor_list", cutoff).entered();
        build_neighbor_list(&positions, &cell, cutoff)
    };

    // B. structure analysis
    let mut atoms: Vec<Atom> = positions.iter().zip(tags_iter(frame)).map(|(&p, tag)| Atom::new(p, tag)).collect();
    {
        let _span = info_span!("structure_analysis", mode = ?config.identification_mode).entered();
        match config.identification_mode {
            IdentificationMode::Cna => classify_cna(&mut atoms, &positions, &cell, &neighbors, cutoff),
            IdentificationMode::Ptm => classify_ptm(&mut atoms, &positions, &cell, &neighbors, DEFAULT_PTM_TOLERANCE),
        }
    }

    // C. cluster graph
    let cluster_graph = {
        let _span = info_span!("cluster_graph").entered();
        build_cluster_graph(&mut atoms, &neighbors)
    };
    output.warnings.extend(cluster_graph.warnings().iter().cloned());

    // D. interface mesh
    let mut mesh = {
        let _span = info_span!("interface_mesh").entered();
        build_interface_mesh(&atoms, &positions, &cell, &neighbors, &cluster_graph)?
    };

    // E. Burgers loop builder
    let mut network = {
        let _span = info_span!("burgers_loops").entered();
        trace_dislocations(&mut mesh, &cluster_graph, &cell, config)
    };

    if config.mark_core_atoms {
        let _span = info_span!("core_atoms").entered();
        mark_core_atoms(&mut atoms, &positions, &cell, &mut network, cutoff);
    }

    // F. output post-processing
    {
        let _span = info_span!("smoothing", level = config.line_smoothing_level).entered();
        smooth_surface(&mut mesh, config.defect_mesh_smoothing_level);
    }

    let mut total_length = 0.0;
    let mut density_segments: Vec<(Vec<Vector3<f64>>, Vector3<f64>)> = Vec::new();
    for segment in network.live_segments() {
        if config.only_perfect_dislocations && !is_perfect_translation(&segment.cluster, segment.burgers_vector) {
            continue;
        }
        let coarsened = coarsen_line(&segment.line, config.line_point_interval);
        let smoothed = smooth_line(&coarsened, config.line_smoothing_level);
        let clipped = if config.pbc.iter().any(|&p| p) { clip_line_pbc(&smoothed, &cell) } else { vec![smoothed] };

        for piece in clipped {
            let length: f64 = piece.windows(2).map(|w| (w[1] - w[0]).norm()).sum();
            total_length += length;
            density_segments.push((piece.clone(), segment.burgers_vector));
            let core_size = resample_core_size(&segment.core_size, piece.len());
            output.segments.push(SegmentOutput {
                id: segment.id.0,
                line: piece,
                length,
                burgers_vector: segment.burgers_vector,
                burgers_vector_fractional: segment.burgers_vector_string(),
                core_size,
            });
        }
    }

    output.statistics = FrameStatistics {
        density_scalar: density_scalar(total_length, &cell),
        density_tensor: density_tensor(&density_segments, &cell),
    };

    output.clusters = cluster_graph
        .clusters()
        .map(|c| ClusterOutput {
            id: c.id.0,
            structure_type: c.structure_type,
            atom_count: c.atom_count,
            reference_orientation: c.reference_orientation,
        })
        .collect();
    output.transitions = cluster_graph
        .transitions()
        .map(|t| ClusterTransitionOutput { from: t.from.0, to: t.to.0, tm: t.tm, distance: t.distance })
        .collect();
    output.mesh = mesh_output(&mesh);

    Ok(output)
}

fn tags_iter(frame: &Frame) -> Box<dyn Iterator<Item = Option<i64>> + '_> {
    match &frame.tags {
        Some(tags) => Box::new(tags.iter().map(|&t| Some(t))),
        None => Box::new(std::iter::repeat(None)),
    }
}

fn apply_scale_factors(frame: &Frame, config: &DxaConfig) -> Result<(Cell, Vec<Vector3<f64>>)> {
    match config.scale_factors {
        None => Ok((frame.cell.clone(), frame.positions.clone())),
        Some(scales) => {
            let scale_vec = Vector3::new(scales[0], scales[1], scales[2]);
            let scale_diag = nalgebra::Matrix3::from_diagonal(&scale_vec);
            let matrix = scale_diag * frame.cell.matrix();
            let cell = Cell::new(matrix, scale_diag * frame.cell.origin(), frame.cell.pbc)?;
            let positions = frame.positions.iter().map(|p| scale_diag * p).collect();
            Ok((cell, positions))
        }
    }
}

fn is_perfect_translation(cluster: &Option<crate::cluster::ClusterIdx>, burgers_vector: Vector3<f64>) -> bool {
    if cluster.is_none() {
        return false;
    }
    // A perfect lattice translation has integer or half-integer fractional components; the
    // fractional-string formatter already reduces to the canonical denominator ladder, so a
    // translation is "perfect" when it round-trips without falling back to decimal notation.
    !crate::burgers_fraction::burgers_to_fractional_string(burgers_vector).contains('.')
}

/// Resample a segment's per-point `core_size` to `target_len` points by nearest-index lookup,
/// since output smoothing/coarsening/PBC-clipping change the line's point count and positions
/// relative to the raw traced polyline `core_size` was computed against.
fn resample_core_size(core_size: &[i32], target_len: usize) -> Vec<usize> {
    if core_size.is_empty() || target_len == 0 {
        return Vec::new();
    }
    (0..target_len)
        .map(|i| {
            let idx = if target_len == 1 { 0 } else { i * (core_size.len() - 1) / (target_len - 1) };
            core_size[idx].max(0) as usize
        })
        .collect()
}

fn mesh_output(mesh: &crate::mesh::InterfaceMesh) -> MeshOutput {
    let vertices = mesh.vertices.iter().map(|v| v.position).collect();
    let mut triangles = Vec::new();
    for face in &mesh.faces {
        let e0 = face.edge;
        let Some(e1) = mesh.edges[e0.0].next_face_edge else { continue };
        let Some(e2) = mesh.edges[e1.0].next_face_edge else { continue };
        triangles.push([mesh.edges[e0.0].vertex1.0, mesh.edges[e1.0].vertex1.0, mesh.edges[e2.0].vertex1.0]);
    }
    MeshOutput { vertices, triangles }
}

/// Run the pipeline over a trajectory of frames, invoking `progress(index, total, output)`
/// after each one completes. A frame that fails validation or geometry construction is
/// skipped with a `tracing::warn!`, and processing continues with the next frame.
pub fn run_trajectory<'a, I, F>(frames: I, config: &DxaConfig, mut progress: F) -> Vec<FrameOutput>
where
    I: IntoIterator<Item = &'a Frame>,
    F: FnMut(u32, u32, &FrameOutput),
{
    let frames: Vec<&Frame> = frames.into_iter().collect();
    let total = frames.len() as u32;
    let mut outputs = Vec::with_capacity(frames.len());
    for (index, frame) in frames.into_iter().enumerate() {
        match run_frame(frame, config) {
            Ok(output) => {
                progress(index as u32 + 1, total, &output);
                outputs.push(output);
            }
            Err(err) => {
                warn!(timestep = frame.timestep, error = %err, "skipping frame that failed extraction");
            }
        }
    }
    outputs
}
