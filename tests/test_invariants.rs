//! Mesh and circuit invariants from the testable-properties list: half-edge opposite
//! consistency, per-face lattice-vector closure, round-trip wrapping laws, and segment shape
//! invariants.

mod common;

use common::fcc_lattice;
use dxa::atom::Atom;
use dxa::cell::Cell;
use dxa::cluster::build_cluster_graph;
use dxa::cna::classify_cna;
use dxa::mesh::{build_interface_mesh, opposite, validate_mesh};
use dxa::neighbors::build_neighbor_list;
use nalgebra::Vector3;

fn fcc_lattice_with_vacancy(a: f64, n: usize) -> (Cell, Vec<Vector3<f64>>) {
    let (cell, mut positions) = fcc_lattice(a, n);
    let center = a * n as f64 / 2.0;
    let mut removed = false;
    positions.retain(|p| {
        if !removed && (p.x - center).abs() < 1e-6 && (p.y - center).abs() < 1e-6 && (p.z - center).abs() < 1e-6 {
            removed = true;
            false
        } else {
            true
        }
    });
    (cell, positions)
}

#[test]
fn test_opposite_is_involution_on_built_mesh() {
    let a = 3.615;
    let (cell, positions) = fcc_lattice_with_vacancy(a, 4);
    let cutoff = a * 0.9;
    let neighbors = build_neighbor_list(&positions, &cell, cutoff);
    let mut atoms: Vec<Atom> = positions.iter().map(|&p| Atom::new(p, None)).collect();
    classify_cna(&mut atoms, &positions, &cell, &neighbors, cutoff);
    let cluster_graph = build_cluster_graph(&mut atoms, &neighbors);
    let mesh = build_interface_mesh(&atoms, &positions, &cell, &neighbors, &cluster_graph).expect("mesh must build around a vacancy");

    for i in 0..mesh.edges.len() {
        let e = dxa::mesh::EdgeIdx(i);
        assert_eq!(opposite(opposite(e)), e, "[BUG] opposite must be an involution");
        let opp = opposite(e);
        assert_eq!(mesh.edges[opp.0].vertex1, mesh.edges[e.0].vertex2, "[BUG] opposite edge must run the other way");
        assert_eq!(mesh.edges[opp.0].vertex2, mesh.edges[e.0].vertex1);
    }
}

#[test]
fn test_face_lattice_vectors_sum_to_zero() {
    let a = 3.615;
    let (cell, positions) = fcc_lattice_with_vacancy(a, 4);
    let cutoff = a * 0.9;
    let neighbors = build_neighbor_list(&positions, &cell, cutoff);
    let mut atoms: Vec<Atom> = positions.iter().map(|&p| Atom::new(p, None)).collect();
    classify_cna(&mut atoms, &positions, &cell, &neighbors, cutoff);
    let cluster_graph = build_cluster_graph(&mut atoms, &neighbors);
    let mesh = build_interface_mesh(&atoms, &positions, &cell, &neighbors, &cluster_graph).expect("mesh must build");

    for face in &mesh.faces {
        let e0 = face.edge;
        let Some(e1) = mesh.edges[e0.0].next_face_edge else { continue };
        let Some(e2) = mesh.edges[e1.0].next_face_edge else { continue };
        let sum = mesh.edges[e0.0].cluster_vector + mesh.edges[e1.0].cluster_vector + mesh.edges[e2.0].cluster_vector;
        assert!(sum.norm() < 1e-6, "[BUG] lattice vectors around a face must sum to zero, got {sum:?}");
    }

    validate_mesh(&mesh).expect("[BUG] a mesh built from valid input must validate");
}

#[test]
fn test_wrap_vector_is_idempotent() {
    let cell = Cell::cubic_periodic(10.0);
    let v = Vector3::new(13.2, -7.8, 25.0);
    let once = cell.wrap_vector(v);
    let twice = cell.wrap_vector(once);
    assert!((once - twice).norm() < 1e-9, "[BUG] wrap_vector must be idempotent");
}

#[test]
fn test_reduced_absolute_round_trip() {
    let cell = Cell::cubic_periodic(12.0);
    let point = Vector3::new(3.4, -1.2, 9.9);
    let reduced = cell.reduced_from_absolute(point);
    let back = cell.absolute_from_reduced(reduced);
    assert!((point - back).norm() < 1e-9, "[BUG] reduced/absolute round trip must be exact");
}

#[test]
fn test_segment_line_has_at_least_two_points() {
    use dxa::circuit::CircuitIdx;
    use dxa::segment::{DislocationNetwork, DislocationSegment, SegmentIdx};
    let mut network = DislocationNetwork::default();
    let (forward_node, backward_node) = network.new_node_pair(CircuitIdx(0), SegmentIdx(0));
    let id = network.push(DislocationSegment {
        id: SegmentIdx(0),
        burgers_vector: Vector3::new(0.5, 0.5, 0.0),
        cluster: None,
        line: vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 1.0)],
        num_preliminary_points: 0,
        core_size: Vec::new(),
        forward_node,
        backward_node,
        replaced_by: None,
        is_dangling: false,
    });
    let segment = network.segment(id);
    assert!(segment.line.len() >= 2, "[BUG] a materialized segment must have at least two points");
}
