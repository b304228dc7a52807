//! Burgers circuit pool and primary circuit search (§4.E.1-§4.E.3): the first stage of the
//! loop builder, which discovers closed loops on the interface mesh whose net lattice vector
//! is non-zero.

use crate::cluster::{ClusterGraph, ClusterIdx};
use crate::mesh::{EdgeIdx, InterfaceMesh, VertexIdx, opposite};
use indexmap::IndexMap;
use nalgebra::{Matrix3, Vector3};
use std::sync::Mutex;

/// Index of a circuit within a [`CircuitPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CircuitIdx(pub usize);

/// A closed loop of half-edges threaded through `next_circuit_edge`, together with the
/// bookkeeping needed to trace, refine, and eventually finalize the dislocation segment it
/// bounds.
#[derive(Debug, Clone)]
pub struct Circuit {
    /// Stable id, equal to this circuit's slot in the pool.
    pub id: CircuitIdx,
    /// First edge of the circular list.
    pub first_edge: EdgeIdx,
    /// Last edge of the circular list (its `next_circuit_edge` is `first_edge`).
    pub last_edge: EdgeIdx,
    /// Number of edges in the circuit.
    pub edge_count: u32,
    /// Tracing has not yet reached a non-dangling state.
    pub is_dangling: bool,
    /// Every neighbor across this circuit's edges is itself dangling.
    pub is_completely_blocked: bool,
    /// The dislocation segment/node this circuit belongs to, once one is created.
    pub dislocation_node: Option<usize>,
    /// Cap edges recorded for a circuit that remains dangling at the final refinement
    /// iteration, used to close it visually in the output mesh.
    pub cap_edges: Vec<EdgeIdx>,
    /// Net lattice vector accumulated around the circuit (the Burgers vector, before §4.E.7
    /// re-expression in a target frame).
    pub burgers_vector: Vector3<f64>,
    /// Cluster this circuit's Burgers vector is currently expressed in.
    pub cluster: Option<ClusterIdx>,
}

/// Arena of circuits with a mutex-guarded free list, so concurrent tracing threads (§5) can
/// allocate and release circuit slots without a crate-wide lock on the mesh itself.
#[derive(Debug, Default)]
pub struct CircuitPool {
    arena: Vec<Circuit>,
    free: Mutex<Vec<CircuitIdx>>,
}

impl CircuitPool {
    /// Allocate a circuit slot, reusing a freed one if available.
    pub fn alloc(&mut self, circuit: Circuit) -> CircuitIdx {
        let mut free = self.free.lock().expect("circuit pool mutex poisoned");
        if let Some(reused) = free.pop() {
            let mut c = circuit;
            c.id = reused;
            self.arena[reused.0] = c;
            return reused;
        }
        drop(free);
        let id = CircuitIdx(self.arena.len());
        let mut c = circuit;
        c.id = id;
        self.arena.push(c);
        id
    }

    /// Return a circuit slot to the pool, unwinding its allocation.
    pub fn free(&mut self, idx: CircuitIdx) {
        self.free.lock().expect("circuit pool mutex poisoned").push(idx);
    }

    /// Borrow a circuit.
    pub fn get(&self, idx: CircuitIdx) -> &Circuit {
        &self.arena[idx.0]
    }

    /// Mutably borrow a circuit.
    pub fn get_mut(&mut self, idx: CircuitIdx) -> &mut Circuit {
        &mut self.arena[idx.0]
    }

    /// Iterate over all live (non-freed) circuits.
    pub fn iter(&self) -> impl Iterator<Item = &Circuit> {
        let freed: std::collections::HashSet<usize> = self.free.lock().expect("circuit pool mutex poisoned").iter().map(|c| c.0).collect();
        self.arena.iter().enumerate().filter(move |(i, _)| !freed.contains(i)).map(|(_, c)| c)
    }
}

struct BfsArrival {
    parent: Option<(VertexIdx, EdgeIdx)>,
    depth: u32,
    coord: Vector3<f64>,
    tm: Matrix3<f64>,
}

fn matrices_close(a: &Matrix3<f64>, b: &Matrix3<f64>, eps: f64) -> bool {
    (a - b).abs().max() <= eps
}

fn reconstruct_path(arrivals: &IndexMap<VertexIdx, BfsArrival>, mut target: VertexIdx) -> Vec<EdgeIdx> {
    let mut edges = Vec::new();
    while let Some((parent, via)) = arrivals[&target].parent {
        edges.push(via);
        target = parent;
    }
    edges.reverse();
    edges
}

/// Walk outgoing half-edges of `v` around its fan.
fn outgoing_edges(mesh: &InterfaceMesh, v: VertexIdx) -> Vec<EdgeIdx> {
    let mut out = Vec::new();
    let mut cursor = mesh.vertices[v.0].first_edge;
    let mut guard = 0;
    while let Some(e) = cursor {
        out.push(e);
        cursor = mesh.edges[e.0].next_vertex_edge;
        guard += 1;
        if guard > mesh.edges.len() {
            break;
        }
    }
    out
}

const PHYSICAL_CLOSURE_TOLERANCE: f64 = 1e-6;
const FRANK_ROTATION_TOLERANCE: f64 = 1e-3;

/// Attempt to materialize the circuit formed by walking `path_to_u` then `edge` then the
/// reverse of `path_to_w`, validating the three conditions of §4.E.2. On success, threads
/// `next_circuit_edge` through the mesh and allocates the circuit in `pool`.
fn try_materialize(mesh: &mut InterfaceMesh, pool: &mut CircuitPool, path_to_u: &[EdgeIdx], edge: EdgeIdx, path_to_w: &[EdgeIdx]) -> Option<CircuitIdx> {
    let mut full_path: Vec<EdgeIdx> = path_to_u.to_vec();
    full_path.push(edge);
    full_path.extend(path_to_w.iter().rev().map(|&e| opposite(e)));

    if full_path.len() < 3 {
        return None;
    }

    let physical_sum: Vector3<f64> = full_path.iter().map(|&e| mesh.edges[e.0].physical_vector).sum();
    if physical_sum.norm() > PHYSICAL_CLOSURE_TOLERANCE {
        return None;
    }

    // The composed Frank rotation around the full loop was already checked against identity
    // by the caller (the two merging BFS arrivals agreeing within tolerance); nothing further
    // to recompute here.

    if circuit_intersects_existing(mesh, &full_path) {
        return None;
    }

    let lattice_sum: Vector3<f64> = full_path.iter().map(|&e| mesh.edges[e.0].cluster_vector).sum();

    let circuit_id = pool.alloc(Circuit {
        id: CircuitIdx(0),
        first_edge: full_path[0],
        last_edge: *full_path.last().unwrap(),
        edge_count: full_path.len() as u32,
        is_dangling: true,
        is_completely_blocked: false,
        dislocation_node: None,
        cap_edges: Vec::new(),
        burgers_vector: lattice_sum,
        // Resolved against the atom's cluster once the pipeline's finalization stage (§4.E.7)
        // re-expresses the vector in a target crystal frame.
        cluster: None,
    });

    for window in full_path.windows(2) {
        mesh.edges[window[0].0].next_circuit_edge = Some(window[1]);
        mesh.edges[window[0].0].circuit = Some(circuit_id.0);
    }
    let last = *full_path.last().unwrap();
    mesh.edges[last.0].next_circuit_edge = Some(full_path[0]);
    mesh.edges[last.0].circuit = Some(circuit_id.0);

    Some(circuit_id)
}

/// Simplified circuit-circuit intersection test (§4.E.3): a new circuit is rejected if any of
/// its edges already belongs to a previously materialized circuit, since two circuits sharing
/// an edge necessarily cross at that edge's endpoints.
fn circuit_intersects_existing(mesh: &InterfaceMesh, path: &[EdgeIdx]) -> bool {
    path.iter().any(|&e| mesh.edges[e.0].circuit.is_some() || mesh.edges[opposite(e).0].circuit.is_some())
}

/// Run the primary circuit search (§4.E.1) from every mesh vertex, materializing at most one
/// circuit per starting vertex.
pub fn find_primary_circuits(mesh: &mut InterfaceMesh, cluster_graph: &ClusterGraph, pool: &mut CircuitPool, max_circuit_size: u32) -> Vec<CircuitIdx> {
    let max_depth = (max_circuit_size.saturating_sub(1)) / 2;
    let mut found = Vec::new();

    for start in 0..mesh.vertices.len() {
        let v0 = VertexIdx(start);
        let mut arrivals: IndexMap<VertexIdx, BfsArrival> = IndexMap::new();
        arrivals.insert(v0, BfsArrival { parent: None, depth: 0, coord: Vector3::zeros(), tm: Matrix3::identity() });
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(v0);
        let mut materialized = None;

        'bfs: while let Some(v) = queue.pop_front() {
            let (depth, coord, tm) = {
                let a = &arrivals[&v];
                (a.depth, a.coord, a.tm)
            };
            if depth >= max_depth {
                continue;
            }
            for edge in outgoing_edges(mesh, v) {
                let w = mesh.edges[edge.0].vertex2;
                if let Some(parent_vertex) = arrivals[&v].parent.map(|(p, _)| p) {
                    if parent_vertex == w {
                        continue;
                    }
                }
                let new_coord = coord + tm * mesh.edges[edge.0].cluster_vector;
                let new_tm = match mesh.edges[edge.0].cluster_transition {
                    Some(t) => cluster_graph.transition(t).tm * tm,
                    None => tm,
                };

                if let Some(existing) = arrivals.get(&w) {
                    let coord_disagrees = (new_coord - existing.coord).amax() > crate::cluster::CA_LATTICE_VECTOR_EPSILON;
                    let rotation_agrees = matrices_close(&new_tm, &existing.tm, FRANK_ROTATION_TOLERANCE);
                    if coord_disagrees && rotation_agrees {
                        let path_to_v = reconstruct_path(&arrivals, v);
                        let path_to_w = reconstruct_path(&arrivals, w);
                        if let Some(circuit_id) = try_materialize(mesh, pool, &path_to_v, edge, &path_to_w) {
                            materialized = Some(circuit_id);
                            break 'bfs;
                        }
                    }
                    continue;
                }

                arrivals.insert(w, BfsArrival { parent: Some((v, edge)), depth: depth + 1, coord: new_coord, tm: new_tm });
                queue.push_back(w);
            }
        }

        if let Some(c) = materialized {
            found.push(c);
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_alloc_and_free_reuses_slot() {
        let mut pool = CircuitPool::default();
        let c = Circuit {
            id: CircuitIdx(0),
            first_edge: EdgeIdx(0),
            last_edge: EdgeIdx(0),
            edge_count: 3,
            is_dangling: true,
            is_completely_blocked: false,
            dislocation_node: None,
            cap_edges: Vec::new(),
            burgers_vector: Vector3::zeros(),
            cluster: None,
        };
        let id = pool.alloc(c.clone());
        assert_eq!(pool.iter().count(), 1);
        pool.free(id);
        assert_eq!(pool.iter().count(), 0);
        let id2 = pool.alloc(c);
        assert_eq!(id2, id, "[BUG] freed slot should be reused before growing the arena");
        assert_eq!(pool.iter().count(), 1);
    }
}
