//! Cluster graph: connected-component grouping of crystalline atoms by compatible local
//! orientation, and the rigid-rotation transitions between neighboring clusters.

use crate::atom::{Atom, AtomFlags, StructureType};
use crate::error::DxaWarning;
use crate::neighbors::NeighborList;
use nalgebra::{Matrix3, Vector3};
use std::collections::VecDeque;
use tracing::warn;

/// Tolerance for comparing composed orientations when deciding whether two atoms belong to
/// the same cluster (`CA_TRANSITION_MATRIX_EPSILON`).
pub const CA_TRANSITION_MATRIX_EPSILON: f64 = 1e-3;

/// Tolerance for comparing lattice-vector components (`CA_LATTICE_VECTOR_EPSILON`).
pub const CA_LATTICE_VECTOR_EPSILON: f64 = 1e-3;

/// Index of a cluster within a [`ClusterGraph`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterIdx(pub usize);

/// Index of a transition within a [`ClusterGraph`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionIdx(pub usize);

/// A non-empty set of crystalline atoms sharing a common lattice frame.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Stable id, equal to this cluster's index in the arena.
    pub id: ClusterIdx,
    /// Crystal structure shared by every atom in the cluster.
    pub structure_type: StructureType,
    /// Number of atoms assigned to this cluster.
    pub atom_count: usize,
    /// Reference orientation: maps canonical lattice vectors to simulation-frame vectors.
    pub reference_orientation: Matrix3<f64>,
    /// Outgoing transitions, in creation order.
    pub transitions: Vec<TransitionIdx>,
    /// Shortest non-self-transition hop count from the canonical (largest) cluster.
    pub distance: u32,
}

/// A directed edge from one cluster to another, annotated with the rigid rotation mapping
/// lattice vectors in the source cluster's frame to the target's frame.
#[derive(Debug, Clone, Copy)]
pub struct ClusterTransition {
    /// Source cluster.
    pub from: ClusterIdx,
    /// Target cluster.
    pub to: ClusterIdx,
    /// Rigid rotation mapping `from`'s lattice frame to `to`'s.
    pub tm: Matrix3<f64>,
    /// Index of the reverse transition (`to -> from`).
    pub reverse: TransitionIdx,
    /// Shortest hop count between the two clusters.
    pub distance: u32,
    /// Number of atom-atom bonds observed crossing this boundary.
    pub area: u32,
}

impl ClusterTransition {
    /// Whether this is a self-transition (`from == to`, `tm` should be identity).
    pub fn is_self(&self) -> bool {
        self.from == self.to
    }
}

/// The cluster graph for one frame: an arena of clusters plus their transitions.
#[derive(Debug, Clone, Default)]
pub struct ClusterGraph {
    clusters: Vec<Cluster>,
    transitions: Vec<ClusterTransition>,
    warnings: Vec<DxaWarning>,
}

impl ClusterGraph {
    /// Number of clusters.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Whether the graph has no clusters.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Borrow a cluster by index.
    pub fn cluster(&self, idx: ClusterIdx) -> &Cluster {
        &self.clusters[idx.0]
    }

    /// Borrow a transition by index.
    pub fn transition(&self, idx: TransitionIdx) -> &ClusterTransition {
        &self.transitions[idx.0]
    }

    /// Iterate over all clusters.
    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter()
    }

    /// Iterate over all transitions.
    pub fn transitions(&self) -> impl Iterator<Item = &ClusterTransition> {
        self.transitions.iter()
    }

    /// Warnings collected while building this graph (e.g. a singular local orientation that
    /// left a transition unresolved).
    pub fn warnings(&self) -> &[DxaWarning] {
        &self.warnings
    }

    fn push_cluster(&mut self, structure_type: StructureType, reference_orientation: Matrix3<f64>) -> ClusterIdx {
        let id = ClusterIdx(self.clusters.len());
        self.clusters.push(Cluster {
            id,
            structure_type,
            atom_count: 0,
            reference_orientation,
            transitions: Vec::new(),
            distance: u32::MAX,
        });
        id
    }

    /// Look up the existing transition `from -> to`, if any has been recorded.
    pub fn transition_between(&self, from: ClusterIdx, to: ClusterIdx) -> Option<TransitionIdx> {
        self.find_transition(from, to)
    }

    /// Find the existing transition `from -> to`, if any.
    fn find_transition(&self, from: ClusterIdx, to: ClusterIdx) -> Option<TransitionIdx> {
        self.clusters[from.0]
            .transitions
            .iter()
            .copied()
            .find(|&t| self.transitions[t.0].to == to)
    }

    /// Record (or retrieve) the transition `from -> to` with rotation `tm`, creating both it
    /// and its reverse if they don't already exist, and incrementing `area`.
    fn record_transition(&mut self, from: ClusterIdx, to: ClusterIdx, tm: Matrix3<f64>) -> TransitionIdx {
        if let Some(existing) = self.find_transition(from, to) {
            self.transitions[existing.0].area += 1;
            return existing;
        }
        let fwd_idx = TransitionIdx(self.transitions.len());
        let rev_idx = TransitionIdx(self.transitions.len() + 1);
        self.transitions.push(ClusterTransition {
            from,
            to,
            tm,
            reverse: rev_idx,
            distance: u32::MAX,
            area: 1,
        });
        self.transitions.push(ClusterTransition {
            from: to,
            to: from,
            tm: tm.transpose(),
            reverse: fwd_idx,
            distance: u32::MAX,
            area: 1,
        });
        self.clusters[from.0].transitions.push(fwd_idx);
        self.clusters[to.0].transitions.push(rev_idx);
        fwd_idx
    }

    /// BFS distance relaxation over the self-transition-free subgraph, rooted at the largest
    /// cluster (the "canonical" one, per §4.C).
    fn relax_distances(&mut self) {
        if self.clusters.is_empty() {
            return;
        }
        let root = self
            .clusters
            .iter()
            .max_by_key(|c| c.atom_count)
            .map(|c| c.id)
            .unwrap();

        self.clusters[root.0].distance = 0;
        let mut queue = VecDeque::new();
        queue.push_back(root);
        while let Some(current) = queue.pop_front() {
            let current_dist = self.clusters[current.0].distance;
            let outgoing = self.clusters[current.0].transitions.clone();
            for t_idx in outgoing {
                let t = self.transitions[t_idx.0];
                if t.is_self() {
                    continue;
                }
                if self.clusters[t.to.0].distance > current_dist + 1 {
                    self.clusters[t.to.0].distance = current_dist + 1;
                    queue.push_back(t.to);
                }
                self.transitions[t_idx.0].distance = self.clusters[t.to.0].distance;
                self.transitions[t.reverse.0].distance = self.clusters[t.to.0].distance;
            }
        }
    }
}

/// Build the cluster graph by breadth-first walking crystalline atoms (§4.C).
///
/// Atoms with `structure_type == Other` are never visited. Every crystalline atom that is
/// reachable through crystalline neighbors ends up assigned to exactly one cluster; an atom
/// with no crystalline seed at all (empty input, all-OTHER frame) yields an empty graph.
pub fn build_cluster_graph(atoms: &mut [Atom], neighbors: &NeighborList) -> ClusterGraph {
    let mut graph = ClusterGraph::default();
    let n = atoms.len();
    let mut visited = vec![false; n];

    for seed in 0..n {
        if visited[seed] || !atoms[seed].is_crystalline() {
            continue;
        }

        let cluster_id = graph.push_cluster(atoms[seed].structure_type, atoms[seed].orientation);
        atoms[seed].cluster = Some(cluster_id);
        visited[seed] = true;
        graph.clusters[cluster_id.0].atom_count += 1;

        let mut queue = VecDeque::new();
        queue.push_back(seed);

        while let Some(current) = queue.pop_front() {
            let current_cluster = atoms[current].cluster.unwrap();
            let current_orientation = atoms[current].orientation;

            for rec in neighbors.neighbors_of(current) {
                let j = rec.index;
                if !atoms[j].is_crystalline() {
                    continue;
                }

                // The candidate transition mapping atom `current`'s frame to atom `j`'s frame.
                let candidate_tm = match current_orientation.try_inverse() {
                    Some(inv) => atoms[j].orientation * inv,
                    None => {
                        atoms[current].flags.insert(AtomFlags::DISCLINATION_BORDER);
                        warn!(atom = current, "singular local orientation; cluster transition across this atom could not be resolved");
                        graph.warnings.push(DxaWarning {
                            atom: Some(current),
                            reason: "singular local orientation; cluster transition unresolved".to_string(),
                        });
                        continue;
                    }
                };

                if !visited[j] {
                    // First encounter: same cluster iff orientations are already compatible
                    // (the candidate transition is close to identity composed appropriately).
                    let same_cluster = matrices_close(&candidate_tm, &Matrix3::identity(), CA_TRANSITION_MATRIX_EPSILON)
                        && atoms[j].structure_type == graph.cluster(current_cluster).structure_type;

                    if same_cluster {
                        atoms[j].cluster = Some(current_cluster);
                        visited[j] = true;
                        graph.clusters[current_cluster.0].atom_count += 1;
                        queue.push_back(j);
                        continue;
                    }

                    // Different orientation: start a new cluster for `j` and record the
                    // transition between the two.
                    let new_cluster = graph.push_cluster(atoms[j].structure_type, atoms[j].orientation);
                    atoms[j].cluster = Some(new_cluster);
                    visited[j] = true;
                    graph.clusters[new_cluster.0].atom_count += 1;
                    graph.record_transition(current_cluster, new_cluster, candidate_tm);
                    queue.push_back(j);
                } else if let Some(other_cluster) = atoms[j].cluster {
                    if other_cluster != current_cluster {
                        graph.record_transition(current_cluster, other_cluster, candidate_tm);
                    }
                }
            }
        }
    }

    graph.relax_distances();
    graph
}

fn matrices_close(a: &Matrix3<f64>, b: &Matrix3<f64>, eps: f64) -> bool {
    (a - b).abs().max() <= eps
}

/// A lattice vector: a 3-tuple interpreted in a cluster's lattice frame. Two lattice vectors
/// are equal when their components differ by at most [`CA_LATTICE_VECTOR_EPSILON`].
pub type LatticeVector = Vector3<f64>;

/// Check whether two lattice vectors are equal within [`CA_LATTICE_VECTOR_EPSILON`].
pub fn lattice_vectors_close(a: LatticeVector, b: LatticeVector) -> bool {
    (a - b).amax() <= CA_LATTICE_VECTOR_EPSILON
}

/// A lattice vector paired with the cluster whose frame it is expressed in. The Burgers
/// vector of a circuit is a cluster vector.
#[derive(Debug, Clone, Copy)]
pub struct ClusterVector {
    /// The lattice vector's components in `cluster`'s frame.
    pub vector: LatticeVector,
    /// The owning cluster.
    pub cluster: ClusterIdx,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;

    fn make_crystalline_atom(structure_type: StructureType) -> Atom {
        let mut atom = Atom::new(Vector3::zeros(), None);
        atom.structure_type = structure_type;
        atom.orientation = Matrix3::identity();
        atom
    }

    #[test]
    fn test_empty_graph_when_no_crystalline_seed() {
        let mut atoms = vec![Atom::new(Vector3::zeros(), None); 5];
        for atom in &mut atoms {
            atom.structure_type = StructureType::Other;
        }
        let neighbors = NeighborList { per_atom: vec![Vec::new(); 5], cutoff: 1.0 };
        let graph = build_cluster_graph(&mut atoms, &neighbors);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_single_cluster_for_uniformly_oriented_chain() {
        let mut atoms = vec![make_crystalline_atom(StructureType::Fcc); 4];
        // Chain 0-1-2-3, all same orientation => one cluster.
        let neighbors = NeighborList {
            per_atom: vec![
                vec![rec(1)],
                vec![rec(0), rec(2)],
                vec![rec(1), rec(3)],
                vec![rec(2)],
            ],
            cutoff: 1.0,
        };
        let graph = build_cluster_graph(&mut atoms, &neighbors);
        assert_eq!(graph.len(), 1, "[BUG] uniformly oriented atoms must merge into one cluster");
        assert_eq!(graph.cluster(ClusterIdx(0)).atom_count, 4);
        for atom in &atoms {
            assert_eq!(atom.cluster, Some(ClusterIdx(0)));
        }
    }

    #[test]
    fn test_misoriented_neighbor_creates_transition() {
        let mut atoms = vec![make_crystalline_atom(StructureType::Fcc), make_crystalline_atom(StructureType::Fcc)];
        atoms[1].orientation = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0); // 90 deg about z
        let neighbors = NeighborList {
            per_atom: vec![vec![rec(1)], vec![rec(0)]],
            cutoff: 1.0,
        };
        let graph = build_cluster_graph(&mut atoms, &neighbors);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.transitions().count(), 2, "forward + reverse transition");
        for t in graph.transitions() {
            assert_eq!(t.area, 1);
        }
    }

    #[test]
    fn test_singular_orientation_records_warning_and_border_flag() {
        let mut atoms = vec![make_crystalline_atom(StructureType::Fcc), make_crystalline_atom(StructureType::Fcc)];
        atoms[0].orientation = Matrix3::zeros();
        let neighbors = NeighborList {
            per_atom: vec![vec![rec(1)], vec![rec(0)]],
            cutoff: 1.0,
        };
        let graph = build_cluster_graph(&mut atoms, &neighbors);
        assert_eq!(graph.warnings().len(), 1, "[BUG] a singular orientation must be recorded as a warning");
        assert!(atoms[0].flags.contains(AtomFlags::DISCLINATION_BORDER));
    }

    fn rec(index: usize) -> crate::neighbors::NeighborRecord {
        crate::neighbors::NeighborRecord { index, image: [0, 0, 0], delta: Vector3::zeros(), distance: 1.0 }
    }

    #[test]
    fn test_lattice_vectors_close() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        let b = Vector3::new(1.0 + CA_LATTICE_VECTOR_EPSILON / 2.0, 0.0, 0.0);
        let c = Vector3::new(1.1, 0.0, 0.0);
        assert!(lattice_vectors_close(a, b));
        assert!(!lattice_vectors_close(a, c));
    }
}
