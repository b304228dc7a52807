//! Common Neighbor Analysis: per-atom structural classification from neighbor-graph
//! signatures.
//!
//! Ported from the reference engine's `CommonNeighborAnalysis.cpp`: for every neighbor `j`
//! of a candidate atom, compute the signature `(n_common_neighbors, n_bonds_among_them,
//! longest_bond_chain)` and classify by the exact counts those signatures fall into.

use crate::atom::{Atom, StructureType};
use crate::cell::Cell;
use crate::neighbors::NeighborList;
use nalgebra::Vector3;

/// A per-neighbor CNA signature: `(n_common, n_bonds, longest_chain)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CnaSignature {
    /// Number of atoms adjacent to both the center atom and this neighbor.
    pub n_common: u32,
    /// Number of bonds among those common neighbors.
    pub n_bonds: u32,
    /// Size of the largest connected component in the common-neighbor bond graph.
    pub longest_chain: u32,
}

const FCC_HCP_SIGNATURE: CnaSignature = CnaSignature { n_common: 4, n_bonds: 2, longest_chain: 1 };
const HCP_SECOND_SIGNATURE: CnaSignature = CnaSignature { n_common: 4, n_bonds: 2, longest_chain: 2 };
const BCC_SIGNATURE_A: CnaSignature = CnaSignature { n_common: 6, n_bonds: 6, longest_chain: 6 };
const BCC_SIGNATURE_B: CnaSignature = CnaSignature { n_common: 4, n_bonds: 4, longest_chain: 4 };

/// Classify every atom by Common Neighbor Analysis, writing `structure_type` and (for
/// crystalline atoms) leaving `orientation` as the identity placeholder — CNA does not itself
/// determine a local lattice orientation beyond structure type; callers needing an oriented
/// frame should run [`crate::ptm`] instead or seed the orientation externally.
pub fn classify_cna(atoms: &mut [Atom], positions: &[Vector3<f64>], cell: &Cell, neighbors: &NeighborList, cutoff: f64) {
    let cutoff_sq = cutoff * cutoff;
    let is_bonded = |a: usize, b: usize| -> bool {
        a != b && cell.minimum_image_distance_squared(positions[a], positions[b]) <= cutoff_sq
    };

    for i in 0..atoms.len() {
        let shell = neighbors.neighbors_of(i);
        let structure_type = match shell.len() {
            12 => classify_12(i, shell, neighbors, &is_bonded),
            14 => classify_14(i, shell, neighbors, &is_bonded),
            _ => StructureType::Other,
        };
        atoms[i].structure_type = structure_type;
        if structure_type.is_crystalline() {
            atoms[i].flags.remove(crate::atom::AtomFlags::DISORDERED);
        } else {
            atoms[i].flags.insert(crate::atom::AtomFlags::DISORDERED);
        }
    }
}

fn signature_for(i: usize, j: usize, shell: &[crate::neighbors::NeighborRecord], neighbors: &NeighborList, is_bonded: &impl Fn(usize, usize) -> bool) -> CnaSignature {
    // Common neighbors: atoms adjacent to both i and j, restricted to i's near-neighbor shell
    // (the candidate crystalline coordination shell), excluding i and j themselves.
    let j_neighbor_set: Vec<usize> = neighbors.neighbors_of(j).iter().map(|r| r.index).collect();
    let common: Vec<usize> = shell
        .iter()
        .map(|r| r.index)
        .filter(|&k| k != i && k != j && j_neighbor_set.contains(&k))
        .collect();

    let n_common = common.len();
    let mut bonds = Vec::new();
    for a in 0..n_common {
        for b in (a + 1)..n_common {
            if is_bonded(common[a], common[b]) {
                bonds.push((a, b));
            }
        }
    }

    let longest_chain = longest_bond_chain(n_common, &bonds);

    CnaSignature {
        n_common: n_common as u32,
        n_bonds: bonds.len() as u32,
        longest_chain,
    }
}

/// Largest connected component among `n` nodes connected by `bonds`, via iterative BFS
/// (a worklist, not recursion, per the reference implementation's `calcMaxChainLength`).
fn longest_bond_chain(n: usize, bonds: &[(usize, usize)]) -> u32 {
    if n == 0 {
        return 0;
    }
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(a, b) in bonds {
        adjacency[a].push(b);
        adjacency[b].push(a);
    }
    let mut visited = vec![false; n];
    let mut best = 0;
    for start in 0..n {
        if visited[start] {
            continue;
        }
        let mut worklist = std::collections::VecDeque::new();
        worklist.push_back(start);
        visited[start] = true;
        let mut size = 0;
        while let Some(node) = worklist.pop_front() {
            size += 1;
            for &next in &adjacency[node] {
                if !visited[next] {
                    visited[next] = true;
                    worklist.push_back(next);
                }
            }
        }
        best = best.max(size);
    }
    best as u32
}

fn classify_12(i: usize, shell: &[crate::neighbors::NeighborRecord], neighbors: &NeighborList, is_bonded: &impl Fn(usize, usize) -> bool) -> StructureType {
    let signatures: Vec<CnaSignature> = shell.iter().map(|r| signature_for(i, r.index, shell, neighbors, is_bonded)).collect();

    let all_421 = signatures.iter().all(|&s| s == FCC_HCP_SIGNATURE);
    if all_421 {
        return StructureType::Fcc;
    }

    let n_421 = signatures.iter().filter(|&&s| s == FCC_HCP_SIGNATURE).count();
    let n_422 = signatures.iter().filter(|&&s| s == HCP_SECOND_SIGNATURE).count();
    if n_421 == 6 && n_422 == 6 {
        return StructureType::Hcp;
    }

    StructureType::Other
}

fn classify_14(i: usize, shell: &[crate::neighbors::NeighborRecord], neighbors: &NeighborList, is_bonded: &impl Fn(usize, usize) -> bool) -> StructureType {
    let signatures: Vec<CnaSignature> = shell.iter().map(|r| signature_for(i, r.index, shell, neighbors, is_bonded)).collect();

    let n_666 = signatures.iter().filter(|&&s| s == BCC_SIGNATURE_A).count();
    let n_444 = signatures.iter().filter(|&&s| s == BCC_SIGNATURE_B).count();
    if n_666 == 8 && n_444 == 6 {
        return StructureType::Bcc;
    }

    StructureType::Other
}
