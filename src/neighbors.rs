//! Binned neighbor enumeration within a cutoff radius.
//!
//! The bin count per axis is capped at 40 and bins are visited in a fixed `(dx, dy, dz)`
//! nesting with `dz` innermost, matching the reference engine's templated neighbor-list
//! builder. This keeps iteration order deterministic: bin-major, then atom-index order
//! within a bin (atoms are inserted into bins in ascending index order).

use crate::cell::Cell;
use nalgebra::Vector3;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A single neighbor of a query atom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborRecord {
    /// Index of the neighboring atom.
    pub index: usize,
    /// Periodic image offset (in whole lattice-vector units) applied to the neighbor.
    pub image: [i32; 3],
    /// Minimum-image displacement from the query atom to the neighbor.
    pub delta: Vector3<f64>,
    /// `|delta|`.
    pub distance: f64,
}

/// Per-atom neighbor tables for a whole frame, in deterministic bin-major order.
#[derive(Debug, Clone, Default)]
pub struct NeighborList {
    /// `per_atom[i]` is atom `i`'s neighbors within the configured cutoff.
    pub per_atom: Vec<Vec<NeighborRecord>>,
    /// The cutoff radius this list was built with.
    pub cutoff: f64,
}

impl NeighborList {
    /// Number of atoms in this list.
    pub fn len(&self) -> usize {
        self.per_atom.len()
    }

    /// Whether the list covers zero atoms.
    pub fn is_empty(&self) -> bool {
        self.per_atom.is_empty()
    }

    /// Neighbors of atom `idx`.
    pub fn neighbors_of(&self, idx: usize) -> &[NeighborRecord] {
        &self.per_atom[idx]
    }
}

/// Fixed cap on bins per axis (`examples/original_source/.../NeighborListBuilder.hpp`).
const MAX_BINS_PER_AXIS: usize = 40;

struct CellList {
    bins: Vec<Vec<usize>>,
    n_bins: [usize; 3],
}

impl CellList {
    fn build(positions: &[Vector3<f64>], cell: &Cell, cutoff: f64) -> Self {
        let n_bins: [usize; 3] = std::array::from_fn(|axis| {
            if cutoff <= 0.0 {
                1
            } else {
                let height = cell.perpendicular_height(axis);
                ((height / cutoff).floor() as usize).clamp(1, MAX_BINS_PER_AXIS)
            }
        });
        let total_bins = n_bins[0] * n_bins[1] * n_bins[2];
        let mut bins = vec![Vec::new(); total_bins];

        for (atom_idx, &pos) in positions.iter().enumerate() {
            let reduced = cell.reduced_from_absolute(pos);
            let wrapped = Vector3::new(
                reduced.x - reduced.x.floor(),
                reduced.y - reduced.y.floor(),
                reduced.z - reduced.z.floor(),
            );
            let bx = ((wrapped.x * n_bins[0] as f64) as usize).min(n_bins[0] - 1);
            let by = ((wrapped.y * n_bins[1] as f64) as usize).min(n_bins[1] - 1);
            let bz = ((wrapped.z * n_bins[2] as f64) as usize).min(n_bins[2] - 1);
            bins[Self::linear_index(&n_bins, bx, by, bz)].push(atom_idx);
        }

        Self { bins, n_bins }
    }

    fn linear_index(n_bins: &[usize; 3], bx: usize, by: usize, bz: usize) -> usize {
        bx + by * n_bins[0] + bz * n_bins[0] * n_bins[1]
    }

    fn bin_of(&self, cell: &Cell, pos: Vector3<f64>) -> (usize, usize, usize) {
        let reduced = cell.reduced_from_absolute(pos);
        let wrapped = Vector3::new(
            reduced.x - reduced.x.floor(),
            reduced.y - reduced.y.floor(),
            reduced.z - reduced.z.floor(),
        );
        let bx = ((wrapped.x * self.n_bins[0] as f64) as usize).min(self.n_bins[0] - 1);
        let by = ((wrapped.y * self.n_bins[1] as f64) as usize).min(self.n_bins[1] - 1);
        let bz = ((wrapped.z * self.n_bins[2] as f64) as usize).min(self.n_bins[2] - 1);
        (bx, by, bz)
    }

    /// Visit the 27 bins adjacent to (and including) `(bx, by, bz)` in fixed `(dx, dy, dz)`
    /// order with `dz` innermost, returning `(bin_linear_index, image_offset)`.
    fn adjacent_bins(&self, bx: usize, by: usize, bz: usize, pbc: [bool; 3]) -> Vec<(usize, [i32; 3])> {
        let mut out = Vec::with_capacity(27);
        let axis_candidates = |b: usize, n: usize, periodic: bool| -> Vec<(usize, i32)> {
            let mut v = Vec::with_capacity(3);
            for d in -1_i32..=1 {
                let raw = b as i32 + d;
                if raw >= 0 && (raw as usize) < n {
                    v.push((raw as usize, 0));
                } else if periodic && n > 0 {
                    let wrapped = raw.rem_euclid(n as i32) as usize;
                    let image = if raw < 0 { -1 } else { 1 };
                    v.push((wrapped, image));
                }
                // Non-periodic out-of-range candidates are simply absent.
            }
            v.sort_by_key(|&(_, img)| img); // keep deterministic, image -1,0,1 order
            v.dedup();
            v
        };

        let xs = axis_candidates(bx, self.n_bins[0], pbc[0]);
        let ys = axis_candidates(by, self.n_bins[1], pbc[1]);
        let zs = axis_candidates(bz, self.n_bins[2], pbc[2]);

        for &(nx, ix) in &xs {
            for &(ny, iy) in &ys {
                for &(nz, iz) in &zs {
                    let idx = Self::linear_index(&self.n_bins, nx, ny, nz);
                    out.push((idx, [ix, iy, iz]));
                }
            }
        }
        out
    }
}

/// Build neighbor lists for every atom in `positions`, using `cell` for periodic wrapping.
///
/// Returns an empty list for zero atoms or a non-positive cutoff.
pub fn build_neighbor_list(positions: &[Vector3<f64>], cell: &Cell, cutoff: f64) -> NeighborList {
    let n_atoms = positions.len();
    if n_atoms == 0 || cutoff <= 0.0 {
        return NeighborList { per_atom: Vec::new(), cutoff };
    }

    let cell_list = CellList::build(positions, cell, cutoff);
    let cutoff_sq = cutoff * cutoff;

    let compute_one = |center_idx: usize| -> Vec<NeighborRecord> {
        let center = positions[center_idx];
        let (bx, by, bz) = cell_list.bin_of(cell, center);
        let mut out = Vec::with_capacity(16);
        for (bin_idx, _base_image) in cell_list.adjacent_bins(bx, by, bz, cell.pbc) {
            for &neighbor_idx in &cell_list.bins[bin_idx] {
                if neighbor_idx == center_idx {
                    continue;
                }
                let delta = cell.wrap_vector(positions[neighbor_idx] - center);
                let dist_sq = delta.norm_squared();
                if dist_sq <= cutoff_sq {
                    // The image actually realizing the minimum-image delta is recovered from
                    // the wrapped displacement itself rather than the bin's nominal offset,
                    // since wrap_vector always picks the true minimum image.
                    let reduced_delta = cell.matrix().try_inverse().map(|inv| inv * delta);
                    let image = reduced_delta
                        .map(|r| [r.x.round() as i32, r.y.round() as i32, r.z.round() as i32])
                        .unwrap_or([0, 0, 0]);
                    out.push(NeighborRecord {
                        index: neighbor_idx,
                        image,
                        delta,
                        distance: dist_sq.sqrt(),
                    });
                }
            }
        }
        out.sort_by(|a, b| a.index.cmp(&b.index).then(a.image.cmp(&b.image)));
        out.dedup_by(|a, b| a.index == b.index && a.image == b.image);
        out
    };

    #[cfg(feature = "rayon")]
    let per_atom: Vec<Vec<NeighborRecord>> = (0..n_atoms).into_par_iter().map(compute_one).collect();

    #[cfg(not(feature = "rayon"))]
    let per_atom: Vec<Vec<NeighborRecord>> = (0..n_atoms).map(compute_one).collect();

    NeighborList { per_atom, cutoff }
}
