//! Polyhedral Template Matching: an alternative per-atom classifier that fits a neighbor
//! shell against canonical templates for each candidate crystal structure, yielding both the
//! structure type and a local lattice orientation in one step.

use crate::atom::{Atom, StructureType};
use crate::cell::Cell;
use crate::neighbors::NeighborList;
use nalgebra::{Matrix3, SVD, Vector3};
use pathfinding::kuhn_munkres::kuhn_munkres;
use pathfinding::matrix::Matrix;

/// Default RMSD tolerance below which a template match is accepted.
pub const DEFAULT_PTM_TOLERANCE: f64 = 0.25;

/// Result of fitting one atom's neighbor shell against one template.
#[derive(Debug, Clone, Copy)]
pub struct PtmMatch {
    /// Structure type of the winning template.
    pub structure_type: StructureType,
    /// Rotation mapping canonical template directions to simulation-frame directions.
    pub orientation: Matrix3<f64>,
    /// Root-mean-square deviation of the fit.
    pub rmsd: f64,
}

struct Template {
    structure_type: StructureType,
    directions: Vec<Vector3<f64>>,
}

/// Deterministic tie-break priority: lower value wins a tie in RMSD.
/// Cubic diamond > hex diamond > FCC > HCP, per the structure-analysis edge-case rule.
fn tie_break_rank(t: StructureType) -> u8 {
    match t {
        StructureType::CubicDiamond => 0,
        StructureType::HexDiamond => 1,
        StructureType::Fcc => 2,
        StructureType::Hcp => 3,
        StructureType::Bcc => 4,
        StructureType::Other => 255,
    }
}

fn unit(v: Vector3<f64>) -> Vector3<f64> {
    let n = v.norm();
    if n > 1e-12 { v / n } else { v }
}

/// The canonical, unit-length coordination directions for one structure type, in its own
/// lattice frame. Shared with [`crate::mesh`], which rotates them by each atom's `orientation`
/// to locate the interface-mesh face table.
pub fn canonical_directions(structure_type: StructureType) -> Vec<Vector3<f64>> {
    templates()
        .into_iter()
        .find(|t| t.structure_type == structure_type)
        .map(|t| t.directions)
        .unwrap_or_default()
}

fn templates() -> Vec<Template> {
    let fcc = vec![
        Vector3::new(1.0, 1.0, 0.0),
        Vector3::new(-1.0, -1.0, 0.0),
        Vector3::new(1.0, -1.0, 0.0),
        Vector3::new(-1.0, 1.0, 0.0),
        Vector3::new(1.0, 0.0, 1.0),
        Vector3::new(-1.0, 0.0, -1.0),
        Vector3::new(1.0, 0.0, -1.0),
        Vector3::new(-1.0, 0.0, 1.0),
        Vector3::new(0.0, 1.0, 1.0),
        Vector3::new(0.0, -1.0, -1.0),
        Vector3::new(0.0, 1.0, -1.0),
        Vector3::new(0.0, -1.0, 1.0),
    ]
    .into_iter()
    .map(unit)
    .collect();

    let bcc = vec![
        Vector3::new(1.0, 1.0, 1.0),
        Vector3::new(-1.0, -1.0, -1.0),
        Vector3::new(1.0, 1.0, -1.0),
        Vector3::new(-1.0, -1.0, 1.0),
        Vector3::new(1.0, -1.0, 1.0),
        Vector3::new(-1.0, 1.0, -1.0),
        Vector3::new(-1.0, 1.0, 1.0),
        Vector3::new(1.0, -1.0, -1.0),
        Vector3::new(2.0, 0.0, 0.0),
        Vector3::new(-2.0, 0.0, 0.0),
        Vector3::new(0.0, 2.0, 0.0),
        Vector3::new(0.0, -2.0, 0.0),
        Vector3::new(0.0, 0.0, 2.0),
        Vector3::new(0.0, 0.0, -2.0),
    ]
    .into_iter()
    .map(unit)
    .collect();

    // HCP shares the FCC first-shell count (12) but splits into two bond-length shells in a
    // real lattice; here the canonical *directions* are taken from an ideal HCP coordination
    // shell (6 basal + 3 up + 3 down).
    let hcp = vec![
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(-1.0, 0.0, 0.0),
        Vector3::new(0.5, 0.866_025_4, 0.0),
        Vector3::new(-0.5, 0.866_025_4, 0.0),
        Vector3::new(0.5, -0.866_025_4, 0.0),
        Vector3::new(-0.5, -0.866_025_4, 0.0),
        Vector3::new(0.5, 0.288_675, 0.816_497),
        Vector3::new(-0.5, 0.288_675, 0.816_497),
        Vector3::new(0.0, -0.577_35, 0.816_497),
        Vector3::new(0.5, 0.288_675, -0.816_497),
        Vector3::new(-0.5, 0.288_675, -0.816_497),
        Vector3::new(0.0, -0.577_35, -0.816_497),
    ]
    .into_iter()
    .map(unit)
    .collect();

    let cubic_diamond = vec![
        Vector3::new(1.0, 1.0, 1.0),
        Vector3::new(1.0, -1.0, -1.0),
        Vector3::new(-1.0, 1.0, -1.0),
        Vector3::new(-1.0, -1.0, 1.0),
    ]
    .into_iter()
    .map(unit)
    .collect();

    let hex_diamond = vec![
        Vector3::new(0.0, 0.0, 1.0),
        Vector3::new(0.942_81, 0.0, -0.333_33),
        Vector3::new(-0.471_40, 0.816_50, -0.333_33),
        Vector3::new(-0.471_40, -0.816_50, -0.333_33),
    ]
    .into_iter()
    .map(unit)
    .collect();

    vec![
        Template { structure_type: StructureType::Fcc, directions: fcc },
        Template { structure_type: StructureType::Hcp, directions: hcp },
        Template { structure_type: StructureType::Bcc, directions: bcc },
        Template { structure_type: StructureType::CubicDiamond, directions: cubic_diamond },
        Template { structure_type: StructureType::HexDiamond, directions: hex_diamond },
    ]
}

/// Solve the linear assignment problem matching `neighbor_dirs` to `template_dirs` under a
/// trial rotation `rot` (applied to the template side), maximizing summed cosine similarity.
fn best_assignment(neighbor_dirs: &[Vector3<f64>], template_dirs: &[Vector3<f64>], rot: &Matrix3<f64>) -> Vec<usize> {
    let n = neighbor_dirs.len();
    let scale = 1_000_000_i64;
    let mut weights = Matrix::new(n, n, 0_i64);
    for i in 0..n {
        for j in 0..n {
            let rotated = rot * template_dirs[j];
            let cos_sim = neighbor_dirs[i].dot(&rotated).clamp(-1.0, 1.0);
            weights[(i, j)] = (cos_sim * scale as f64) as i64;
        }
    }
    let (_, assignment) = kuhn_munkres(&weights);
    assignment
}

/// Kabsch fit: the rotation minimizing `sum |neighbor_i - R * template_i|^2` for matched
/// unit-vector correspondences.
fn kabsch_fit(neighbor_dirs: &[Vector3<f64>], template_dirs: &[Vector3<f64>], assignment: &[usize]) -> Option<Matrix3<f64>> {
    let mut covariance = Matrix3::zeros();
    for (i, &j) in assignment.iter().enumerate() {
        covariance += neighbor_dirs[i] * template_dirs[j].transpose();
    }
    let svd = SVD::new(covariance, true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut d = Matrix3::identity();
    if (u * v_t).determinant() < 0.0 {
        d[(2, 2)] = -1.0;
    }
    Some(u * d * v_t)
}

fn rmsd_of(neighbor_dirs: &[Vector3<f64>], template_dirs: &[Vector3<f64>], assignment: &[usize], rot: &Matrix3<f64>) -> f64 {
    let n = neighbor_dirs.len() as f64;
    let sum_sq: f64 = assignment
        .iter()
        .enumerate()
        .map(|(i, &j)| (neighbor_dirs[i] - rot * template_dirs[j]).norm_squared())
        .sum();
    (sum_sq / n).sqrt()
}

/// Fit one atom's neighbor shell against `template` via iterative assignment + Kabsch
/// refinement (a small fixed-iteration instance of iterative closest point), starting from
/// the identity rotation.
fn fit_template(neighbor_dirs: &[Vector3<f64>], template: &Template) -> Option<PtmMatch> {
    if neighbor_dirs.len() != template.directions.len() {
        return None;
    }
    let mut rot = Matrix3::identity();
    let mut assignment = best_assignment(neighbor_dirs, &template.directions, &rot);

    for _ in 0..4 {
        rot = kabsch_fit(neighbor_dirs, &template.directions, &assignment)?;
        let new_assignment = best_assignment(neighbor_dirs, &template.directions, &rot);
        if new_assignment == assignment {
            break;
        }
        assignment = new_assignment;
    }
    rot = kabsch_fit(neighbor_dirs, &template.directions, &assignment)?;
    let rmsd = rmsd_of(neighbor_dirs, &template.directions, &assignment, &rot);

    Some(PtmMatch { structure_type: template.structure_type, orientation: rot, rmsd })
}

/// Classify every atom via Polyhedral Template Matching, setting `structure_type` and
/// `orientation`. Atoms whose best match exceeds `tolerance` RMSD become `Other`.
pub fn classify_ptm(atoms: &mut [Atom], positions: &[Vector3<f64>], cell: &Cell, neighbors: &NeighborList, tolerance: f64) {
    let all_templates = templates();

    for i in 0..atoms.len() {
        let shell = neighbors.neighbors_of(i);
        let neighbor_dirs: Vec<Vector3<f64>> =
            shell.iter().map(|rec| unit(cell.wrap_vector(positions[rec.index] - positions[i]))).collect();

        let mut best: Option<PtmMatch> = None;
        for template in &all_templates {
            if let Some(candidate) = fit_template(&neighbor_dirs, template) {
                let better = match &best {
                    None => true,
                    Some(current) => {
                        (candidate.rmsd < current.rmsd - 1e-9)
                            || ((candidate.rmsd - current.rmsd).abs() <= 1e-9
                                && tie_break_rank(candidate.structure_type) < tie_break_rank(current.structure_type))
                    }
                };
                if better {
                    best = Some(candidate);
                }
            }
        }

        match best {
            Some(m) if m.rmsd <= tolerance => {
                atoms[i].structure_type = m.structure_type;
                atoms[i].orientation = m.orientation;
                atoms[i].flags.remove(crate::atom::AtomFlags::DISORDERED);
            }
            _ => {
                atoms[i].structure_type = StructureType::Other;
                atoms[i].flags.insert(crate::atom::AtomFlags::DISORDERED);
            }
        }
    }
}
