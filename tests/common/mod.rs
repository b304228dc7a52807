//! Shared lattice generators for integration tests: defect-free crystals and the classic
//! defect configurations exercised by the end-to-end scenarios.

#![allow(dead_code)]

use dxa::Cell;
use nalgebra::{Matrix3, Vector3};

/// FCC basis, fractional coordinates within one conventional cubic cell.
const FCC_BASIS: [Vector3<f64>; 4] = [
    Vector3::new(0.0, 0.0, 0.0),
    Vector3::new(0.5, 0.5, 0.0),
    Vector3::new(0.5, 0.0, 0.5),
    Vector3::new(0.0, 0.5, 0.5),
];

/// BCC basis, fractional coordinates within one conventional cubic cell.
const BCC_BASIS: [Vector3<f64>; 2] = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.5, 0.5, 0.5)];

/// A defect-free FCC block of `n` x `n` x `n` conventional cells, edge length `a`, periodic
/// on every axis.
pub fn fcc_lattice(a: f64, n: usize) -> (Cell, Vec<Vector3<f64>>) {
    let cell = Cell::cubic_periodic(a * n as f64);
    let mut positions = Vec::with_capacity(n * n * n * 4);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                let base = Vector3::new(i as f64, j as f64, k as f64);
                for offset in &FCC_BASIS {
                    positions.push((base + offset) * a);
                }
            }
        }
    }
    (cell, positions)
}

/// A defect-free BCC block of `n` x `n` x `n` conventional cells, periodic on every axis.
pub fn bcc_lattice(a: f64, n: usize) -> (Cell, Vec<Vector3<f64>>) {
    let cell = Cell::cubic_periodic(a * n as f64);
    let mut positions = Vec::with_capacity(n * n * n * 2);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                let base = Vector3::new(i as f64, j as f64, k as f64);
                for offset in &BCC_BASIS {
                    positions.push((base + offset) * a);
                }
            }
        }
    }
    (cell, positions)
}

/// A defect-free HCP block of `n` x `n` x `n` unit cells, periodic on every axis.
pub fn hcp_lattice(a: f64, c: f64, n: usize) -> (Cell, Vec<Vector3<f64>>) {
    let nf = n as f64;
    let matrix = Matrix3::new(a * nf, -0.5 * a * nf, 0.0, 0.0, a * 3f64.sqrt() / 2.0 * nf, 0.0, 0.0, 0.0, c * nf);
    let cell = Cell::new(matrix, Vector3::zeros(), [true; 3]).expect("valid hexagonal cell");
    let basis = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0 / 3.0, 2.0 / 3.0, 0.5)];
    let mut positions = Vec::with_capacity(n * n * n * 2);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                for frac in &basis {
                    let reduced = Vector3::new((frac.x + i as f64) / n as f64, (frac.y + j as f64) / n as f64, (frac.z + k as f64) / n as f64);
                    positions.push(cell.absolute_from_reduced(reduced));
                }
            }
        }
    }
    (cell, positions)
}

/// Insert an edge dislocation into an FCC block by removing one `(010)` half-plane of atoms
/// along `x > box/2` and relaxing neighbors with the isotropic edge-dislocation displacement
/// field. Burgers vector lies along x with magnitude `a/sqrt(2)` (the FCC nearest-neighbor
/// distance), line direction along z.
pub fn fcc_edge_dislocation(a: f64, n: usize) -> (Cell, Vec<Vector3<f64>>) {
    let (cell, mut positions) = fcc_lattice(a, n);
    let box_size = a * n as f64;
    let center = box_size / 2.0;
    let burgers = a / 2f64.sqrt();
    let nu = 0.3; // Poisson ratio, standard isotropic-elasticity placeholder

    positions.retain(|p| !(p.y > center && (p.x - center).abs() < a * 0.1));

    for p in positions.iter_mut() {
        let x = p.x - center;
        let y = p.y - center;
        let r2 = x * x + y * y;
        if r2 < 1e-9 {
            continue;
        }
        let theta = y.atan2(x);
        let ux = burgers / (2.0 * std::f64::consts::PI) * (theta + (x * y) / (2.0 * (1.0 - nu) * r2));
        let uy = -burgers / (2.0 * std::f64::consts::PI)
            * ((1.0 - 2.0 * nu) / (4.0 * (1.0 - nu)) * (r2).ln() + (x * x - y * y) / (4.0 * (1.0 - nu) * r2));
        p.x += ux;
        p.y += uy;
    }
    (cell, positions)
}

/// A prismatic Frank loop: remove a thin disc of `n_removed` atoms on a `{111}`-like plane
/// (approximated here as a disc on the z=box/2 plane) from an FCC block, collapsing the two
/// faces toward each other to leave a stacking-fault-bounded loop with Burgers vector `a/3
/// [111]`-like normal component.
pub fn fcc_frank_loop(a: f64, n: usize, n_removed: usize) -> (Cell, Vec<Vector3<f64>>) {
    let (cell, mut positions) = fcc_lattice(a, n);
    let box_size = a * n as f64;
    let center = Vector3::new(box_size / 2.0, box_size / 2.0, box_size / 2.0);
    let radius = (n_removed as f64 / std::f64::consts::PI).sqrt() * (a / 2.0);
    let collapse = a / 3.0;

    positions.retain(|p| {
        let in_plane_r2 = (p.x - center.x).powi(2) + (p.y - center.y).powi(2);
        !(in_plane_r2 < radius * radius && (p.z - center.z).abs() < a * 0.1)
    });

    for p in positions.iter_mut() {
        let in_plane_r2 = (p.x - center.x).powi(2) + (p.y - center.y).powi(2);
        if in_plane_r2 < radius * radius {
            if p.z > center.z {
                p.z -= collapse / 2.0;
            } else {
                p.z += collapse / 2.0;
            }
        }
    }
    (cell, positions)
}

/// Two FCC grains sharing a `(001)` interface, the upper grain rotated `degrees` about z
/// relative to the lower one, producing a periodic array of edge dislocations on the
/// boundary.
pub fn fcc_tilt_boundary(a: f64, n: usize, degrees: f64) -> (Cell, Vec<Vector3<f64>>) {
    let (cell, base_positions) = fcc_lattice(a, n);
    let box_size = a * n as f64;
    let center_y = box_size / 2.0;
    let theta = degrees.to_radians();
    let rotation = Matrix3::new(theta.cos(), -theta.sin(), 0.0, theta.sin(), theta.cos(), 0.0, 0.0, 0.0, 1.0);

    let positions = base_positions
        .into_iter()
        .map(|p| {
            if p.y > center_y {
                let centered = p - Vector3::new(p.x, center_y, p.z);
                rotation * centered + Vector3::new(p.x, center_y, p.z)
            } else {
                p
            }
        })
        .collect();
    (cell, positions)
}
