//! Output post-processing (§4.F): Taubin line/surface smoothing, line coarsening, PBC line
//! clipping, and the dislocation density scalar/tensor.

use crate::cell::Cell;
use crate::mesh::InterfaceMesh;
use nalgebra::{Matrix3, Vector3};

/// Taubin smoothing's shrink factor.
pub const TAUBIN_LAMBDA: f64 = 0.5;

/// Taubin smoothing's inflate factor, chosen so the pair `(lambda, mu)` damps high-frequency
/// noise without the shrinkage a single-factor (Laplacian) smoother causes.
pub fn taubin_mu() -> f64 {
    1.0 / (0.1 - 1.0 / TAUBIN_LAMBDA)
}

fn taubin_pass(points: &[Vector3<f64>], closed: bool, factor: f64) -> Vec<Vector3<f64>> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let mut out = points.to_vec();
    for i in 0..n {
        let (prev, next) = if closed {
            (points[(i + n - 1) % n], points[(i + 1) % n])
        } else if i == 0 || i == n - 1 {
            continue;
        } else {
            (points[i - 1], points[i + 1])
        };
        let laplacian = (prev + next) * 0.5 - points[i];
        out[i] = points[i] + factor * laplacian;
    }
    out
}

/// Apply `iterations` Taubin smoothing passes (lambda then mu) to a polyline. Closed loops
/// (first point == last point within tolerance) use wrapped neighbor differences at the seam.
pub fn smooth_line(points: &[Vector3<f64>], iterations: u32) -> Vec<Vector3<f64>> {
    if points.len() < 3 || iterations == 0 {
        return points.to_vec();
    }
    let closed = (points[0] - *points.last().unwrap()).norm() < 1e-9;
    let mu = taubin_mu();
    let mut current = points.to_vec();
    for _ in 0..iterations {
        current = taubin_pass(&current, closed, TAUBIN_LAMBDA);
        current = taubin_pass(&current, closed, mu);
    }
    if closed {
        let last = current.len() - 1;
        current[last] = current[0];
    }
    current
}

/// Drop every k-th interior point before smoothing. `k <= 1` is a no-op.
pub fn coarsen_line(points: &[Vector3<f64>], k: u32) -> Vec<Vector3<f64>> {
    if k <= 1 || points.len() < 3 {
        return points.to_vec();
    }
    let last = points.len() - 1;
    points
        .iter()
        .enumerate()
        .filter(|&(i, _)| i == 0 || i == last || i % k as usize != 0)
        .map(|(_, &p)| p)
        .collect()
}

/// Clip a polyline against every periodic cell face it crosses, inserting coincident endpoints
/// on each side so every emitted subsegment stays within a single periodic image. Subsegments
/// of one point are dropped.
pub fn clip_line_pbc(points: &[Vector3<f64>], cell: &Cell) -> Vec<Vec<Vector3<f64>>> {
    if points.len() < 2 {
        return Vec::new();
    }
    let mut segments: Vec<Vec<Vector3<f64>>> = vec![vec![points[0]]];

    for window in points.windows(2) {
        let (a, b) = (window[0], window[1]);
        let reduced_a = cell.reduced_from_absolute(a);
        let reduced_b = cell.reduced_from_absolute(b);

        let mut crossing_t: Vec<f64> = Vec::new();
        for axis in 0..3 {
            if !cell.pbc[axis] {
                continue;
            }
            let da = reduced_a[axis];
            let db = reduced_b[axis];
            let delta = db - da;
            if delta.abs() < 1e-12 {
                continue;
            }
            for boundary in [da.floor(), da.floor() + 1.0] {
                let t = (boundary - da) / delta;
                if t > 1e-9 && t < 1.0 - 1e-9 {
                    crossing_t.push(t);
                }
            }
        }
        crossing_t.sort_by(|x, y| x.partial_cmp(y).unwrap());
        crossing_t.dedup_by(|x, y| (*x - *y).abs() < 1e-9);

        for t in crossing_t {
            let point = a + (b - a) * t;
            segments.last_mut().unwrap().push(point);
            segments.push(vec![point]);
        }
        segments.last_mut().unwrap().push(b);
    }

    segments.retain(|s| s.len() > 1);
    segments
}

/// Apply `iterations` Taubin smoothing passes to every vertex position of the output mesh.
pub fn smooth_surface(mesh: &mut InterfaceMesh, iterations: u32) {
    if iterations == 0 {
        return;
    }
    for _ in 0..iterations {
        let mut deltas = vec![Vector3::zeros(); mesh.vertices.len()];
        let mut counts = vec![0usize; mesh.vertices.len()];
        for edge in &mesh.edges {
            let i = edge.vertex1.0;
            deltas[i] += edge.physical_vector;
            counts[i] += 1;
        }
        for (i, vertex) in mesh.vertices.iter_mut().enumerate() {
            if counts[i] > 0 {
                let centroid_offset = deltas[i] / counts[i] as f64;
                vertex.position += centroid_offset * TAUBIN_LAMBDA;
            }
        }
    }
}

/// Scalar dislocation density `rho = (sum of segment lengths) / cell_volume`.
pub fn density_scalar(total_length: f64, cell: &Cell) -> f64 {
    let volume = cell.volume();
    if volume > 0.0 { total_length / volume } else { 0.0 }
}

/// Dislocation density tensor `rho_ij = (sum over segments of delta_i * b_j) / cell_volume`.
pub fn density_tensor(segments: &[(Vec<Vector3<f64>>, Vector3<f64>)], cell: &Cell) -> Matrix3<f64> {
    let volume = cell.volume();
    if volume <= 0.0 {
        return Matrix3::zeros();
    }
    let mut tensor = Matrix3::zeros();
    for (line, burgers) in segments {
        for window in line.windows(2) {
            let delta = window[1] - window[0];
            tensor += delta * burgers.transpose();
        }
    }
    tensor / volume
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smooth_line_preserves_endpoints_of_open_line() {
        let points = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 0.0), Vector3::new(2.0, 0.0, 0.0), Vector3::new(3.0, 1.0, 0.0), Vector3::new(4.0, 0.0, 0.0)];
        let smoothed = smooth_line(&points, 3);
        assert_eq!(smoothed[0], points[0], "[BUG] open polyline endpoints must be preserved");
        assert_eq!(*smoothed.last().unwrap(), *points.last().unwrap());
    }

    #[test]
    fn test_smooth_line_reduces_zigzag_amplitude() {
        let points = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 0.0), Vector3::new(2.0, 0.0, 0.0), Vector3::new(3.0, 1.0, 0.0), Vector3::new(4.0, 0.0, 0.0)];
        let smoothed = smooth_line(&points, 5);
        assert!(smoothed[1].y.abs() < points[1].y.abs(), "[BUG] smoothing should reduce zigzag amplitude");
    }

    #[test]
    fn test_coarsen_line_keeps_endpoints() {
        let points: Vec<Vector3<f64>> = (0..10).map(|i| Vector3::new(i as f64, 0.0, 0.0)).collect();
        let coarsened = coarsen_line(&points, 3);
        assert_eq!(coarsened[0], points[0]);
        assert_eq!(*coarsened.last().unwrap(), *points.last().unwrap());
        assert!(coarsened.len() < points.len());
    }

    #[test]
    fn test_clip_line_pbc_splits_on_crossing() {
        let cell = Cell::cubic_periodic(1.0);
        let points = vec![Vector3::new(0.2, 0.5, 0.5), Vector3::new(1.2, 0.5, 0.5)];
        let segments = clip_line_pbc(&points, &cell);
        assert_eq!(segments.len(), 2, "[BUG] a line crossing one periodic face splits into two subsegments");
    }

    #[test]
    fn test_clip_line_pbc_no_crossing_single_segment() {
        let cell = Cell::cubic_periodic(10.0);
        let points = vec![Vector3::new(1.0, 1.0, 1.0), Vector3::new(2.0, 2.0, 2.0)];
        let segments = clip_line_pbc(&points, &cell);
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn test_density_scalar() {
        let cell = Cell::cubic_periodic(10.0);
        let rho = density_scalar(50.0, &cell);
        assert!((rho - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_density_tensor_nonzero_for_straight_segment() {
        let cell = Cell::cubic_periodic(10.0);
        let line = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 1.0)];
        let burgers = Vector3::new(0.5, 0.0, 0.0);
        let tensor = density_tensor(&[(line, burgers)], &cell);
        assert!(tensor[(2, 0)].abs() > 0.0, "[BUG] line along z with Burgers along x should populate rho_zx");
    }
}
