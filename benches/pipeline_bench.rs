//! Pipeline stage benchmarks: neighbor enumeration, structure identification, and the full
//! frame pipeline, each over an FCC block large enough to show scaling.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use dxa::atom::Atom;
use dxa::cell::Cell;
use dxa::cna::classify_cna;
use dxa::config::DxaConfig;
use dxa::frame::Frame;
use dxa::neighbors::build_neighbor_list;
use dxa::pipeline::run_frame;
use nalgebra::Vector3;

const FCC_BASIS: [Vector3<f64>; 4] =
    [Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.5, 0.5, 0.0), Vector3::new(0.5, 0.0, 0.5), Vector3::new(0.0, 0.5, 0.5)];

fn fcc_block(a: f64, n: usize) -> (Cell, Vec<Vector3<f64>>) {
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

fn bench_neighbor_list(c: &mut Criterion) {
    let a = 3.615;
    let (cell, positions) = fcc_block(a, 10);
    let cutoff = a * 0.8;
    c.bench_function("neighbor_list/fcc_4000", |b| {
        b.iter(|| build_neighbor_list(black_box(&positions), black_box(&cell), black_box(cutoff)))
    });
}

fn bench_cna_classification(c: &mut Criterion) {
    let a = 3.615;
    let (cell, positions) = fcc_block(a, 8);
    let cutoff = a * 0.8;
    let neighbors = build_neighbor_list(&positions, &cell, cutoff);
    c.bench_function("cna/fcc_2048", |b| {
        b.iter(|| {
            let mut atoms: Vec<Atom> = positions.iter().map(|&p| Atom::new(p, None)).collect();
            classify_cna(black_box(&mut atoms), &positions, &cell, &neighbors, cutoff);
            black_box(atoms)
        })
    });
}

fn bench_full_pipeline(c: &mut Criterion) {
    let a = 3.615;
    let (cell, positions) = fcc_block(a, 6);
    let mut config = DxaConfig::default();
    config.pbc = [true, true, true];
    config.cna_cutoff = Some(a * 0.8);
    config.max_circuit_size = 14;
    config.extended_circuit_size = 14;
    let frame = Frame { timestep: 0, cell, positions, tags: None };

    c.bench_function("pipeline/fcc_864_perfect", |b| b.iter(|| run_frame(black_box(&frame), black_box(&config)).unwrap()));
}

criterion_group!(stages, bench_neighbor_list, bench_cna_classification);
criterion_group!(pipeline, bench_full_pipeline);
criterion_main!(stages, pipeline);
