//! Criterion benchmarks for the moment kernels and pair enumeration.
//!
//! Compares the direct and FFT moment kernels over growing series lengths,
//! and the three neighbor strategies over growing particle counts at fixed
//! density.
//!
//! Run with: cargo bench -p rtk-transport

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rtk_core::{find_pairs, pair_sets_match, NeighborStrategy, PeriodicBox, Trajectory};
use rtk_transport::{
    compute_moments_fft, compute_particle_moments, direct_moment_series, CorrelationPlan,
    MomentMethod, TransportConfig,
};

/// Unit-variance random walk starting at the origin.
fn build_random_walk(n_frames: usize, seed: u64) -> Vec<[f64; 3]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pos = [0.0; 3];
    (0..n_frames)
        .map(|_| {
            for c in pos.iter_mut() {
                *c += rng.gen_range(-1.0..1.0);
            }
            pos
        })
        .collect()
}

/// Uniform random positions in a cubic box sized for unit number density.
fn build_uniform_positions(n: usize, seed: u64) -> (Vec<[f64; 3]>, PeriodicBox) {
    let edge = (n as f64).cbrt();
    let mut rng = StdRng::seed_from_u64(seed);
    let positions = (0..n)
        .map(|_| [rng.gen::<f64>() * edge, rng.gen::<f64>() * edge, rng.gen::<f64>() * edge])
        .collect();
    (positions, PeriodicBox::cubic(edge).expect("positive edge"))
}

fn bench_single_particle(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_particle_moments");

    for &n_frames in &[128usize, 512, 2048] {
        let series = build_random_walk(n_frames, 1);
        let label = format!("{}frames", n_frames);

        group.bench_with_input(BenchmarkId::new("direct", &label), &series, |b, series| {
            b.iter(|| direct_moment_series(black_box(series)));
        });
        group.bench_with_input(BenchmarkId::new("fft", &label), &series, |b, series| {
            b.iter(|| compute_moments_fft(black_box(series)));
        });
        group.bench_with_input(
            BenchmarkId::new("fft_reused_plan", &label),
            &series,
            |b, series| {
                let mut plan = CorrelationPlan::new(series.len());
                b.iter(|| plan.moment_series(black_box(series)));
            },
        );
    }
    group.finish();
}

fn bench_trajectory(c: &mut Criterion) {
    let mut group = c.benchmark_group("trajectory_moments");
    group.sample_size(20);

    let n_particles = 64;
    let n_frames = 1024;
    let walks: Vec<Vec<[f64; 3]>> = (0..n_particles)
        .map(|i| build_random_walk(n_frames, 100 + i as u64))
        .collect();
    let frames: Vec<Vec<[f64; 3]>> = (0..n_frames)
        .map(|t| walks.iter().map(|w| w[t]).collect())
        .collect();
    let traj = Trajectory::from_frames(&frames).expect("valid trajectory");

    for method in [MomentMethod::Direct, MomentMethod::Fft] {
        let config = TransportConfig {
            method,
            ..TransportConfig::default()
        };
        group.bench_with_input(
            BenchmarkId::new(format!("{:?}", method), "64x1024"),
            &(&traj, &config),
            |b, &(traj, config)| {
                b.iter(|| compute_particle_moments(black_box(traj), config));
            },
        );
    }
    group.finish();
}

fn bench_pair_enumeration(c: &mut Criterion) {
    let mut group = c.benchmark_group("pair_enumeration");
    let cutoff = 1.5;

    for &n in &[1_000usize, 8_000, 27_000] {
        let (positions, pbc) = build_uniform_positions(n, 7);
        let label = format!("{}particles", n);

        // Cross-check once before timing
        let reference = find_pairs(&positions, &pbc, cutoff, NeighborStrategy::CellList)
            .expect("valid input");
        let tree = find_pairs(&positions, &pbc, cutoff, NeighborStrategy::KdTree)
            .expect("valid input");
        assert!(pair_sets_match(&reference, &tree, 1e-12));

        let strategies: &[NeighborStrategy] = if n <= 8_000 {
            &[
                NeighborStrategy::BruteForce,
                NeighborStrategy::CellList,
                NeighborStrategy::KdTree,
            ]
        } else {
            &[NeighborStrategy::CellList, NeighborStrategy::KdTree]
        };
        for &strategy in strategies {
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", strategy), &label),
                &(&positions, &pbc),
                |b, &(positions, pbc)| {
                    b.iter(|| find_pairs(black_box(positions), pbc, cutoff, strategy));
                },
            );
        }
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_single_particle,
    bench_trajectory,
    bench_pair_enumeration
);
criterion_main!(benches);
