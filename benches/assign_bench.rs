//! Benchmarks for hexsweep
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hexsweep::geo::{generate_steps, Location};
use hexsweep::schedule::{assign_spawns, AssignParams, SpawnPoint};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_spawns(count: usize, seed: u64) -> Vec<SpawnPoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            SpawnPoint::new(
                40.75 + rng.gen_range(-0.02..0.02),
                -73.98 + rng.gen_range(-0.02..0.02),
                rng.gen_range(0.0..3600.0),
            )
        })
        .collect()
}

fn benchmark_assign_spawns(c: &mut Criterion) {
    let mut group = c.benchmark_group("assign_spawns");
    for &count in &[100usize, 500, 2000] {
        let spawns = random_spawns(count, 7);
        let params = AssignParams {
            workers: (count / 100).max(2),
            scan_delay: 10.0,
            max_speed: 30.0,
            max_delay: 60.0,
        };
        group.bench_with_input(BenchmarkId::from_parameter(count), &spawns, |b, spawns| {
            b.iter(|| black_box(assign_spawns(spawns.clone(), &params)))
        });
    }
    group.finish();
}

fn benchmark_generate_steps(c: &mut Criterion) {
    let center = Location::new(40.7580, -73.9855, 0.0);

    c.bench_function("generate_steps_20_rings", |b| {
        b.iter(|| {
            let steps: Vec<Location> = generate_steps(black_box(center), 20, 0.07).collect();
            black_box(steps)
        })
    });
}

criterion_group!(benches, benchmark_assign_spawns, benchmark_generate_steps);
criterion_main!(benches);
