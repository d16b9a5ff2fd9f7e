//! Simulation benchmarks for skirmish_core.
//!
//! Run with: `cargo bench -p skirmish_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use skirmish_core::grid::{NavGrid, Tile};
use skirmish_core::math::Fixed;
use skirmish_core::pathfinding::find_path;
use skirmish_core::simulation::Simulation;
use skirmish_test_utils::fixtures::{convoy_scenario, skirmish_scenario};

/// A 64x64 maze of staggered walls with gaps at alternating ends.
fn maze() -> NavGrid {
    let rows: Vec<String> = (0..64)
        .map(|y| {
            (0..64)
                .map(|x| {
                    let wall_row = y % 8 == 4;
                    let gap = if (y / 8) % 2 == 0 { x >= 60 } else { x < 4 };
                    if wall_row && !gap {
                        '#'
                    } else if (x + y) % 13 == 0 {
                        '~'
                    } else {
                        '.'
                    }
                })
                .collect()
        })
        .collect();
    let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
    NavGrid::from_ascii(&refs, Fixed::ONE)
}

pub fn pathfinding_benchmark(c: &mut Criterion) {
    let open = NavGrid::new(64, 64, Fixed::ONE);
    let maze = maze();

    c.bench_function("find_path/open_diagonal", |b| {
        b.iter(|| find_path(black_box(&open), Tile::new(0, 0), Tile::new(63, 63)));
    });
    c.bench_function("find_path/maze", |b| {
        b.iter(|| find_path(black_box(&maze), Tile::new(1, 1), Tile::new(2, 62)));
    });
}

pub fn tick_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    for count in [16, 64] {
        let (sim, _) = convoy_scenario(count);
        group.bench_with_input(BenchmarkId::new("convoy", count), &sim, |b, sim| {
            b.iter_batched(
                || sim.clone(),
                |mut sim: Simulation| {
                    for _ in 0..10 {
                        sim.tick();
                    }
                    sim
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    let mut battle = skirmish_scenario();
    for _ in 0..120 {
        battle.tick();
    }
    group.bench_function("skirmish_engaged", |b| {
        b.iter_batched(
            || battle.clone(),
            |mut sim: Simulation| {
                sim.tick();
                sim
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, pathfinding_benchmark, tick_benchmark);
criterion_main!(benches);
