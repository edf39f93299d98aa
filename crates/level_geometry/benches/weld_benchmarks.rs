//! Benchmarks for collision mesh welding.
//!
//! Measures `build_mesh` and OBJ parsing across layer patterns, from a
//! single row of tiles to random fill.

use bevy::math::{IVec2, UVec2, Vec2};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use level_geometry::collision::{ParseOptions, WeldTable, build_mesh, parse_obj_str};
use level_geometry::{ObjectType, TileGrid, Tileset};
use rand::prelude::*;

const SIZE: u32 = 128;

fn tileset() -> Tileset {
  Tileset::new("bench", 1, UVec2::new(24, 24), 8, 64)
}

fn grid(data: Vec<i32>) -> TileGrid {
  TileGrid::from_data(SIZE, SIZE, IVec2::ZERO, data).unwrap()
}

/// One solid row along the bottom.
fn floor_grid() -> TileGrid {
  let mut data = vec![0; (SIZE * SIZE) as usize];
  let start = ((SIZE - 1) * SIZE) as usize;
  data[start..].fill(1);
  grid(data)
}

/// Every cell solid - worst case for shared corners.
fn full_grid() -> TileGrid {
  grid(vec![1; (SIZE * SIZE) as usize])
}

/// Column heights varying around the middle.
fn terrain_grid(seed: u64) -> TileGrid {
  let mut rng = StdRng::seed_from_u64(seed);
  let mut data = vec![0; (SIZE * SIZE) as usize];
  for x in 0..SIZE {
    let height = (SIZE as i32 / 2 + rng.gen_range(-6..=6)).clamp(1, SIZE as i32) as u32;
    for y in (SIZE - height)..SIZE {
      data[(y * SIZE + x) as usize] = 1;
    }
  }
  grid(data)
}

fn noise_grid(density: f64, seed: u64) -> TileGrid {
  let mut rng = StdRng::seed_from_u64(seed);
  let data = (0..SIZE * SIZE)
    .map(|_| if rng.gen_bool(density) { 1 } else { 0 })
    .collect();
  grid(data)
}

fn test_cases() -> Vec<(&'static str, TileGrid)> {
  vec![
    ("floor", floor_grid()),
    ("full", full_grid()),
    ("terrain", terrain_grid(42)),
    ("noise_50pct", noise_grid(0.5, 42)),
  ]
}

fn bench_build_mesh(c: &mut Criterion) {
  let tileset = tileset();
  let mut group = c.benchmark_group("collision/build_mesh");

  for (name, grid) in test_cases() {
    group.throughput(Throughput::Elements(grid.cells().count() as u64));
    group.bench_with_input(BenchmarkId::new("weld", name), &grid, |b, grid| {
      b.iter(|| build_mesh(black_box(grid), &tileset, 1000.0))
    });
  }

  group.finish();
}

fn bench_weld_table(c: &mut Criterion) {
  let mut rng = StdRng::seed_from_u64(7);
  let points: Vec<Vec2> = (0..10_000)
    .map(|_| Vec2::new(rng.gen_range(0..512) as f32 * 24.0, rng.gen_range(0..512) as f32 * 24.0))
    .collect();

  let mut group = c.benchmark_group("collision/weld_table");
  group.throughput(Throughput::Elements(points.len() as u64));
  group.bench_function("insert_10k", |b| {
    b.iter(|| {
      let mut table = WeldTable::new(1000.0);
      for p in &points {
        table.weld(black_box(*p));
      }
      table.len()
    })
  });
  group.finish();
}

fn bench_parse_obj(c: &mut Criterion) {
  let tileset = tileset();
  let options = ParseOptions::default();
  let mut group = c.benchmark_group("collision/parse_obj");

  for (name, grid) in test_cases() {
    let text = build_mesh(&grid, &tileset, 1000.0).unwrap().to_obj_string();
    group.bench_with_input(BenchmarkId::new("loops", name), &text, |b, text| {
      b.iter(|| parse_obj_str(black_box(text), ObjectType::Solid, &options))
    });
  }

  group.finish();
}

criterion_group!(benches, bench_build_mesh, bench_weld_table, bench_parse_obj);
criterion_main!(benches);
