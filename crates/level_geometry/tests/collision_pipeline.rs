//! Tile grid to physics world: weld, OBJ round trip, optimizer IPC, chains.
//!
//! Run: cargo test -p level_geometry --test collision_pipeline

use bevy::math::{IVec2, UVec2, Vec2};
use level_geometry::collision::{
  ChainWorld, FixtureSettings, LoopWinding, ParseOptions, analyze_chains, build_mesh, dump_obj,
  parse_obj,
};
use level_geometry::{GeometryError, ObjMesh, ObjectType, TileGrid, Tileset, add_loop_to_world};
use tempfile::TempDir;

const PPM: f32 = 24.0;

fn tileset() -> Tileset {
  Tileset::new("solid", 1, UVec2::splat(24), 1, 1)
}

fn options() -> ParseOptions {
  ParseOptions {
    pixels_per_meter: PPM,
    winding: LoopWinding::Authored,
  }
}

/// 4x4 layer with a single solid tile at (2, 3).
fn single_tile() -> TileGrid {
  let mut data = vec![0; 16];
  data[3 * 4 + 2] = 1;
  TileGrid::from_data(4, 4, IVec2::ZERO, data).unwrap()
}

#[test]
fn dumped_obj_reads_back_as_one_loop() {
  let dir = TempDir::new().unwrap();
  let path = dir.path().join("layer_level_solid_not_optimised.obj");

  let mesh = dump_obj(&single_tile(), &tileset(), &path, 1000.0).unwrap();
  assert_eq!(mesh.vertices.len(), 4);

  let text = std::fs::read_to_string(&path).unwrap();
  assert!(text.starts_with("v 48.000 72.000 0.000\n"));
  assert!(text.contains("\n\nf 1 2 3 4\n"));

  let loops = parse_obj(&path, ObjectType::Solid, &options()).unwrap();
  assert_eq!(loops.len(), 1);
  assert_eq!(
    loops[0].points,
    vec![
      Vec2::new(2.0, 3.0),
      Vec2::new(2.0, 4.0),
      Vec2::new(3.0, 4.0),
      Vec2::new(3.0, 3.0)
    ]
  );
}

#[test]
fn dump_creates_missing_directories() {
  let dir = TempDir::new().unwrap();
  let path = dir.path().join("cache/nested/level.obj");
  dump_obj(&single_tile(), &tileset(), &path, 1000.0).unwrap();
  assert!(path.exists());
}

#[test]
fn a_row_of_tiles_welds_shared_edges() {
  let grid = TileGrid::from_data(5, 1, IVec2::ZERO, vec![1; 5]).unwrap();
  let mesh = build_mesh(&grid, &tileset(), 1000.0).unwrap();

  // Each extra tile adds two corners instead of four.
  assert_eq!(mesh.vertices.len(), 4 + 4 * 2);
  assert_eq!(mesh.faces.len(), 5);

  let loops = level_geometry::collision::loops_from_mesh(&mesh, ObjectType::Solid, &options()).unwrap();
  let report = analyze_chains(&loops, 1000.0);
  assert_eq!(report.chain_count, 5);
  assert_eq!(report.vertex_count, 20);
  // Four interior edges, two shared corners each.
  assert_eq!(report.shared.len(), 8);
  assert!(report.shared.iter().all(|v| v.chains.len() == 2));
}

#[test]
fn loops_become_closed_chain_fixtures() {
  let grid = TileGrid::from_data(2, 1, IVec2::ZERO, vec![1, 1]).unwrap();
  let mesh = build_mesh(&grid, &tileset(), 1000.0).unwrap();
  let loops = level_geometry::collision::loops_from_mesh(&mesh, ObjectType::Deadly, &options()).unwrap();

  let mut world = ChainWorld::new();
  let settings = FixtureSettings::default();
  let body = add_loop_to_world(&mut world, &loops[0], &settings, None);
  add_loop_to_world(&mut world, &loops[1], &settings, Some(body));

  assert_eq!(world.bodies().len(), 1);
  assert_eq!(world.bodies()[0].position, Vec2::ZERO);
  assert_eq!(world.fixture_count(), 2);
  for fixture in world.fixtures() {
    assert!(fixture.closed);
    assert_eq!(fixture.friction, 0.2);
    assert_eq!(fixture.density, 0.0);
    assert_eq!(fixture.tag, ObjectType::Deadly);
  }
}

#[test]
fn malformed_obj_files_are_reported() {
  let dir = TempDir::new().unwrap();
  let path = dir.path().join("broken.obj");

  std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 1 1 0\nf 1 2 9\n").unwrap();
  assert!(matches!(
    parse_obj(&path, ObjectType::Solid, &options()),
    Err(GeometryError::Obj(_))
  ));

  std::fs::write(&path, "v 0 0 0\nv 24 0 0\nv 24 24 0\nv 0 0 0\nf 1 2 3 4\n").unwrap();
  assert!(matches!(
    parse_obj(&path, ObjectType::Solid, &options()),
    Err(GeometryError::DegenerateClosingEdge { face: 0, .. })
  ));

  assert!(matches!(
    parse_obj(&dir.path().join("missing.obj"), ObjectType::Solid, &options()),
    Err(GeometryError::Obj(_))
  ));
}

#[test]
fn obj_text_survives_a_write_and_read() {
  let mesh = ObjMesh {
    vertices: vec![Vec2::new(0.5, 0.25), Vec2::new(10.0, 0.0), Vec2::new(10.0, 10.0)],
    faces: vec![vec![1, 2, 3]],
  };
  let parsed = ObjMesh::parse(&mesh.to_obj_string()).unwrap();
  assert_eq!(parsed, mesh);
}

#[cfg(unix)]
mod optimizer {
  use std::os::unix::fs::PermissionsExt;
  use std::path::{Path, PathBuf};
  use std::time::{Duration, Instant};

  use level_geometry::collision::{MeshOptimizer, OptimizerError};
  use level_geometry::ExternalOptimizer;

  use super::*;

  fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
  }

  #[test]
  fn optimizer_output_is_parsed() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("layer_level_solid_not_optimised.obj");
    let output = dir.path().join("layer_level_solid.obj");
    dump_obj(&single_tile(), &tileset(), &input, 1000.0).unwrap();

    // Stand-in optimizer: copies the mesh and reports on stdout.
    let program = script(dir.path(), "optimize.sh", "cp \"$1\" \"$2\"\necho merged");
    let result = ExternalOptimizer::new(program).optimize(&input, &output).unwrap();
    assert_eq!(result.stdout.trim(), "merged");

    let loops = parse_obj(&output, ObjectType::Solid, &options()).unwrap();
    assert_eq!(loops.len(), 1);
  }

  #[test]
  fn failing_optimizer_reports_exit_code_and_stderr() {
    let dir = TempDir::new().unwrap();
    let program = script(dir.path(), "fail.sh", "echo 'bad mesh' >&2\nexit 3");
    let err = ExternalOptimizer::new(program)
      .optimize(&dir.path().join("in.obj"), &dir.path().join("out.obj"))
      .unwrap_err();
    match err {
      OptimizerError::Failed { code, stderr } => {
        assert_eq!(code, Some(3));
        assert_eq!(stderr.trim(), "bad mesh");
      }
      other => panic!("unexpected error: {}", other),
    }
  }

  #[test]
  fn hung_optimizer_is_killed() {
    let dir = TempDir::new().unwrap();
    let program = script(dir.path(), "hang.sh", "exec sleep 10");
    let err = ExternalOptimizer::new(program)
      .with_timeout(Duration::from_millis(100))
      .optimize(&dir.path().join("in.obj"), &dir.path().join("out.obj"))
      .unwrap_err();
    assert!(matches!(err, OptimizerError::TimedOut { .. }));
  }

  #[test]
  fn timeout_holds_when_a_grandchild_keeps_the_pipes_open() {
    let dir = TempDir::new().unwrap();
    // No exec: the shell is killed but `sleep` inherits stdout and stderr.
    let program = script(dir.path(), "wrapper.sh", "sleep 5
echo done");
    let start = Instant::now();
    let err = ExternalOptimizer::new(program)
      .with_timeout(Duration::from_millis(200))
      .optimize(&dir.path().join("in.obj"), &dir.path().join("out.obj"))
      .unwrap_err();
    assert!(matches!(err, OptimizerError::TimedOut { .. }));
    assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());
  }

  #[test]
  fn missing_program_is_a_spawn_error() {
    let dir = TempDir::new().unwrap();
    let err = ExternalOptimizer::new(dir.path().join("no-such-optimizer"))
      .optimize(&dir.path().join("in.obj"), &dir.path().join("out.obj"))
      .unwrap_err();
    assert!(matches!(err, OptimizerError::Spawn { .. }));
  }
}
