//! E2E tests for level loading: OBJ cache, optimizer fallback, validation
//! modes and stencil wiring.
//!
//! Run: cargo test -p level_geometry --test level_load_e2e

use std::cell::Cell;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use level_geometry::collision::{ChainWorld, MeshOptimizer, OptimizerError, OptimizerOutput};
use level_geometry::level::{LayerError, LevelLayer, MeshSource};
use level_geometry::tilemap::{RecordingTarget, RenderCall, StencilMode};
use level_geometry::{
  BlockPos, GeometryError, LevelGeometryConfig, LevelLoadError, LevelLoader, LevelSource, ObjectType,
  TileMapError, ValidationMode,
};
use tempfile::TempDir;

const LEVEL: &str = r#"
  name = "e2e"

  [[tilesets]]
  name = "terrain"
  first_gid = 1
  tile_size = [24, 24]
  columns = 4
  tile_count = 16
  image = "terrain.png"
  image_size = [96, 96]

  [[layers]]
  name = "level"
  width = 3
  height = 1
  data = "1,1,1"
  z = 1

  [[layers]]
  name = "spikes"
  width = 2
  height = 1
  data = "2,0"
  offset = [0, 4]
  z = 1

  [layers.properties]
  collision = "deadly"

  [[layers]]
  name = "glow"
  width = 3
  height = 1
  data = "3,3,3"
  z = 2

  [layers.properties]
  stencil_reference = "level"
  blend_mode = "add"

  [[layers]]
  name = "sky"
  width = 1
  height = 1
  data = "4"
  z = -1
"#;

/// Optimizer stand-in that copies its input and counts invocations.
#[derive(Default)]
struct CopyOptimizer {
  calls: Cell<usize>,
}

impl MeshOptimizer for CopyOptimizer {
  fn optimize(&self, input: &Path, output: &Path) -> Result<OptimizerOutput, OptimizerError> {
    self.calls.set(self.calls.get() + 1);
    std::fs::copy(input, output).map_err(OptimizerError::Wait)?;
    Ok(OptimizerOutput::default())
  }
}

struct FailingOptimizer;

impl MeshOptimizer for FailingOptimizer {
  fn optimize(&self, _input: &Path, _output: &Path) -> Result<OptimizerOutput, OptimizerError> {
    Err(OptimizerError::Failed {
      code: Some(1),
      stderr: "cannot merge".to_string(),
    })
  }
}

/// Writes an unusable mesh and reports success.
struct GarbageOptimizer;

impl MeshOptimizer for GarbageOptimizer {
  fn optimize(&self, _input: &Path, output: &Path) -> Result<OptimizerOutput, OptimizerError> {
    std::fs::write(output, "f 1 2 3\n").map_err(OptimizerError::Wait)?;
    Ok(OptimizerOutput::default())
  }
}

fn config() -> LevelGeometryConfig {
  let mut config = LevelGeometryConfig::default();
  config.units.pixels_per_meter = 24.0;
  config
}

fn write_level(dir: &TempDir, text: &str) -> PathBuf {
  let path = dir.path().join("level.toml");
  std::fs::write(&path, text).unwrap();
  path
}

fn set_mtime(path: &Path, time: SystemTime) {
  File::options().write(true).open(path).unwrap().set_modified(time).unwrap();
}

#[test]
fn first_load_optimizes_and_second_load_uses_cache() {
  let dir = TempDir::new().unwrap();
  let path = write_level(&dir, LEVEL);
  let config = config();
  let optimizer = CopyOptimizer::default();
  let loader = LevelLoader::new(&config, &optimizer);

  let mut world = ChainWorld::new();
  let level = loader.load_file(&path, &mut world).unwrap();
  assert!(level.is_clean(), "{:?}", level.report.diagnostics);
  assert_eq!(optimizer.calls.get(), 2);
  assert!(dir.path().join("layer_level_solid.obj").exists());
  assert!(dir.path().join("layer_level_solid_not_optimised.obj").exists());
  assert!(dir.path().join("layer_spikes_deadly.obj").exists());

  let sources: Vec<_> = level.collision.iter().map(|c| (c.layer.as_str(), c.source)).collect();
  assert_eq!(
    sources,
    vec![("level", MeshSource::Optimized), ("spikes", MeshSource::Optimized)]
  );

  let mut world = ChainWorld::new();
  let level = loader.load_file(&path, &mut world).unwrap();
  assert_eq!(optimizer.calls.get(), 2);
  assert!(level.collision.iter().all(|c| c.source == MeshSource::Cache));
  assert_eq!(world.fixture_count(), 3 + 1);
}

#[test]
fn collision_tags_and_offsets_follow_layers() {
  let dir = TempDir::new().unwrap();
  let path = write_level(&dir, LEVEL);
  let mut config = config();
  config.optimizer.enabled = false;
  let optimizer = CopyOptimizer::default();

  let mut world = ChainWorld::new();
  let level = LevelLoader::new(&config, &optimizer).load_file(&path, &mut world).unwrap();

  let spikes: Vec<_> = level
    .chains
    .iter()
    .filter(|c| c.object_type == ObjectType::Deadly)
    .collect();
  assert_eq!(spikes.len(), 1);
  // Placement offset of four tiles down, one physics unit per tile.
  assert_eq!(spikes[0].points[0], bevy::math::Vec2::new(0.0, 4.0));

  assert!(world.fixtures().any(|f| f.tag == ObjectType::Deadly));
  assert_eq!(
    world.fixtures().filter(|f| f.tag == ObjectType::Solid).count(),
    3
  );
}

#[test]
fn failing_optimizer_falls_back_to_unoptimized_mesh() {
  let dir = TempDir::new().unwrap();
  let path = write_level(&dir, LEVEL);
  let config = config();

  let mut world = ChainWorld::new();
  let level = LevelLoader::new(&config, &FailingOptimizer)
    .load_file(&path, &mut world)
    .unwrap();

  let collision = &level.collision[0];
  assert_eq!(collision.source, MeshSource::Unoptimized);
  assert_eq!(collision.loops, 3);
  assert!(matches!(
    level.report.for_layer("level").next().map(|d| &d.error),
    Some(LayerError::Optimizer(OptimizerError::Failed { .. }))
  ));
  // One static body per loop by default.
  assert_eq!(world.bodies().len(), 4);
  assert!(!dir.path().join("layer_level_solid.obj").exists());
}

#[test]
fn unparsable_optimizer_output_is_not_kept_as_cache() {
  let dir = TempDir::new().unwrap();
  let path = write_level(&dir, LEVEL);
  let config = config();

  let mut world = ChainWorld::new();
  let level = LevelLoader::new(&config, &GarbageOptimizer)
    .load_file(&path, &mut world)
    .unwrap();

  assert_eq!(level.collision[0].source, MeshSource::Unoptimized);
  assert_eq!(level.collision[0].loops, 3);
  assert!(matches!(
    level.report.for_layer("level").next().map(|d| &d.error),
    Some(LayerError::Geometry(_))
  ));
  assert!(!dir.path().join("layer_level_solid.obj").exists());
  assert!(!dir.path().join("layer_spikes_deadly.obj").exists());
}

#[cfg(unix)]
#[test]
fn partial_output_of_a_timed_out_optimizer_is_discarded() {
  use std::os::unix::fs::PermissionsExt;

  use level_geometry::ExternalOptimizer;

  let dir = TempDir::new().unwrap();
  let path = write_level(&dir, LEVEL);
  let program = dir.path().join("optimize.sh");
  // A single triangle would pass as a valid one-loop mesh.
  std::fs::write(
    &program,
    "#!/bin/sh\nprintf 'v 0 0 0\\nv 24 0 0\\nv 24 24 0\\nf 1 2 3\\n' > \"$2\"\nexec sleep 5\n",
  )
  .unwrap();
  std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

  let config = config();
  let optimizer = ExternalOptimizer::new(&program).with_timeout(Duration::from_millis(200));
  let loader = LevelLoader::new(&config, &optimizer);

  for _ in 0..2 {
    let mut world = ChainWorld::new();
    let level = loader.load_file(&path, &mut world).unwrap();
    assert_eq!(level.collision[0].source, MeshSource::Unoptimized);
    assert_eq!(level.collision[0].loops, 3);
    assert!(matches!(
      level.report.for_layer("level").next().map(|d| &d.error),
      Some(LayerError::Optimizer(OptimizerError::TimedOut { .. }))
    ));
    assert!(!dir.path().join("layer_level_solid.obj").exists());
  }
}

#[test]
fn shared_layer_body_collects_all_loops() {
  let dir = TempDir::new().unwrap();
  let path = write_level(&dir, LEVEL);
  let mut config = config();
  config.optimizer.enabled = false;
  config.collision.share_layer_body = true;
  let optimizer = CopyOptimizer::default();

  let mut world = ChainWorld::new();
  LevelLoader::new(&config, &optimizer).load_file(&path, &mut world).unwrap();

  assert_eq!(optimizer.calls.get(), 0);
  assert_eq!(world.bodies().len(), 2);
  assert_eq!(world.bodies()[0].fixtures.len(), 3);
}

#[test]
fn degenerate_cache_is_reported_at_runtime() {
  let dir = TempDir::new().unwrap();
  let path = write_level(&dir, LEVEL);
  let cached = dir.path().join("layer_level_solid.obj");
  std::fs::write(&cached, "v 0 0 0\nv 24 0 0\nv 24 24 0\nv 0 0 0\nf 1 2 3 4\n").unwrap();
  set_mtime(&cached, SystemTime::now() + Duration::from_secs(60));

  let config = config();
  let optimizer = CopyOptimizer::default();
  let mut world = ChainWorld::new();
  let level = LevelLoader::new(&config, &optimizer).load_file(&path, &mut world).unwrap();

  assert!(matches!(
    level.report.for_layer("level").next().map(|d| &d.error),
    Some(LayerError::Geometry(_))
  ));
  assert_eq!(level.collision[0].source, MeshSource::Unoptimized);
  assert_eq!(level.collision[0].loops, 3);
}

#[test]
fn degenerate_cache_aborts_content_validation() {
  let dir = TempDir::new().unwrap();
  let path = write_level(&dir, LEVEL);
  let cached = dir.path().join("layer_level_solid.obj");
  std::fs::write(&cached, "v 0 0 0\nv 24 0 0\nf 1 2\n").unwrap();
  set_mtime(&cached, SystemTime::now() + Duration::from_secs(60));

  let mut config = config();
  config.collision.validation = ValidationMode::Content;
  let optimizer = CopyOptimizer::default();
  let mut world = ChainWorld::new();
  let err = LevelLoader::new(&config, &optimizer)
    .load_file(&path, &mut world)
    .unwrap_err();

  match err {
    LevelLoadError::Geometry { layer, .. } => assert_eq!(layer, "level"),
    other => panic!("unexpected error: {}", other),
  }
}

#[test]
fn stale_cache_is_regenerated() {
  let dir = TempDir::new().unwrap();
  let path = write_level(&dir, LEVEL);
  let cached = dir.path().join("layer_level_solid.obj");
  std::fs::write(&cached, "v 0 0 0\nv 24 0 0\nv 24 24 0\nf 1 2 3\n").unwrap();
  set_mtime(&cached, SystemTime::now() - Duration::from_secs(3600));

  let config = config();
  let optimizer = CopyOptimizer::default();
  let mut world = ChainWorld::new();
  let level = LevelLoader::new(&config, &optimizer).load_file(&path, &mut world).unwrap();

  assert_eq!(optimizer.calls.get(), 2);
  assert_eq!(level.collision[0].source, MeshSource::Optimized);
  assert_eq!(level.collision[0].loops, 3);
}

#[test]
fn layers_are_ordered_by_z_and_stencil_is_wired() {
  let dir = TempDir::new().unwrap();
  let path = write_level(&dir, LEVEL);
  let mut config = config();
  config.optimizer.enabled = false;
  let optimizer = CopyOptimizer::default();

  let mut world = ChainWorld::new();
  let level = LevelLoader::new(&config, &optimizer).load_file(&path, &mut world).unwrap();

  let names: Vec<_> = level.layers.iter().map(|l| l.name()).collect();
  assert_eq!(names, vec!["sky", "level", "spikes", "glow"]);

  let Some(LevelLayer::Stenciled(glow)) = level.layer("glow") else {
    panic!("glow should be stenciled");
  };
  assert_eq!(glow.mask_name(), "level");

  let mut target = RecordingTarget::new();
  level.layer("glow").unwrap().draw(&level.layers, &mut target, BlockPos::new(0, 0));
  let stencils: Vec<_> = target
    .calls
    .iter()
    .map(|c| match c {
      RenderCall::ClearStencil(v) => format!("clear {}", v),
      RenderCall::Draw { stencil, .. } => format!("{:?}", stencil),
      RenderCall::DisableStencil => "disable".to_string(),
    })
    .collect();
  assert_eq!(
    stencils,
    vec![
      "clear 0".to_string(),
      format!("{:?}", StencilMode::Write { reference: 1 }),
      format!("{:?}", StencilMode::TestEqual { reference: 1 }),
      "disable".to_string(),
    ]
  );
}

#[test]
fn hidden_mask_tiles_are_hidden_in_the_stencil() {
  let dir = TempDir::new().unwrap();
  let path = write_level(&dir, LEVEL);
  let mut config = config();
  config.optimizer.enabled = false;
  let optimizer = CopyOptimizer::default();

  let mut world = ChainWorld::new();
  let mut level = LevelLoader::new(&config, &optimizer).load_file(&path, &mut world).unwrap();
  assert!(level.layer_mut("level").unwrap().map_mut().hide_tile(0, 0));

  let mut target = RecordingTarget::new();
  level.layer("glow").unwrap().draw(&level.layers, &mut target, BlockPos::new(0, 0));
  let mask_pass = target.calls.iter().find_map(|c| match c {
    RenderCall::Draw {
      stencil: StencilMode::Write { .. },
      quads,
      hidden,
      ..
    } => Some((*quads, *hidden)),
    _ => None,
  });
  assert_eq!(mask_pass, Some((3, 1)));
}

#[test]
fn bad_stencil_references_skip_the_layer() {
  let text = r#"
    name = "stencils"

    [[tilesets]]
    name = "terrain"
    first_gid = 1
    tile_size = [24, 24]
    columns = 4
    tile_count = 16
    image = "terrain.png"
    image_size = [96, 96]

    [[layers]]
    name = "mirror"
    width = 1
    height = 1
    data = "1"
    properties = { stencil_reference = "mirror" }

    [[layers]]
    name = "orphan"
    width = 1
    height = 1
    data = "1"
    properties = { stencil_reference = "nowhere" }
  "#;
  let source = LevelSource::from_toml_str(text).unwrap();
  let config = config();
  let optimizer = CopyOptimizer::default();
  let mut world = ChainWorld::new();
  let level = LevelLoader::new(&config, &optimizer).load(&source, &mut world).unwrap();

  assert!(level.layers.is_empty());
  assert!(matches!(
    level.report.for_layer("mirror").next().map(|d| &d.error),
    Some(LayerError::TileMap(TileMapError::SelfReference { .. }))
  ));
  assert!(matches!(
    level.report.for_layer("orphan").next().map(|d| &d.error),
    Some(LayerError::TileMap(TileMapError::MissingMask { .. }))
  ));
}

#[test]
fn unknown_tile_ids_are_diagnosed_per_layer() {
  let text = r#"
    name = "gaps"

    [[tilesets]]
    name = "terrain"
    first_gid = 10
    tile_size = [24, 24]
    columns = 4
    tile_count = 16
    image = "terrain.png"
    image_size = [96, 96]

    [[layers]]
    name = "broken"
    width = 1
    height = 1
    data = "3"

    [[layers]]
    name = "fine"
    width = 1
    height = 1
    data = "10"
  "#;
  let source = LevelSource::from_toml_str(text).unwrap();
  let config = config();
  let optimizer = CopyOptimizer::default();
  let mut world = ChainWorld::new();
  let level = LevelLoader::new(&config, &optimizer).load(&source, &mut world).unwrap();

  assert_eq!(level.layers.len(), 1);
  assert!(matches!(
    level.report.for_layer("broken").next().map(|d| &d.error),
    Some(LayerError::MissingTileset { gid: 3 })
  ));
}

const EMPTY_COLLISION: &str = r#"
  name = "empty"

  [[tilesets]]
  name = "terrain"
  first_gid = 1
  tile_size = [24, 24]
  columns = 4
  tile_count = 16
  image = "terrain.png"
  image_size = [96, 96]

  [[layers]]
  name = "level"
  width = 2
  height = 1
  data = "0,0"

  [[layers]]
  name = "decor"
  width = 2
  height = 1
  data = "0,0"
"#;

#[test]
fn empty_collision_layer_is_diagnosed() {
  let source = LevelSource::from_toml_str(EMPTY_COLLISION).unwrap();
  let config = config();
  let optimizer = CopyOptimizer::default();
  let mut world = ChainWorld::new();
  let level = LevelLoader::new(&config, &optimizer).load(&source, &mut world).unwrap();

  assert!(level.layers.is_empty());
  assert_eq!(level.report.diagnostics.len(), 1);
  assert!(matches!(
    level.report.for_layer("level").next().map(|d| &d.error),
    Some(LayerError::Geometry(GeometryError::NoCollisionVertices))
  ));
  assert_eq!(optimizer.calls.get(), 0);
}

#[test]
fn empty_collision_layer_aborts_content_validation() {
  let source = LevelSource::from_toml_str(EMPTY_COLLISION).unwrap();
  let mut config = config();
  config.collision.validation = ValidationMode::Content;
  let optimizer = CopyOptimizer::default();
  let mut world = ChainWorld::new();
  let err = LevelLoader::new(&config, &optimizer).load(&source, &mut world).unwrap_err();
  assert!(matches!(
    err,
    LevelLoadError::Geometry {
      error: GeometryError::NoCollisionVertices,
      ..
    }
  ));
}

#[test]
fn missing_level_file_is_an_io_error() {
  let dir = TempDir::new().unwrap();
  let config = config();
  let optimizer = CopyOptimizer::default();
  let mut world = ChainWorld::new();
  let err = LevelLoader::new(&config, &optimizer)
    .load_file(&dir.path().join("absent.toml"), &mut world)
    .unwrap_err();
  assert!(matches!(err, LevelLoadError::Io { .. }));
}
