//! Bevy integration.
//!
//! [`LevelGeometryPlugin`] loads a level at startup, keeps its tile maps in
//! [`LevelTileMaps`], advances animations around the [`LevelFocus`] entity
//! every frame and reloads the level when the source file changes.
//!
//! The focus entity's translation is read as level pixels.

use std::path::PathBuf;

use bevy::prelude::*;

#[cfg(not(feature = "rapier2d"))]
use crate::collision::ChainWorld;
#[cfg(feature = "rapier2d")]
use crate::collision::physics::rapier::{LevelGeometryBody, RapierChainWorld};
use crate::collision::{ExternalOptimizer, PhysicsLoop};
use crate::config::LevelGeometryConfig;
use crate::coords::BlockPos;
use crate::level::{LevelFileWatcher, LevelLayer, LevelLoadError, LevelLoader, LoadedLevel, find_layer};
use crate::tilemap::RenderTarget;

/// Marks the entity whose position drives culling and animation streaming.
#[derive(Component, Debug, Default)]
pub struct LevelFocus;

/// Tile maps and collision chains of the loaded level.
#[derive(Resource, Debug, Default)]
pub struct LevelTileMaps {
  pub name: String,
  pub layers: Vec<LevelLayer>,
  pub chains: Vec<PhysicsLoop>,
  /// Block of the focus entity in the first layer's tile size, as of the
  /// last update.
  pub focus_block: Option<BlockPos>,
}

impl LevelTileMaps {
  pub fn set_level(&mut self, level: LoadedLevel) {
    self.name = level.name;
    self.layers = level.layers;
    self.chains = level.chains;
    self.focus_block = None;
  }

  pub fn layer(&self, name: &str) -> Option<&LevelLayer> {
    find_layer(&self.layers, name)
  }

  pub fn layer_mut(&mut self, name: &str) -> Option<&mut LevelLayer> {
    self.layers.iter_mut().find(|l| l.name() == name)
  }

  /// Draws all layers around a pixel position.
  pub fn draw(&self, target: &mut dyn RenderTarget, focus_pixels: Vec2) {
    for layer in &self.layers {
      let block = layer.map().player_block(focus_pixels);
      layer.draw(&self.layers, target, block);
    }
  }
}

/// Background watcher of the level file, when enabled.
#[derive(Resource, Default)]
pub struct LevelWatcher(pub Option<LevelFileWatcher>);

/// Set when the level file changed and the level should be reloaded.
#[derive(Resource, Debug, Default)]
pub struct LevelReloadRequested(pub bool);

/// Path of the level loaded by the plugin.
#[derive(Resource, Debug, Clone)]
pub struct LevelPath(pub PathBuf);

/// In-memory physics world used when no physics backend is enabled.
#[cfg(not(feature = "rapier2d"))]
#[derive(Resource, Debug, Default)]
pub struct LevelPhysics(pub ChainWorld);

#[derive(Default)]
pub struct LevelGeometryPlugin {
  pub config: LevelGeometryConfig,
  /// Level description loaded at startup.
  pub level: Option<PathBuf>,
}

impl LevelGeometryPlugin {
  pub fn new(config: LevelGeometryConfig) -> Self {
    Self { config, level: None }
  }

  pub fn with_level(mut self, path: impl Into<PathBuf>) -> Self {
    self.level = Some(path.into());
    self
  }
}

impl Plugin for LevelGeometryPlugin {
  fn build(&self, app: &mut App) {
    app.insert_resource(self.config.clone());
    app.init_resource::<LevelTileMaps>();
    app.init_resource::<LevelReloadRequested>();
    app.init_resource::<LevelWatcher>();
    #[cfg(not(feature = "rapier2d"))]
    app.init_resource::<LevelPhysics>();

    if let Some(path) = &self.level {
      app.insert_resource(LevelPath(path.clone()));
      app.add_systems(Startup, (load_level_system, start_watcher).chain());
    }

    app.add_systems(
      Update,
      (
        poll_level_watcher,
        reload_level_system.run_if(reload_requested),
        update_level_animation,
      )
        .chain(),
    );
  }
}

fn start_watcher(config: Res<LevelGeometryConfig>, path: Res<LevelPath>, mut watcher: ResMut<LevelWatcher>) {
  if !config.watcher.enabled {
    return;
  }
  match LevelFileWatcher::spawn(path.0.clone(), config.watcher.poll_interval()) {
    Ok(w) => watcher.0 = Some(w),
    Err(e) => warn!("could not watch {}: {}", path.0.display(), e),
  }
}

fn poll_level_watcher(watcher: Res<LevelWatcher>, mut reload: ResMut<LevelReloadRequested>) {
  let Some(watcher) = &watcher.0 else {
    return;
  };
  if watcher.take_dirty() {
    info!("{} changed, reloading level", watcher.path().display());
    reload.0 = true;
  }
}

fn reload_requested(reload: Res<LevelReloadRequested>) -> bool {
  reload.0
}

/// Advances animated tiles around the focus entity.
pub fn update_level_animation(
  time: Res<Time>,
  focus: Query<&GlobalTransform, With<LevelFocus>>,
  mut maps: ResMut<LevelTileMaps>,
) {
  let Some(transform) = focus.iter().next() else {
    return;
  };
  let pixels = transform.translation().truncate();
  let dt = time.delta();

  let mut first_block = None;
  for layer in &mut maps.layers {
    let block = layer.map().player_block(pixels);
    first_block.get_or_insert(block);
    layer.update(dt, block);
  }
  maps.focus_block = first_block;
}

fn load_level_system(world: &mut World) {
  let Some(path) = world.get_resource::<LevelPath>().map(|p| p.0.clone()) else {
    return;
  };
  let config = world
    .get_resource::<LevelGeometryConfig>()
    .cloned()
    .unwrap_or_default();
  let optimizer = ExternalOptimizer::from_config(&config.optimizer);
  let loader = LevelLoader::new(&config, &optimizer);

  match load_into_world(&loader, &path, &config, world) {
    Ok(level) => {
      if !level.is_clean() {
        warn!(
          "level '{}' loaded with {} problems",
          level.name,
          level.report.diagnostics.len()
        );
      }
      world.resource_mut::<LevelTileMaps>().set_level(level);
    }
    Err(e) => error!("failed to load {}: {}", path.display(), e),
  }
}

fn reload_level_system(world: &mut World) {
  world.resource_mut::<LevelReloadRequested>().0 = false;
  clear_level_physics(world);
  load_level_system(world);
}

#[cfg(feature = "rapier2d")]
fn load_into_world(
  loader: &LevelLoader<'_>,
  path: &std::path::Path,
  config: &LevelGeometryConfig,
  world: &mut World,
) -> Result<LoadedLevel, LevelLoadError> {
  let mut physics = RapierChainWorld::new(world).with_scale(config.units.pixels_per_meter);
  loader.load_file(path, &mut physics)
}

#[cfg(not(feature = "rapier2d"))]
fn load_into_world(
  loader: &LevelLoader<'_>,
  path: &std::path::Path,
  _config: &LevelGeometryConfig,
  world: &mut World,
) -> Result<LoadedLevel, LevelLoadError> {
  let mut physics = ChainWorld::new();
  let level = loader.load_file(path, &mut physics)?;
  world.resource_mut::<LevelPhysics>().0 = physics;
  Ok(level)
}

#[cfg(feature = "rapier2d")]
fn clear_level_physics(world: &mut World) {
  let bodies: Vec<Entity> = world
    .query_filtered::<Entity, With<LevelGeometryBody>>()
    .iter(world)
    .collect();
  for body in bodies {
    world.despawn(body);
  }
}

#[cfg(not(feature = "rapier2d"))]
fn clear_level_physics(world: &mut World) {
  world.resource_mut::<LevelPhysics>().0 = ChainWorld::new();
}
