//! Level loading.
//!
//! [`LevelLoader`] runs every stage of the pipeline for each layer of a
//! [`LevelSource`]:
//!
//! 1. Tile data is assembled into a dense grid.
//! 2. The layer's tileset is resolved from its smallest tile id.
//! 3. A [`SpatialTileMap`] is built, and stencil layers are paired with their
//!    mask.
//! 4. Collision layers load `layer_<name>_<kind>.obj` from the cache
//!    directory, regenerating it through the optimizer when missing, and the
//!    resulting loops are added to the physics world.
//!
//! Problems are handled per layer. They become [`Diagnostic`]s and the layer
//! (or only its collision) is skipped. Geometry errors abort the load when
//! the collision validation mode is [`ValidationMode::Content`].

mod source;
pub mod watcher;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bevy::log::{error, info, warn};
pub use source::{
  ChunkSource, FrameSource, LayerProperties, LayerSource, LevelSource, ObjectSource, TileSource,
  TilesetSource,
};
pub use watcher::LevelFileWatcher;

use crate::collision::{
  ChainReport, CollisionLayerKind, FixtureSettings, GeometryError, MeshOptimizer, ObjMesh,
  OptimizerError, ParseOptions, PhysicsLoop, PhysicsWorld, add_loop_to_world, analyze_chains,
  build_mesh, dump_obj, loops_from_mesh, parse_obj,
};
use crate::config::{LevelGeometryConfig, ValidationMode};
use crate::coords::BlockPos;
use crate::grid::{ChunkError, GridError, TileGrid};
use crate::tilemap::{RenderTarget, SpatialTileMap, StencilMask, TileMapError};
use crate::tileset::{Tileset, resolve_tileset};

/// Renderable layer of a loaded level.
#[derive(Debug, Clone)]
pub enum LevelLayer {
  Plain(SpatialTileMap),
  Stenciled(StencilMask),
}

impl LevelLayer {
  /// The drawn map (the content map for stenciled layers).
  pub fn map(&self) -> &SpatialTileMap {
    match self {
      Self::Plain(map) => map,
      Self::Stenciled(stencil) => stencil.content(),
    }
  }

  pub fn map_mut(&mut self) -> &mut SpatialTileMap {
    match self {
      Self::Plain(map) => map,
      Self::Stenciled(stencil) => stencil.content_mut(),
    }
  }

  pub fn name(&self) -> &str {
    self.map().name()
  }

  pub fn z(&self) -> i32 {
    self.map().z()
  }

  pub fn update(&mut self, dt: Duration, player_block: BlockPos) {
    match self {
      Self::Plain(map) => map.update(dt, player_block),
      Self::Stenciled(stencil) => stencil.update(dt, player_block),
    }
  }

  /// Draws the layer. Stenciled layers look up their mask in `layers` and
  /// draw nothing if it is gone.
  pub fn draw(&self, layers: &[LevelLayer], target: &mut dyn RenderTarget, player_block: BlockPos) {
    match self {
      Self::Plain(map) => map.draw(target, player_block),
      Self::Stenciled(stencil) => {
        if let Some(mask) = find_layer(layers, stencil.mask_name()) {
          stencil.draw(mask.map(), target, player_block);
        }
      }
    }
  }
}

/// Layer named `name`.
pub fn find_layer<'a>(layers: &'a [LevelLayer], name: &str) -> Option<&'a LevelLayer> {
  layers.iter().find(|l| l.name() == name)
}

/// Where a layer's collision loops came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshSource {
  /// Pre-optimized OBJ found on disk.
  Cache,
  /// Freshly produced by the optimizer.
  Optimized,
  /// Welded tile shapes, used when optimization was not possible.
  Unoptimized,
}

/// Collision result of one layer.
#[derive(Debug, Clone)]
pub struct LayerCollision {
  pub layer: String,
  pub kind: CollisionLayerKind,
  pub source: MeshSource,
  pub loops: usize,
}

/// Per-layer problem that did not abort the load.
#[derive(Debug)]
pub enum LayerError {
  Grid(GridError),
  Chunk(ChunkError),
  MissingTileset { gid: i32 },
  TileMap(TileMapError),
  Geometry(GeometryError),
  Optimizer(OptimizerError),
}

impl std::fmt::Display for LayerError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Grid(e) => write!(f, "tile data: {}", e),
      Self::Chunk(e) => write!(f, "chunks: {}", e),
      Self::MissingTileset { gid } => write!(f, "no tileset contains tile id {}", gid),
      Self::TileMap(e) => write!(f, "{}", e),
      Self::Geometry(e) => write!(f, "collision: {}", e),
      Self::Optimizer(e) => write!(f, "{}", e),
    }
  }
}

#[derive(Debug)]
pub struct Diagnostic {
  pub layer: String,
  pub error: LayerError,
}

impl std::fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "layer '{}': {}", self.layer, self.error)
  }
}

#[derive(Debug, Default)]
pub struct LevelLoadReport {
  pub diagnostics: Vec<Diagnostic>,
}

impl LevelLoadReport {
  pub fn is_clean(&self) -> bool {
    self.diagnostics.is_empty()
  }

  pub fn for_layer<'a>(&'a self, layer: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
    self.diagnostics.iter().filter(move |d| d.layer == layer)
  }

  fn push(&mut self, layer: &str, error: LayerError) {
    let diagnostic = Diagnostic {
      layer: layer.to_string(),
      error,
    };
    warn!("{}", diagnostic);
    self.diagnostics.push(diagnostic);
  }
}

/// Result of a level load.
#[derive(Debug)]
pub struct LoadedLevel {
  pub name: String,
  /// Renderable layers in draw order (ascending z, then source order).
  pub layers: Vec<LevelLayer>,
  /// All collision loops added to the physics world.
  pub chains: Vec<PhysicsLoop>,
  pub collision: Vec<LayerCollision>,
  pub chain_report: Option<ChainReport>,
  pub report: LevelLoadReport,
}

impl LoadedLevel {
  pub fn is_clean(&self) -> bool {
    self.report.is_clean()
  }

  pub fn layer(&self, name: &str) -> Option<&LevelLayer> {
    find_layer(&self.layers, name)
  }

  pub fn layer_mut(&mut self, name: &str) -> Option<&mut LevelLayer> {
    self.layers.iter_mut().find(|l| l.name() == name)
  }

  pub fn update(&mut self, dt: Duration, player_block: BlockPos) {
    for layer in &mut self.layers {
      layer.update(dt, player_block);
    }
  }

  pub fn draw(&self, target: &mut dyn RenderTarget, player_block: BlockPos) {
    for layer in &self.layers {
      layer.draw(&self.layers, target, player_block);
    }
  }
}

/// Error that aborts a level load.
#[derive(Debug)]
pub enum LevelLoadError {
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  Parse {
    path: PathBuf,
    source: toml::de::Error,
  },
  /// Malformed collision geometry in content validation mode.
  Geometry {
    layer: String,
    error: GeometryError,
  },
}

impl std::fmt::Display for LevelLoadError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Io { path, source } => write!(f, "failed to read {}: {}", path.display(), source),
      Self::Parse { path, source } => write!(f, "invalid level {}: {}", path.display(), source),
      Self::Geometry { layer, error } => write!(f, "layer '{}': {}", layer, error),
    }
  }
}

impl std::error::Error for LevelLoadError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Io { source, .. } => Some(source),
      Self::Parse { source, .. } => Some(source),
      Self::Geometry { error, .. } => Some(error),
    }
  }
}

/// Reads a level description file.
pub fn read_level_source(path: &Path) -> Result<LevelSource, LevelLoadError> {
  let text = std::fs::read_to_string(path).map_err(|e| LevelLoadError::Io {
    path: path.to_path_buf(),
    source: e,
  })?;
  LevelSource::from_toml_str(&text).map_err(|e| LevelLoadError::Parse {
    path: path.to_path_buf(),
    source: e,
  })
}

/// Runs the level pipeline.
pub struct LevelLoader<'a> {
  config: &'a LevelGeometryConfig,
  optimizer: &'a dyn MeshOptimizer,
  cache_dir: PathBuf,
}

impl<'a> LevelLoader<'a> {
  pub fn new(config: &'a LevelGeometryConfig, optimizer: &'a dyn MeshOptimizer) -> Self {
    Self {
      config,
      optimizer,
      cache_dir: PathBuf::from("."),
    }
  }

  /// Directory holding the OBJ cache and tileset images.
  pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cache_dir = dir.into();
    self
  }

  pub fn cache_dir(&self) -> &Path {
    &self.cache_dir
  }

  /// Reads `path` and loads it with the file's directory as cache directory.
  ///
  /// Cached OBJ files older than the level file are removed first so they
  /// are regenerated.
  pub fn load_file<W: PhysicsWorld>(&self, path: &Path, world: &mut W) -> Result<LoadedLevel, LevelLoadError> {
    let source = read_level_source(path)?;
    let dir = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."));
    let loader = LevelLoader {
      config: self.config,
      optimizer: self.optimizer,
      cache_dir: dir,
    };
    loader.remove_stale_cache(path, &source);
    loader.load(&source, world)
  }

  /// Loads an in-memory level description.
  pub fn load<W: PhysicsWorld>(&self, source: &LevelSource, world: &mut W) -> Result<LoadedLevel, LevelLoadError> {
    info!("loading level '{}' ({} layers)", source.name, source.layers.len());

    let tilesets = source.tilesets(&self.cache_dir);
    let mut report = LevelLoadReport::default();
    let mut maps: Vec<(usize, SpatialTileMap)> = Vec::new();
    let mut chains = Vec::new();
    let mut collision = Vec::new();

    for (index, layer) in source.layers.iter().enumerate() {
      let Some((grid, tileset)) = self.prepare_layer(layer, &tilesets, &mut report)? else {
        continue;
      };

      match SpatialTileMap::build(&layer.layer_info(), &grid, tileset) {
        Ok(map) => maps.push((
          index,
          map.with_ranges(self.config.culling.draw, self.config.culling.update),
        )),
        Err(e) => report.push(&layer.name, LayerError::TileMap(e)),
      }

      let collision_prop = layer.properties.collision.as_deref();
      if let Some(kind) = CollisionLayerKind::detect(&layer.name, collision_prop) {
        if let Some((loops, mesh_source)) = self.layer_loops(&layer.name, kind, &grid, tileset, &mut report)? {
          self.add_to_world(world, &loops);
          collision.push(LayerCollision {
            layer: layer.name.clone(),
            kind,
            source: mesh_source,
            loops: loops.len(),
          });
          chains.extend(loops);
        }
      }
    }

    let layers = self.compose_layers(source, maps, &mut report);

    let chain_report = self
      .config
      .collision
      .analyze_chains
      .then(|| analyze_chains(&chains, self.config.collision.weld_precision));

    info!(
      "level '{}' loaded: {} layers, {} chains, {} diagnostics",
      source.name,
      layers.len(),
      chains.len(),
      report.diagnostics.len()
    );

    Ok(LoadedLevel {
      name: source.name.clone(),
      layers,
      chains,
      collision,
      chain_report,
      report,
    })
  }

  /// Assembles a layer's grid and resolves its tileset.
  ///
  /// Returns `Ok(None)` when the layer is skipped. Empty layers are skipped
  /// quietly unless they are collision layers.
  fn prepare_layer<'t>(
    &self,
    layer: &LayerSource,
    tilesets: &'t [Tileset],
    report: &mut LevelLoadReport,
  ) -> Result<Option<(TileGrid, &'t Tileset)>, LevelLoadError> {
    let data = match layer.layer_data() {
      Ok(data) => data,
      Err(e) => {
        report.push(&layer.name, LayerError::Grid(e));
        return Ok(None);
      }
    };
    let grid = match data.into_grid() {
      Ok(grid) => grid,
      Err(e) => {
        report.push(&layer.name, LayerError::Chunk(e));
        return Ok(None);
      }
    };
    let offset = grid.offset() + layer.extra_offset();
    let grid = grid.with_offset(offset);

    let Some(gid) = grid.min_gid() else {
      if CollisionLayerKind::detect(&layer.name, layer.properties.collision.as_deref()).is_some() {
        self.geometry_problem(&layer.name, GeometryError::NoCollisionVertices, report)?;
      }
      return Ok(None);
    };
    match resolve_tileset(tilesets, gid) {
      Some(tileset) => Ok(Some((grid, tileset))),
      None => {
        report.push(&layer.name, LayerError::MissingTileset { gid });
        Ok(None)
      }
    }
  }

  /// Produces a layer's loops from cache, optimizer or raw mesh.
  ///
  /// Returns `Ok(None)` when the layer has no usable collision.
  fn layer_loops(
    &self,
    layer: &str,
    kind: CollisionLayerKind,
    grid: &TileGrid,
    tileset: &Tileset,
    report: &mut LevelLoadReport,
  ) -> Result<Option<(Vec<PhysicsLoop>, MeshSource)>, LevelLoadError> {
    let options = self.parse_options();
    let object_type = kind.object_type();
    let optimized = self.cache_dir.join(kind.optimized_file_name(layer));

    if optimized.exists() {
      info!("loading {}", optimized.display());
      match parse_obj(&optimized, object_type, &options) {
        Ok(loops) => return Ok(Some((loops, MeshSource::Cache))),
        Err(e) => self.geometry_problem(layer, e, report)?,
      }
      let mesh = match build_mesh(grid, tileset, self.config.collision.weld_precision) {
        Ok(mesh) => mesh,
        Err(e) => {
          self.geometry_problem(layer, e, report)?;
          return Ok(None);
        }
      };
      return self.fallback(layer, &mesh, kind, report);
    }

    let unoptimized = self.cache_dir.join(kind.unoptimized_file_name(layer));
    let mesh = match dump_obj(grid, tileset, &unoptimized, self.config.collision.weld_precision) {
      Ok(mesh) => mesh,
      Err(e) => {
        error!("dumping {} failed: {}", unoptimized.display(), e);
        self.geometry_problem(layer, e, report)?;
        return Ok(None);
      }
    };

    if !self.config.optimizer.enabled {
      return self.fallback(layer, &mesh, kind, report);
    }

    // Whatever a failed run left behind must not be read as a cache hit.
    if let Err(e) = self.optimizer.optimize(&unoptimized, &optimized) {
      discard(&optimized);
      report.push(layer, LayerError::Optimizer(e));
      return self.fallback(layer, &mesh, kind, report);
    }

    match parse_obj(&optimized, object_type, &options) {
      Ok(loops) => Ok(Some((loops, MeshSource::Optimized))),
      Err(e) => {
        discard(&optimized);
        self.geometry_problem(layer, e, report)?;
        self.fallback(layer, &mesh, kind, report)
      }
    }
  }

  fn fallback(
    &self,
    layer: &str,
    mesh: &ObjMesh,
    kind: CollisionLayerKind,
    report: &mut LevelLoadReport,
  ) -> Result<Option<(Vec<PhysicsLoop>, MeshSource)>, LevelLoadError> {
    warn!("layer '{}': using un-optimized collision mesh", layer);
    match loops_from_mesh(mesh, kind.object_type(), &self.parse_options()) {
      Ok(loops) => Ok(Some((loops, MeshSource::Unoptimized))),
      Err(e) => {
        self.geometry_problem(layer, e, report)?;
        Ok(None)
      }
    }
  }

  /// Records a geometry error, or aborts in content validation mode.
  fn geometry_problem(&self, layer: &str, error: GeometryError, report: &mut LevelLoadReport) -> Result<(), LevelLoadError> {
    match self.config.collision.validation {
      ValidationMode::Content => {
        error!("layer '{}': {}", layer, error);
        Err(LevelLoadError::Geometry {
          layer: layer.to_string(),
          error,
        })
      }
      ValidationMode::Runtime => {
        report.push(layer, LayerError::Geometry(error));
        Ok(())
      }
    }
  }

  fn add_to_world<W: PhysicsWorld>(&self, world: &mut W, loops: &[PhysicsLoop]) {
    let settings = FixtureSettings::from_config(&self.config.collision);
    let mut shared = None;
    for lp in loops {
      let body = add_loop_to_world(world, lp, &settings, shared);
      if self.config.collision.share_layer_body {
        shared = Some(body);
      }
    }
  }

  fn parse_options(&self) -> ParseOptions {
    ParseOptions {
      pixels_per_meter: self.config.units.pixels_per_meter,
      winding: self.config.collision.winding,
    }
  }

  /// Pairs stencil layers with their masks and orders layers by z.
  fn compose_layers(
    &self,
    source: &LevelSource,
    maps: Vec<(usize, SpatialTileMap)>,
    report: &mut LevelLoadReport,
  ) -> Vec<LevelLayer> {
    let by_name: HashMap<&str, &SpatialTileMap> = maps.iter().map(|(_, m)| (m.name(), m)).collect();
    let mut layers: Vec<(i32, usize, LevelLayer)> = Vec::with_capacity(maps.len());

    for (index, map) in &maps {
      let layer = &source.layers[*index];
      let Some(mask_name) = layer.properties.stencil_reference.as_deref() else {
        layers.push((map.z(), *index, LevelLayer::Plain(map.clone())));
        continue;
      };

      if mask_name == layer.name {
        report.push(
          &layer.name,
          LayerError::TileMap(TileMapError::SelfReference {
            layer: layer.name.clone(),
          }),
        );
        continue;
      }

      let Some(mask) = by_name.get(mask_name) else {
        report.push(
          &layer.name,
          LayerError::TileMap(TileMapError::MissingMask {
            layer: layer.name.clone(),
            mask: mask_name.to_string(),
          }),
        );
        continue;
      };

      match StencilMask::new(mask, map.clone(), layer.properties.alpha_threshold) {
        Ok(stencil) => layers.push((map.z(), *index, LevelLayer::Stenciled(stencil))),
        Err(e) => report.push(&layer.name, LayerError::TileMap(e)),
      }
    }

    layers.sort_by_key(|(z, index, _)| (*z, *index));
    layers.into_iter().map(|(_, _, layer)| layer).collect()
  }

  /// Removes cached OBJ files that predate the level file.
  fn remove_stale_cache(&self, level_path: &Path, source: &LevelSource) {
    let Some(level_time) = modified(level_path) else {
      return;
    };
    for layer in &source.layers {
      let Some(kind) = CollisionLayerKind::detect(&layer.name, layer.properties.collision.as_deref()) else {
        continue;
      };
      let optimized = self.cache_dir.join(kind.optimized_file_name(&layer.name));
      let stale = modified(&optimized).is_some_and(|t| t < level_time);
      if !stale {
        continue;
      }
      info!("level changed, deleting cached {}", optimized.display());
      let unoptimized = self.cache_dir.join(kind.unoptimized_file_name(&layer.name));
      discard(&optimized);
      discard(&unoptimized);
    }
  }
}

/// Removes a cache file if present.
fn discard(path: &Path) {
  if let Err(e) = std::fs::remove_file(path) {
    if e.kind() != std::io::ErrorKind::NotFound {
      warn!("failed to remove {}: {}", path.display(), e);
    }
  }
}

fn modified(path: &Path) -> Option<std::time::SystemTime> {
  std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
