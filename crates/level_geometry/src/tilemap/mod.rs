//! Block-partitioned tile map with proximity streaming.
//!
//! Static tiles are bucketed into [`BLOCK_SIZE`](crate::coords::BLOCK_SIZE)
//! square blocks so drawing only touches blocks near the player. Animated
//! tiles live in a separate registry and are never stored in a block.
//!
//! Positions are level pixels. UVs are atlas pixels; renderers normalize
//! them against the atlas size.

mod animation;
pub mod mesh;
pub mod render;
pub mod stencil;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use bevy::log::{debug, warn};
use bevy::math::{UVec2, Vec2};
use serde::Deserialize;

pub use animation::{AnimatedTile, FrameCell};
pub use render::{RecordingTarget, RenderCall, RenderPass, RenderStates, RenderTarget, StencilMode};
pub use stencil::StencilMask;

use crate::coords::{BlockPos, TilePos};
use crate::culling::BlockRange;
use crate::grid::TileGrid;
use crate::tileset::{Tileset, TilesetImage};

/// Vertex color. Re-exported from the `palette` crate.
pub type Rgba = palette::Srgba<u8>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileVertex {
  /// Level pixels.
  pub position: Vec2,
  /// Atlas pixels.
  pub uv: Vec2,
  pub color: Rgba,
}

/// Four vertices of one tile, clockwise from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileQuad {
  pub tile: TilePos,
  pub vertices: [TileVertex; 4],
}

impl TileQuad {
  fn new(tile: TilePos, tile_size: UVec2, uv_min: Vec2, uv_max: Vec2, color: Rgba) -> Self {
    let min = tile.to_pixels(tile_size);
    let max = min + tile_size.as_vec2();
    let vertex = |position, uv| TileVertex { position, uv, color };
    Self {
      tile,
      vertices: [
        vertex(min, uv_min),
        vertex(Vec2::new(max.x, min.y), Vec2::new(uv_max.x, uv_min.y)),
        vertex(max, uv_max),
        vertex(Vec2::new(min.x, max.y), Vec2::new(uv_min.x, uv_max.y)),
      ],
    }
  }

  /// Rewrites the UVs for another atlas rect.
  pub(crate) fn set_uv(&mut self, uv_min: Vec2, uv_max: Vec2) {
    self.vertices[0].uv = uv_min;
    self.vertices[1].uv = Vec2::new(uv_max.x, uv_min.y);
    self.vertices[2].uv = uv_max;
    self.vertices[3].uv = Vec2::new(uv_min.x, uv_max.y);
  }

  pub(crate) fn hide(&mut self) {
    for v in &mut self.vertices {
      v.color.alpha = 0;
    }
  }

  pub fn is_hidden(&self) -> bool {
    self.vertices.iter().all(|v| v.color.alpha == 0)
  }
}

/// Inset applied to each side of an atlas rect, in atlas pixels.
pub fn uv_inset(tile_size: UVec2) -> Vec2 {
  Vec2::new(0.5 / tile_size.x.max(1) as f32, 0.5 / tile_size.y.max(1) as f32)
}

/// Atlas rect of `cell`, inset against bleeding from neighbouring cells.
pub fn atlas_rect(cell: UVec2, tile_size: UVec2) -> (Vec2, Vec2) {
  let size = tile_size.as_vec2();
  let inset = uv_inset(tile_size);
  let min = cell.as_vec2() * size;
  (min + inset, min + size - inset)
}

/// How a layer is composited.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
  #[default]
  Alpha,
  Add,
  Multiply,
  None,
}

/// Render properties of a tile layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TileLayerInfo {
  pub name: String,
  pub opacity: f32,
  pub visible: bool,
  pub z: i32,
  /// Scroll factor relative to the camera; 1.0 moves with the level.
  pub parallax: f32,
  pub blend_mode: BlendMode,
}

impl TileLayerInfo {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      opacity: 1.0,
      visible: true,
      z: 0,
      parallax: 1.0,
      blend_mode: BlendMode::Alpha,
    }
  }

  pub fn with_opacity(mut self, opacity: f32) -> Self {
    self.opacity = opacity;
    self
  }

  pub fn with_parallax(mut self, parallax: f32) -> Self {
    self.parallax = parallax;
    self
  }

  pub fn with_visible(mut self, visible: bool) -> Self {
    self.visible = visible;
    self
  }

  pub fn with_z(mut self, z: i32) -> Self {
    self.z = z;
    self
  }

  pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
    self.blend_mode = blend_mode;
    self
  }
}

/// Static quads of one block.
#[derive(Debug, Clone, Default)]
pub struct StaticBlock {
  quads: Vec<TileQuad>,
}

impl StaticBlock {
  pub fn quads(&self) -> &[TileQuad] {
    &self.quads
  }

  fn find_mut(&mut self, tile: TilePos) -> Option<&mut TileQuad> {
    self.quads.iter_mut().find(|q| q.tile == tile)
  }
}

/// Renderable tile layer.
#[derive(Debug, Clone)]
pub struct SpatialTileMap {
  info: TileLayerInfo,
  tile_size: UVec2,
  atlas: TilesetImage,
  normal_map: Option<TilesetImage>,
  blocks: HashMap<BlockPos, StaticBlock>,
  animated: BTreeMap<TilePos, AnimatedTile>,
  animated_batch: Vec<TileQuad>,
  draw_range: BlockRange,
  update_range: BlockRange,
}

impl SpatialTileMap {
  /// Builds the block index and animation registry for one layer.
  pub fn build(layer: &TileLayerInfo, grid: &TileGrid, tileset: &Tileset) -> Result<Self, TileMapError> {
    let Some(atlas) = tileset.image.clone() else {
      return Err(TileMapError::MissingAtlas {
        layer: layer.name.clone(),
        tileset: tileset.name.clone(),
      });
    };

    let normal_map = atlas.find_normal_map();
    if let Some(normals) = &normal_map {
      debug!("layer '{}': normal map {}", layer.name, normals.source.display());
    }

    let alpha = (layer.opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    let color = Rgba::new(255, 255, 255, alpha);
    let tile_size = tileset.tile_size;

    let mut map = Self {
      info: layer.clone(),
      tile_size,
      atlas,
      normal_map,
      blocks: HashMap::new(),
      animated: BTreeMap::new(),
      animated_batch: Vec::new(),
      draw_range: BlockRange::default(),
      update_range: BlockRange::default(),
    };

    let mut skipped = 0usize;
    for (x, y, gid) in grid.cells() {
      let Some(local_id) = tileset.local_id(gid) else {
        skipped += 1;
        continue;
      };
      let tile = grid.tile_pos(x, y);
      let (uv_min, uv_max) = atlas_rect(tileset.atlas_cell(local_id), tile_size);
      let quad = TileQuad::new(tile, tile_size, uv_min, uv_max, color);

      match tileset.meta(local_id) {
        Some(meta) if meta.is_animated() => {
          let frames = meta
            .animation
            .iter()
            .map(|f| FrameCell {
              cell: tileset.atlas_cell(f.tile_id),
              duration_ms: f.duration_ms,
            })
            .collect();
          map.animated.insert(tile, AnimatedTile::new(quad, frames));
        }
        _ => {
          let block = tile.parallax_block(layer.parallax);
          map.blocks.entry(block).or_default().quads.push(quad);
        }
      }
    }

    if skipped > 0 {
      warn!(
        "layer '{}': {} tiles do not belong to tileset '{}'",
        layer.name, skipped, tileset.name
      );
    }

    debug!(
      "layer '{}': {} blocks, {} animated tiles",
      layer.name,
      map.blocks.len(),
      map.animated.len()
    );

    Ok(map)
  }

  pub fn with_ranges(mut self, draw: BlockRange, update: BlockRange) -> Self {
    self.draw_range = draw;
    self.update_range = update;
    self
  }

  pub fn name(&self) -> &str {
    &self.info.name
  }

  pub fn info(&self) -> &TileLayerInfo {
    &self.info
  }

  pub fn visible(&self) -> bool {
    self.info.visible
  }

  pub fn set_visible(&mut self, visible: bool) {
    self.info.visible = visible;
  }

  pub fn z(&self) -> i32 {
    self.info.z
  }

  pub fn tile_size(&self) -> UVec2 {
    self.tile_size
  }

  pub fn atlas(&self) -> &TilesetImage {
    &self.atlas
  }

  pub fn normal_map(&self) -> Option<&TilesetImage> {
    self.normal_map.as_ref()
  }

  pub fn block_count(&self) -> usize {
    self.blocks.len()
  }

  pub fn animated_count(&self) -> usize {
    self.animated.len()
  }

  pub fn block(&self, pos: BlockPos) -> Option<&StaticBlock> {
    self.blocks.get(&pos)
  }

  pub fn animated_tile(&self, tile: TilePos) -> Option<&AnimatedTile> {
    self.animated.get(&tile)
  }

  /// Animated quads selected by the last [`update`](Self::update).
  pub fn animated_batch(&self) -> &[TileQuad] {
    &self.animated_batch
  }

  /// Block of a player standing at `pixel_pos`, in this map's tile size.
  pub fn player_block(&self, pixel_pos: Vec2) -> BlockPos {
    BlockPos::from_pixels(pixel_pos, self.tile_size)
  }

  /// Advances animated tiles near the player and rebuilds the animated batch.
  pub fn update(&mut self, dt: Duration, player_block: BlockPos) {
    let dt_ms = dt.as_secs_f32() * 1000.0;
    let tile_size = self.tile_size;
    let range = self.update_range;

    self.animated_batch.clear();
    for tile in self.animated.values_mut() {
      if tile.hidden() || !range.contains(player_block, tile.position().block()) {
        continue;
      }
      tile.advance(dt_ms, tile_size);
      self.animated_batch.push(*tile.quad());
    }
  }

  /// Submits blocks near the player, then the animated batch. Layers with a
  /// normal map repeat the batches into the normal pass.
  pub fn draw(&self, target: &mut dyn RenderTarget, player_block: BlockPos) {
    if !self.info.visible {
      return;
    }
    self.submit(target, player_block, StencilMode::Disabled, None);
    self.submit_normals(target, player_block, StencilMode::Disabled);
  }

  /// Draws the color pass regardless of visibility with explicit stencil
  /// state.
  pub(crate) fn submit(
    &self,
    target: &mut dyn RenderTarget,
    player_block: BlockPos,
    stencil: StencilMode,
    alpha_threshold: Option<f32>,
  ) {
    let states = RenderStates {
      texture: &self.atlas,
      blend_mode: self.info.blend_mode,
      stencil,
      alpha_threshold,
      z: self.info.z,
      pass: RenderPass::Color,
    };
    self.submit_batches(target, player_block, &states);
  }

  /// Draws the normal pass, if the layer has a normal map.
  pub(crate) fn submit_normals(&self, target: &mut dyn RenderTarget, player_block: BlockPos, stencil: StencilMode) {
    let Some(normals) = &self.normal_map else {
      return;
    };
    let states = RenderStates {
      texture: normals,
      blend_mode: self.info.blend_mode,
      stencil,
      alpha_threshold: None,
      z: self.info.z,
      pass: RenderPass::Normal,
    };
    self.submit_batches(target, player_block, &states);
  }

  fn submit_batches(&self, target: &mut dyn RenderTarget, player_block: BlockPos, states: &RenderStates<'_>) {
    for pos in self.draw_range.blocks_around(player_block) {
      if let Some(block) = self.blocks.get(&pos) {
        target.draw_quads(&block.quads, states);
      }
    }

    if !self.animated_batch.is_empty() {
      target.draw_quads(&self.animated_batch, states);
    }
  }

  /// Makes the tile at level tile position `(x, y)` fully transparent.
  ///
  /// Returns false if no tile exists there. Hiding twice is a no-op.
  pub fn hide_tile(&mut self, x: i32, y: i32) -> bool {
    let tile = TilePos::new(x, y);

    if let Some(animated) = self.animated.get_mut(&tile) {
      animated.hide();
      if let Some(q) = self.animated_batch.iter_mut().find(|q| q.tile == tile) {
        q.hide();
      }
      return true;
    }

    let block = tile.parallax_block(self.info.parallax);
    match self.blocks.get_mut(&block).and_then(|b| b.find_mut(tile)) {
      Some(quad) => {
        quad.hide();
        true
      }
      None => false,
    }
  }
}

/// Error building or composing tile maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileMapError {
  /// The tileset has no atlas image to draw from.
  MissingAtlas { layer: String, tileset: String },
  /// A layer is configured as its own stencil mask.
  SelfReference { layer: String },
  /// The configured stencil mask layer does not exist.
  MissingMask { layer: String, mask: String },
}

impl std::fmt::Display for TileMapError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::MissingAtlas { layer, tileset } => {
        write!(f, "layer '{}': tileset '{}' has no atlas image", layer, tileset)
      }
      Self::SelfReference { layer } => {
        write!(f, "layer '{}' uses itself as stencil mask", layer)
      }
      Self::MissingMask { layer, mask } => {
        write!(f, "layer '{}': stencil mask layer '{}' not found", layer, mask)
      }
    }
  }
}

impl std::error::Error for TileMapError {}
