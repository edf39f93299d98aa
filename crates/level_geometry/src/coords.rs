//! Coordinate types and spatial constants.
//!
//! Defines the coordinate systems used by the level pipeline:
//! - [`TilePos`]: Tile position in the level's global tile space (i32)
//! - [`BlockPos`]: Position of a [`BLOCK_SIZE`]-tile culling block (i32)
//! - Level pixels: `tile * tile_size + local_px`, stored as `Vec2`
//! - Physics units: `level_px / pixels_per_meter`

use bevy::math::{IVec2, UVec2, Vec2};

/// Number of tiles along each edge of a culling block.
pub const BLOCK_SIZE: i32 = 16;

/// Position in the level's global tile space.
///
/// Already includes the owning layer's placement offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TilePos {
  pub x: i32,
  pub y: i32,
}

impl TilePos {
  /// Creates a new tile position.
  pub const fn new(x: i32, y: i32) -> Self {
    Self { x, y }
  }

  /// Returns the block containing this tile.
  ///
  /// Uses floor division so tiles at negative coordinates land in negative
  /// blocks instead of piling into block 0.
  pub fn block(self) -> BlockPos {
    BlockPos::new(self.x.div_euclid(BLOCK_SIZE), self.y.div_euclid(BLOCK_SIZE))
  }

  /// Returns the block this tile is stored in when its layer scrolls with
  /// the given parallax factor.
  pub fn parallax_block(self, parallax: f32) -> BlockPos {
    if (parallax - 1.0).abs() < f32::EPSILON || parallax <= 0.0 {
      return self.block();
    }
    let scaled_x = (self.x as f32 / parallax).floor() as i32;
    let scaled_y = (self.y as f32 / parallax).floor() as i32;
    BlockPos::new(
      scaled_x.div_euclid(BLOCK_SIZE),
      scaled_y.div_euclid(BLOCK_SIZE),
    )
  }

  /// Top-left corner of this tile in level pixels.
  pub fn to_pixels(self, tile_size: UVec2) -> Vec2 {
    Vec2::new(
      (self.x as i64 * tile_size.x as i64) as f32,
      (self.y as i64 * tile_size.y as i64) as f32,
    )
  }

  /// Tile containing the given level pixel position.
  pub fn from_pixels(pixels: Vec2, tile_size: UVec2) -> Self {
    Self::new(
      (pixels.x / tile_size.x.max(1) as f32).floor() as i32,
      (pixels.y / tile_size.y.max(1) as f32).floor() as i32,
    )
  }
}

impl From<IVec2> for TilePos {
  fn from(v: IVec2) -> Self {
    Self::new(v.x, v.y)
  }
}

impl From<TilePos> for IVec2 {
  fn from(t: TilePos) -> Self {
    IVec2::new(t.x, t.y)
  }
}

/// Position of a culling block.
///
/// Each block spans [`BLOCK_SIZE`] tiles in each dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
  pub x: i32,
  pub y: i32,
}

impl BlockPos {
  /// Creates a new block position.
  pub const fn new(x: i32, y: i32) -> Self {
    Self { x, y }
  }

  /// Block containing the given level pixel position.
  pub fn from_pixels(pixels: Vec2, tile_size: UVec2) -> Self {
    TilePos::from_pixels(pixels, tile_size).block()
  }
}

/// Converts level pixels to physics units.
#[inline]
pub fn pixels_to_physics(pixels: Vec2, pixels_per_meter: f32) -> Vec2 {
  pixels / pixels_per_meter
}

/// Converts physics units to level pixels.
#[inline]
pub fn physics_to_pixels(meters: Vec2, pixels_per_meter: f32) -> Vec2 {
  meters * pixels_per_meter
}
