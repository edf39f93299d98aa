use bevy::math::UVec2;

use super::{TileQuad, atlas_rect};
use crate::coords::TilePos;

/// Atlas cell shown for one animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCell {
  pub cell: UVec2,
  pub duration_ms: u32,
}

/// Tile whose quad cycles through atlas cells.
#[derive(Debug, Clone)]
pub struct AnimatedTile {
  quad: TileQuad,
  frames: Vec<FrameCell>,
  duration_ms: u32,
  elapsed_ms: f32,
  current: usize,
  hidden: bool,
}

impl AnimatedTile {
  pub fn new(quad: TileQuad, frames: Vec<FrameCell>) -> Self {
    let duration_ms = frames.iter().map(|f| f.duration_ms).sum();
    Self {
      quad,
      frames,
      duration_ms,
      elapsed_ms: 0.0,
      current: 0,
      hidden: false,
    }
  }

  pub fn position(&self) -> TilePos {
    self.quad.tile
  }

  pub fn quad(&self) -> &TileQuad {
    &self.quad
  }

  pub fn hidden(&self) -> bool {
    self.hidden
  }

  pub fn elapsed_ms(&self) -> f32 {
    self.elapsed_ms
  }

  pub fn duration_ms(&self) -> u32 {
    self.duration_ms
  }

  /// Index of the frame currently shown.
  pub fn current_frame(&self) -> usize {
    self.current
  }

  pub(crate) fn hide(&mut self) {
    self.hidden = true;
    self.quad.hide();
  }

  /// Advances the animation clock and updates the quad's UVs.
  ///
  /// Zero-length animations never advance.
  pub(crate) fn advance(&mut self, dt_ms: f32, tile_size: UVec2) {
    if self.duration_ms == 0 {
      return;
    }
    self.elapsed_ms = (self.elapsed_ms + dt_ms) % self.duration_ms as f32;

    self.current = self.frame_at(self.elapsed_ms);
    let (uv_min, uv_max) = atlas_rect(self.frames[self.current].cell, tile_size);
    self.quad.set_uv(uv_min, uv_max);
  }

  /// First frame whose cumulative end time exceeds `elapsed_ms`.
  fn frame_at(&self, elapsed_ms: f32) -> usize {
    let mut end = 0.0;
    for (i, frame) in self.frames.iter().enumerate() {
      end += frame.duration_ms as f32;
      if elapsed_ms < end {
        return i;
      }
    }
    self.frames.len().saturating_sub(1)
  }
}
