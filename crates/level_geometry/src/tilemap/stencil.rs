//! Stencil compositing of two tile maps.
//!
//! The mask map writes 1 into the stencil plane wherever it has texels; the
//! content map is then drawn only where the plane is 1.

use super::render::{RenderTarget, StencilMode};
use super::{SpatialTileMap, TileMapError};
use crate::coords::BlockPos;

const STENCIL_REFERENCE: u8 = 1;

/// Alpha thresholds at or above this need no discard shader.
const SHADER_THRESHOLD_LIMIT: f32 = 0.99;

/// Content map clipped to another layer's tiles.
///
/// The mask is referenced by layer name and passed in at draw time, so
/// changes to the mask layer (hidden tiles, animation) show up in the
/// stencil.
#[derive(Debug, Clone)]
pub struct StencilMask {
  mask: String,
  content: SpatialTileMap,
  alpha_threshold: f32,
}

impl StencilMask {
  /// Pairs a mask and a content map. Fails if both are the same layer.
  pub fn new(mask: &SpatialTileMap, content: SpatialTileMap, alpha_threshold: f32) -> Result<Self, TileMapError> {
    if mask.name() == content.name() {
      return Err(TileMapError::SelfReference {
        layer: content.name().to_string(),
      });
    }
    Ok(Self {
      mask: mask.name().to_string(),
      content,
      alpha_threshold,
    })
  }

  /// Name of the mask layer.
  pub fn mask_name(&self) -> &str {
    &self.mask
  }

  pub fn content(&self) -> &SpatialTileMap {
    &self.content
  }

  pub fn content_mut(&mut self) -> &mut SpatialTileMap {
    &mut self.content
  }

  pub fn alpha_threshold(&self) -> f32 {
    self.alpha_threshold
  }

  /// Whether the mask pass needs the alpha discard shader.
  pub fn uses_discard_shader(&self) -> bool {
    self.alpha_threshold < SHADER_THRESHOLD_LIMIT
  }

  /// Animates the content map. The mask layer animates on its own.
  pub fn update(&mut self, dt: std::time::Duration, player_block: BlockPos) {
    self.content.update(dt, player_block);
  }

  /// Draws the content clipped to `mask`.
  ///
  /// The mask is drawn even when its own layer is hidden. Always ends with
  /// stencil testing disabled.
  pub fn draw(&self, mask: &SpatialTileMap, target: &mut dyn RenderTarget, player_block: BlockPos) {
    debug_assert_eq!(mask.name(), self.mask);
    target.clear_stencil(0);

    let threshold = self.uses_discard_shader().then_some(self.alpha_threshold);
    mask.submit(
      target,
      player_block,
      StencilMode::Write {
        reference: STENCIL_REFERENCE,
      },
      threshold,
    );
    if self.content.visible() {
      let test = StencilMode::TestEqual {
        reference: STENCIL_REFERENCE,
      };
      self.content.submit(target, player_block, test, None);
      self.content.submit_normals(target, player_block, test);
    }

    target.disable_stencil();
  }
}
