//! Render target abstraction.
//!
//! Tile maps submit batches of quads with a bound atlas, blend mode and
//! stencil state. The GPU backend is an external collaborator; this crate
//! ships a recording target for tests and a Bevy mesh target
//! ([`MeshTarget`](super::mesh::MeshTarget)).

use super::{BlendMode, TileQuad};
use crate::tileset::TilesetImage;

/// Hardware stencil configuration for a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StencilMode {
  #[default]
  Disabled,
  /// Always pass; replace the stencil value with `reference`.
  Write { reference: u8 },
  /// Pass only where the stencil value equals `reference`; keep it.
  TestEqual { reference: u8 },
}

/// Buffer a batch is drawn into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderPass {
  #[default]
  Color,
  /// Lighting normals, drawn with the atlas's `_normals` companion texture.
  Normal,
}

/// State bound for one batch.
#[derive(Debug, Clone, Copy)]
pub struct RenderStates<'a> {
  pub texture: &'a TilesetImage,
  pub blend_mode: BlendMode,
  pub stencil: StencilMode,
  /// Discard texels with alpha below this value.
  pub alpha_threshold: Option<f32>,
  pub z: i32,
  pub pass: RenderPass,
}

pub trait RenderTarget {
  fn clear_stencil(&mut self, value: u8);

  fn draw_quads(&mut self, quads: &[TileQuad], states: &RenderStates<'_>);

  /// Turns stencil testing off for subsequent draws.
  fn disable_stencil(&mut self);
}

/// One recorded call on a [`RecordingTarget`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
  ClearStencil(u8),
  Draw {
    quads: usize,
    /// Quads in the batch that are fully transparent.
    hidden: usize,
    texture: std::path::PathBuf,
    blend_mode: BlendMode,
    stencil: StencilMode,
    alpha_threshold: Option<f32>,
    pass: RenderPass,
  },
  DisableStencil,
}

/// Target that records calls instead of drawing.
#[derive(Debug, Default)]
pub struct RecordingTarget {
  pub calls: Vec<RenderCall>,
}

impl RecordingTarget {
  pub fn new() -> Self {
    Self::default()
  }

  /// Total quads submitted across all draw calls.
  pub fn quad_count(&self) -> usize {
    self
      .calls
      .iter()
      .map(|c| match c {
        RenderCall::Draw { quads, .. } => *quads,
        _ => 0,
      })
      .sum()
  }

  pub fn draw_count(&self) -> usize {
    self
      .calls
      .iter()
      .filter(|c| matches!(c, RenderCall::Draw { .. }))
      .count()
  }

  /// Draw calls into the given pass.
  pub fn pass_count(&self, pass: RenderPass) -> usize {
    self
      .calls
      .iter()
      .filter(|c| matches!(c, RenderCall::Draw { pass: p, .. } if *p == pass))
      .count()
  }
}

impl RenderTarget for RecordingTarget {
  fn clear_stencil(&mut self, value: u8) {
    self.calls.push(RenderCall::ClearStencil(value));
  }

  fn draw_quads(&mut self, quads: &[TileQuad], states: &RenderStates<'_>) {
    self.calls.push(RenderCall::Draw {
      quads: quads.len(),
      hidden: quads.iter().filter(|q| q.is_hidden()).count(),
      texture: states.texture.source.clone(),
      blend_mode: states.blend_mode,
      stencil: states.stencil,
      alpha_threshold: states.alpha_threshold,
      pass: states.pass,
    });
  }

  fn disable_stencil(&mut self) {
    self.calls.push(RenderCall::DisableStencil);
  }
}
