//! Conversion of quad batches into Bevy meshes.

use bevy::asset::RenderAssetUsages;
use bevy::color::ColorToComponents;
use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::prelude::*;

use super::render::{RenderPass, RenderStates, RenderTarget, StencilMode};
use super::{BlendMode, TileQuad};

/// Builds a triangle-list mesh from quads.
///
/// UVs are normalized against `atlas_size`. Vertex colors are converted to
/// linear RGBA.
pub fn quads_to_mesh(quads: &[TileQuad], atlas_size: UVec2, z: f32) -> Mesh {
  let atlas = atlas_size.max(UVec2::ONE).as_vec2();
  let mut positions = Vec::with_capacity(quads.len() * 4);
  let mut uvs = Vec::with_capacity(quads.len() * 4);
  let mut colors = Vec::with_capacity(quads.len() * 4);
  let mut indices = Vec::with_capacity(quads.len() * 6);

  for (i, quad) in quads.iter().enumerate() {
    let base = (i * 4) as u32;
    for v in &quad.vertices {
      positions.push([v.position.x, v.position.y, z]);
      let uv = v.uv / atlas;
      uvs.push([uv.x, uv.y]);
      let c = v.color;
      colors.push(
        Color::srgba_u8(c.red, c.green, c.blue, c.alpha)
          .to_linear()
          .to_f32_array(),
      );
    }
    indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
  }

  Mesh::new(
    PrimitiveTopology::TriangleList,
    RenderAssetUsages::MAIN_WORLD | RenderAssetUsages::RENDER_WORLD,
  )
  .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
  .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, uvs)
  .with_inserted_attribute(Mesh::ATTRIBUTE_COLOR, colors)
  .with_inserted_indices(Indices::U32(indices))
}

/// Mesh produced by one draw call, with the state it was drawn with.
#[derive(Debug)]
pub struct MeshBatch {
  pub mesh: Mesh,
  pub texture: std::path::PathBuf,
  pub blend_mode: BlendMode,
  pub stencil: StencilMode,
  pub alpha_threshold: Option<f32>,
  pub z: i32,
  pub pass: RenderPass,
}

/// [`RenderTarget`] that turns every draw call into a [`MeshBatch`].
///
/// Stencil state is tracked per batch; renderers that support stencil
/// compositing apply it when spawning the meshes.
#[derive(Debug, Default)]
pub struct MeshTarget {
  pub batches: Vec<MeshBatch>,
  stencil_cleared: bool,
}

impl MeshTarget {
  pub fn new() -> Self {
    Self::default()
  }

  /// Whether a stencil clear was requested since the last [`take`](Self::take).
  pub fn stencil_cleared(&self) -> bool {
    self.stencil_cleared
  }

  pub fn take(&mut self) -> Vec<MeshBatch> {
    self.stencil_cleared = false;
    std::mem::take(&mut self.batches)
  }
}

impl RenderTarget for MeshTarget {
  fn clear_stencil(&mut self, _value: u8) {
    self.stencil_cleared = true;
  }

  fn draw_quads(&mut self, quads: &[TileQuad], states: &RenderStates<'_>) {
    self.batches.push(MeshBatch {
      mesh: quads_to_mesh(quads, states.texture.size, states.z as f32),
      texture: states.texture.source.clone(),
      blend_mode: states.blend_mode,
      stencil: states.stencil,
      alpha_threshold: states.alpha_threshold,
      z: states.z,
      pass: states.pass,
    });
  }

  fn disable_stencil(&mut self) {}
}
