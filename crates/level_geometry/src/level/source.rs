//! Level source description.
//!
//! The pipeline does not parse TMX. Levels arrive as an already deserialized
//! description that mirrors the fields the pipeline needs; this module reads
//! that description from TOML.
//!
//! ```toml
//! name = "intro"
//!
//! [[tilesets]]
//! name = "terrain"
//! first_gid = 1
//! tile_size = [24, 24]
//! columns = 8
//! tile_count = 64
//! image = "terrain.png"
//! image_size = [192, 192]
//!
//! [[tilesets.tiles]]
//! id = 9
//! animation = [{ tile_id = 9, duration_ms = 120 }, { tile_id = 10, duration_ms = 120 }]
//!
//! [[layers]]
//! name = "level"
//! width = 3
//! height = 1
//! data = "1,1,1"
//! ```

use std::path::{Path, PathBuf};

use bevy::math::{IVec2, UVec2, Vec2};
use serde::Deserialize;

use crate::grid::{Chunk, GridError, LayerData, TileGrid};
use crate::tilemap::{BlendMode, TileLayerInfo};
use crate::tileset::{AnimationFrame, CollisionShape, TileMeta, Tileset};

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LevelSource {
  pub name: String,
  pub tilesets: Vec<TilesetSource>,
  pub layers: Vec<LayerSource>,
}

impl LevelSource {
  pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(text)
  }

  /// Tilesets with image paths resolved against `base_dir`.
  pub fn tilesets(&self, base_dir: &Path) -> Vec<Tileset> {
    self.tilesets.iter().map(|t| t.to_tileset(base_dir)).collect()
  }

  pub fn layer(&self, name: &str) -> Option<&LayerSource> {
    self.layers.iter().find(|l| l.name == name)
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TilesetSource {
  pub name: String,
  pub first_gid: i32,
  pub tile_size: [u32; 2],
  pub columns: u32,
  #[serde(default)]
  pub tile_count: u32,
  #[serde(default)]
  pub image: Option<PathBuf>,
  #[serde(default)]
  pub image_size: [u32; 2],
  #[serde(default)]
  pub tiles: Vec<TileSource>,
}

impl TilesetSource {
  pub fn to_tileset(&self, base_dir: &Path) -> Tileset {
    let tile_size = UVec2::from_array(self.tile_size);
    let mut tileset = Tileset::new(&self.name, self.first_gid, tile_size, self.columns, self.tile_count);
    if let Some(image) = &self.image {
      tileset = tileset.with_image(base_dir.join(image), UVec2::from_array(self.image_size));
    }
    for tile in &self.tiles {
      tileset = tileset.with_tile(tile.id, tile.to_meta());
    }
    tileset
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TileSource {
  /// Local tile id.
  pub id: u32,
  #[serde(default)]
  pub animation: Vec<FrameSource>,
  /// Collision objects of the tile.
  #[serde(default)]
  pub objects: Vec<ObjectSource>,
}

impl TileSource {
  fn to_meta(&self) -> TileMeta {
    TileMeta {
      animation: self
        .animation
        .iter()
        .map(|f| AnimationFrame {
          tile_id: f.tile_id,
          duration_ms: f.duration_ms,
        })
        .collect(),
      shapes: self.objects.iter().map(ObjectSource::to_shape).collect(),
    }
  }
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct FrameSource {
  pub tile_id: u32,
  pub duration_ms: u32,
}

/// Collision object. Polygon and polyline points are relative to `x, y`;
/// without either, the object is the rectangle `x, y, width, height`.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ObjectSource {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
  pub polygon: Option<Vec<[f32; 2]>>,
  pub polyline: Option<Vec<[f32; 2]>>,
}

impl ObjectSource {
  pub fn to_shape(&self) -> CollisionShape {
    let origin = Vec2::new(self.x, self.y);
    let offset = |points: &[[f32; 2]]| -> Vec<Vec2> {
      points.iter().map(|p| origin + Vec2::from_array(*p)).collect()
    };
    match (&self.polygon, &self.polyline) {
      (Some(points), _) => CollisionShape::Polygon(offset(points)),
      (None, Some(points)) => CollisionShape::Polyline(offset(points)),
      (None, None) => CollisionShape::Rect {
        origin,
        size: Vec2::new(self.width, self.height),
      },
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct LayerSource {
  pub name: String,
  #[serde(default)]
  pub width: u32,
  #[serde(default)]
  pub height: u32,
  /// Inline CSV tile data.
  #[serde(default)]
  pub data: Option<String>,
  #[serde(default)]
  pub chunks: Vec<ChunkSource>,
  /// Extra placement offset in tiles.
  #[serde(default)]
  pub offset: [i32; 2],
  #[serde(default = "default_opacity")]
  pub opacity: f32,
  #[serde(default = "default_visible")]
  pub visible: bool,
  #[serde(default)]
  pub z: i32,
  #[serde(default)]
  pub properties: LayerProperties,
}

fn default_opacity() -> f32 {
  1.0
}

fn default_visible() -> bool {
  true
}

impl LayerSource {
  /// Parses the layer's tile data. Chunks take precedence over inline data.
  pub fn layer_data(&self) -> Result<LayerData, GridError> {
    if self.chunks.is_empty() {
      let data = self.data.as_deref().unwrap_or_default();
      return TileGrid::from_csv(self.width, self.height, data).map(LayerData::Inline);
    }
    let chunks = self
      .chunks
      .iter()
      .map(ChunkSource::to_chunk)
      .collect::<Result<Vec<_>, _>>()?;
    Ok(LayerData::Chunks(chunks))
  }

  /// Placement offset added on top of the grid's own offset.
  pub fn extra_offset(&self) -> IVec2 {
    IVec2::from_array(self.offset)
  }

  pub fn layer_info(&self) -> TileLayerInfo {
    TileLayerInfo::new(&self.name)
      .with_opacity(self.opacity)
      .with_visible(self.visible)
      .with_z(self.z)
      .with_parallax(self.properties.parallax)
      .with_blend_mode(self.properties.blend_mode)
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChunkSource {
  pub x: i32,
  pub y: i32,
  pub width: u32,
  pub height: u32,
  pub data: String,
}

impl ChunkSource {
  fn to_chunk(&self) -> Result<Chunk, GridError> {
    let grid = TileGrid::from_csv(self.width, self.height, &self.data)?;
    Ok(Chunk::new(
      IVec2::new(self.x, self.y),
      self.width,
      self.height,
      grid.data().to_vec(),
    ))
  }
}

/// Custom layer properties understood by the pipeline.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LayerProperties {
  pub parallax: f32,
  pub blend_mode: BlendMode,
  /// Name of the layer whose silhouette clips this one.
  pub stencil_reference: Option<String>,
  /// Mask texels below this alpha are discarded.
  pub alpha_threshold: f32,
  /// `solid`, `solid_onesided` or `deadly`.
  pub collision: Option<String>,
}

impl Default for LayerProperties {
  fn default() -> Self {
    Self {
      parallax: 1.0,
      blend_mode: BlendMode::Alpha,
      stencil_reference: None,
      alpha_threshold: 1.0,
      collision: None,
    }
  }
}
