//! Tileset metadata.
//!
//! A tileset maps local tile ids to atlas cells and optional per-tile
//! metadata (animation frames and collision shapes). Global ids in a grid are
//! resolved against the tileset whose `first_gid` is the largest one not
//! exceeding the id.

use std::collections::HashMap;
use std::path::PathBuf;

use bevy::math::{UVec2, Vec2};

/// Atlas image backing a tileset.
#[derive(Clone, Debug, PartialEq)]
pub struct TilesetImage {
  pub source: PathBuf,
  /// Atlas size in pixels.
  pub size: UVec2,
}

impl TilesetImage {
  /// Companion normal map path, `<stem>_normals.<ext>` next to the atlas.
  pub fn normal_map_path(&self) -> Option<PathBuf> {
    let stem = self.source.file_stem()?.to_string_lossy();
    let name = match self.source.extension() {
      Some(ext) => format!("{}_normals.{}", stem, ext.to_string_lossy()),
      None => format!("{}_normals", stem),
    };
    Some(self.source.with_file_name(name))
  }

  /// The companion normal map, if it exists on disk. It shares the atlas
  /// layout and size.
  pub fn find_normal_map(&self) -> Option<TilesetImage> {
    let source = self.normal_map_path().filter(|p| p.exists())?;
    Some(TilesetImage {
      source,
      size: self.size,
    })
  }
}

/// One frame of a tile animation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnimationFrame {
  /// Local tile id shown during this frame.
  pub tile_id: u32,
  pub duration_ms: u32,
}

/// Authored collision geometry of a tile, in tile-local pixels.
#[derive(Clone, Debug, PartialEq)]
pub enum CollisionShape {
  Polygon(Vec<Vec2>),
  Polyline(Vec<Vec2>),
  /// Rectangle object without polygon data.
  Rect { origin: Vec2, size: Vec2 },
}

impl CollisionShape {
  /// Box covering the whole tile.
  pub fn implicit_box(tile_size: UVec2) -> Self {
    Self::Rect {
      origin: Vec2::ZERO,
      size: tile_size.as_vec2(),
    }
  }

  /// Outline points in authored order.
  ///
  /// Rectangles expand to `(x, y), (x, y + h), (x + w, y + h), (x + w, y)`.
  pub fn points(&self) -> Vec<Vec2> {
    match self {
      Self::Polygon(points) | Self::Polyline(points) => points.clone(),
      Self::Rect { origin, size } => vec![
        *origin,
        Vec2::new(origin.x, origin.y + size.y),
        *origin + *size,
        Vec2::new(origin.x + size.x, origin.y),
      ],
    }
  }
}

/// Per-tile metadata.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TileMeta {
  pub animation: Vec<AnimationFrame>,
  pub shapes: Vec<CollisionShape>,
}

impl TileMeta {
  pub fn is_animated(&self) -> bool {
    !self.animation.is_empty()
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tileset {
  pub name: String,
  pub first_gid: i32,
  /// Tile size in pixels.
  pub tile_size: UVec2,
  pub columns: u32,
  pub tile_count: u32,
  pub image: Option<TilesetImage>,
  /// Sparse metadata keyed by local tile id.
  pub tiles: HashMap<u32, TileMeta>,
}

impl Tileset {
  pub fn new(name: impl Into<String>, first_gid: i32, tile_size: UVec2, columns: u32, tile_count: u32) -> Self {
    Self {
      name: name.into(),
      first_gid,
      tile_size,
      columns: columns.max(1),
      tile_count,
      image: None,
      tiles: HashMap::new(),
    }
  }

  pub fn with_image(mut self, source: impl Into<PathBuf>, size: UVec2) -> Self {
    self.image = Some(TilesetImage {
      source: source.into(),
      size,
    });
    self
  }

  pub fn with_tile(mut self, local_id: u32, meta: TileMeta) -> Self {
    self.tiles.insert(local_id, meta);
    self
  }

  /// Local id of a global id, or `None` if the id belongs to another tileset.
  pub fn local_id(&self, gid: i32) -> Option<u32> {
    let local = gid.checked_sub(self.first_gid)?;
    if local < 0 || (self.tile_count > 0 && local as u32 >= self.tile_count) {
      return None;
    }
    Some(local as u32)
  }

  pub fn meta(&self, local_id: u32) -> Option<&TileMeta> {
    self.tiles.get(&local_id)
  }

  /// Atlas cell `(column, row)` of a local id.
  pub fn atlas_cell(&self, local_id: u32) -> UVec2 {
    UVec2::new(local_id % self.columns, local_id / self.columns)
  }

  /// Collision shapes of a tile, falling back to the implicit tile box.
  pub fn collision_shapes(&self, local_id: u32) -> Vec<CollisionShape> {
    match self.meta(local_id) {
      Some(meta) if !meta.shapes.is_empty() => meta.shapes.clone(),
      _ => vec![CollisionShape::implicit_box(self.tile_size)],
    }
  }
}

/// Picks the tileset a global id belongs to.
pub fn resolve_tileset(tilesets: &[Tileset], gid: i32) -> Option<&Tileset> {
  tilesets
    .iter()
    .filter(|t| t.first_gid <= gid)
    .max_by_key(|t| t.first_gid)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tileset(first_gid: i32) -> Tileset {
    Tileset::new(format!("ts{first_gid}"), first_gid, UVec2::splat(24), 8, 64)
  }

  #[test]
  fn normal_map_sits_next_to_the_atlas() {
    let image = TilesetImage {
      source: PathBuf::from("levels/intro/terrain.png"),
      size: UVec2::splat(96),
    };
    assert_eq!(
      image.normal_map_path(),
      Some(PathBuf::from("levels/intro/terrain_normals.png"))
    );
    assert_eq!(image.find_normal_map(), None);
  }

  #[test]
  fn resolves_by_largest_first_gid() {
    let sets = vec![tileset(1), tileset(65), tileset(129)];
    assert_eq!(resolve_tileset(&sets, 1).map(|t| t.first_gid), Some(1));
    assert_eq!(resolve_tileset(&sets, 64).map(|t| t.first_gid), Some(1));
    assert_eq!(resolve_tileset(&sets, 65).map(|t| t.first_gid), Some(65));
    assert_eq!(resolve_tileset(&sets, 500).map(|t| t.first_gid), Some(129));
    assert!(resolve_tileset(&sets, 0).is_none());
  }

  #[test]
  fn local_ids_and_atlas_cells() {
    let ts = tileset(65);
    assert_eq!(ts.local_id(65), Some(0));
    assert_eq!(ts.local_id(64), None);
    assert_eq!(ts.local_id(65 + 64), None);
    assert_eq!(ts.atlas_cell(10), UVec2::new(2, 1));
  }

  #[test]
  fn implicit_box_corner_order() {
    let points = CollisionShape::implicit_box(UVec2::new(24, 16)).points();
    assert_eq!(
      points,
      vec![
        Vec2::new(0.0, 0.0),
        Vec2::new(0.0, 16.0),
        Vec2::new(24.0, 16.0),
        Vec2::new(24.0, 0.0)
      ]
    );
  }

  #[test]
  fn authored_shapes_replace_implicit_box() {
    let triangle = CollisionShape::Polygon(vec![Vec2::ZERO, Vec2::new(24.0, 24.0), Vec2::new(0.0, 24.0)]);
    let ts = tileset(1).with_tile(
      3,
      TileMeta {
        shapes: vec![triangle.clone()],
        ..Default::default()
      },
    );
    assert_eq!(ts.collision_shapes(3), vec![triangle]);
    assert_eq!(ts.collision_shapes(4), vec![CollisionShape::implicit_box(UVec2::splat(24))]);
  }
}
