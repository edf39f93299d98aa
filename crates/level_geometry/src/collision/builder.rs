use std::path::Path;

use bevy::log::{debug, info};
use bevy::math::Vec2;

use super::obj::{ObjError, ObjMesh};
use super::weld::WeldTable;
use super::{LoopWinding, ObjectType};
use crate::coords::pixels_to_physics;
use crate::grid::TileGrid;
use crate::tileset::Tileset;

/// Minimum distance, in physics units, between a loop's first and last
/// point.
pub const LOOP_CLOSURE_EPSILON: f32 = 1e-4;

/// Closed outline ready to become one chain fixture.
///
/// The closing edge from the last point back to the first is implicit.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsLoop {
  /// Points in physics units.
  pub points: Vec<Vec2>,
  pub object_type: ObjectType,
}

/// How OBJ faces are turned into loops.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
  pub pixels_per_meter: f32,
  pub winding: LoopWinding,
}

impl Default for ParseOptions {
  fn default() -> Self {
    Self {
      pixels_per_meter: 48.0,
      winding: LoopWinding::Authored,
    }
  }
}

/// Welds the collision shapes of every non-empty cell into one mesh.
///
/// Each shape becomes one face. Cells whose id belongs to another tileset
/// are skipped.
pub fn build_mesh(grid: &TileGrid, tileset: &Tileset, precision: f32) -> Result<ObjMesh, GeometryError> {
  let mut table = WeldTable::new(precision);
  let mut faces = Vec::new();
  let tile_size = tileset.tile_size;

  for (x, y, gid) in grid.cells() {
    let Some(local_id) = tileset.local_id(gid) else {
      continue;
    };
    let origin = grid.tile_pos(x, y).to_pixels(tile_size);

    for shape in tileset.collision_shapes(local_id) {
      let face: Vec<u32> = shape
        .points()
        .into_iter()
        .map(|p| table.weld(origin + p))
        .collect();
      if !face.is_empty() {
        faces.push(face);
      }
    }
  }

  if table.is_empty() {
    return Err(GeometryError::NoCollisionVertices);
  }

  debug!(
    "welded {} collision vertices into {} faces",
    table.len(),
    faces.len()
  );

  Ok(ObjMesh {
    vertices: table.into_vertices(),
    faces,
  })
}

/// Builds a layer's mesh and writes it to `path`.
pub fn dump_obj(grid: &TileGrid, tileset: &Tileset, path: &Path, precision: f32) -> Result<ObjMesh, GeometryError> {
  let mesh = build_mesh(grid, tileset, precision)?;
  mesh.write_file(path)?;
  info!(
    "wrote {} ({} vertices, {} faces)",
    path.display(),
    mesh.vertices.len(),
    mesh.faces.len()
  );
  Ok(mesh)
}

/// Reads an OBJ file and converts its faces to loops.
pub fn parse_obj(path: &Path, object_type: ObjectType, options: &ParseOptions) -> Result<Vec<PhysicsLoop>, GeometryError> {
  let mesh = ObjMesh::read_file(path)?;
  loops_from_mesh(&mesh, object_type, options)
}

/// Converts OBJ text to loops.
pub fn parse_obj_str(text: &str, object_type: ObjectType, options: &ParseOptions) -> Result<Vec<PhysicsLoop>, GeometryError> {
  let mesh = ObjMesh::parse(text)?;
  loops_from_mesh(&mesh, object_type, options)
}

/// Converts each face of `mesh` into one loop.
///
/// A face that repeats its first vertex id at the end has that explicit
/// closing vertex dropped. Loops with fewer than three points, or whose
/// first and last points coincide, are rejected.
pub fn loops_from_mesh(mesh: &ObjMesh, object_type: ObjectType, options: &ParseOptions) -> Result<Vec<PhysicsLoop>, GeometryError> {
  let mut loops = Vec::with_capacity(mesh.faces.len());

  for (face_index, face) in mesh.faces.iter().enumerate() {
    let mut ids = face.as_slice();
    if ids.len() > 1 && ids.first() == ids.last() {
      ids = &ids[..ids.len() - 1];
    }

    let mut points = Vec::with_capacity(ids.len());
    for &id in ids {
      let pixels = mesh.vertex(id).ok_or(GeometryError::Obj(ObjError::FaceIndex {
        face: face_index,
        index: id,
        vertex_count: mesh.vertices.len() as u32,
      }))?;
      let point = pixels_to_physics(pixels, options.pixels_per_meter);
      match options.winding {
        LoopWinding::Authored => points.push(point),
        LoopWinding::Reversed => points.insert(0, point),
      }
    }

    if points.len() < 3 {
      return Err(GeometryError::TooFewPoints {
        face: face_index,
        count: points.len(),
      });
    }

    let (first, last) = (points[0], points[points.len() - 1]);
    if first.distance(last) <= LOOP_CLOSURE_EPSILON {
      return Err(GeometryError::DegenerateClosingEdge {
        face: face_index,
        point: first,
      });
    }

    loops.push(PhysicsLoop {
      points,
      object_type,
    });
  }

  Ok(loops)
}

/// Error building or reading collision geometry.
#[derive(Debug)]
pub enum GeometryError {
  /// No tile in the layer produced collision vertices.
  NoCollisionVertices,
  TooFewPoints { face: usize, count: usize },
  /// A loop's first and last points coincide, giving a zero-length closing
  /// edge.
  DegenerateClosingEdge { face: usize, point: Vec2 },
  Obj(ObjError),
}

impl From<ObjError> for GeometryError {
  fn from(err: ObjError) -> Self {
    Self::Obj(err)
  }
}

impl std::fmt::Display for GeometryError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::NoCollisionVertices => write!(f, "layer has no tiles with collision data"),
      Self::TooFewPoints { face, count } => {
        write!(f, "face {} has {} points, a loop needs at least 3", face, count)
      }
      Self::DegenerateClosingEdge { face, point } => write!(
        f,
        "face {} starts and ends at ({}, {}), closing edge has zero length",
        face, point.x, point.y
      ),
      Self::Obj(e) => write!(f, "obj: {}", e),
    }
  }
}

impl std::error::Error for GeometryError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Obj(e) => Some(e),
      _ => None,
    }
  }
}
