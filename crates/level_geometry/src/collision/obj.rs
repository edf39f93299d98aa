//! Minimal Wavefront OBJ reader and writer.
//!
//! Only `v` and `f` records are meaningful; everything else is skipped on
//! read. Vertices are 2D, written with a zero `z`.

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use bevy::math::Vec2;

/// Vertex pool and faces of one mesh. Face entries are 1-based vertex ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjMesh {
  pub vertices: Vec<Vec2>,
  pub faces: Vec<Vec<u32>>,
}

impl ObjMesh {
  pub fn is_empty(&self) -> bool {
    self.vertices.is_empty()
  }

  /// Vertex of a 1-based id.
  pub fn vertex(&self, id: u32) -> Option<Vec2> {
    let index = (id as usize).checked_sub(1)?;
    self.vertices.get(index).copied()
  }

  /// Serializes as OBJ text: all `v` lines, a blank line, then `f` lines.
  pub fn to_obj_string(&self) -> String {
    let mut out = String::with_capacity(self.vertices.len() * 24 + self.faces.len() * 16);
    for v in &self.vertices {
      let _ = writeln!(out, "v {:.3} {:.3} 0.000", v.x, v.y);
    }
    out.push('\n');
    for face in &self.faces {
      out.push('f');
      for id in face {
        let _ = write!(out, " {}", id);
      }
      out.push('\n');
    }
    out
  }

  pub fn write_file(&self, path: &Path) -> Result<(), ObjError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent).map_err(|e| ObjError::io(path, e))?;
    }
    std::fs::write(path, self.to_obj_string()).map_err(|e| ObjError::io(path, e))
  }

  pub fn read_file(path: &Path) -> Result<Self, ObjError> {
    let text = std::fs::read_to_string(path).map_err(|e| ObjError::io(path, e))?;
    Self::parse(&text)
  }

  /// Parses OBJ text.
  ///
  /// Face entries may use the `v/vt/vn` form; only the vertex id is kept.
  /// Every face id must reference a vertex declared anywhere in the file.
  pub fn parse(text: &str) -> Result<Self, ObjError> {
    let mut mesh = ObjMesh::default();

    for (line_no, raw) in text.lines().enumerate() {
      let line_no = line_no + 1;
      let line = raw.split('#').next().unwrap_or_default().trim();
      let mut tokens = line.split_whitespace();
      match tokens.next() {
        Some("v") => {
          let x = parse_coord(tokens.next(), line_no)?;
          let y = parse_coord(tokens.next(), line_no)?;
          mesh.vertices.push(Vec2::new(x, y));
        }
        Some("f") => {
          let face = tokens
            .map(|token| parse_face_index(token, line_no))
            .collect::<Result<Vec<_>, _>>()?;
          if face.is_empty() {
            return Err(ObjError::Syntax {
              line: line_no,
              message: "face without vertices".to_string(),
            });
          }
          mesh.faces.push(face);
        }
        _ => {}
      }
    }

    let count = mesh.vertices.len() as u32;
    for (face_index, face) in mesh.faces.iter().enumerate() {
      if let Some(&id) = face.iter().find(|id| **id > count) {
        return Err(ObjError::FaceIndex {
          face: face_index,
          index: id,
          vertex_count: count,
        });
      }
    }

    Ok(mesh)
  }
}

fn parse_coord(token: Option<&str>, line: usize) -> Result<f32, ObjError> {
  let token = token.ok_or_else(|| ObjError::Syntax {
    line,
    message: "vertex needs x and y".to_string(),
  })?;
  token.parse::<f32>().map_err(|_| ObjError::Syntax {
    line,
    message: format!("invalid coordinate {:?}", token),
  })
}

fn parse_face_index(token: &str, line: usize) -> Result<u32, ObjError> {
  let id = token.split('/').next().unwrap_or_default();
  match id.parse::<u32>() {
    Ok(id) if id > 0 => Ok(id),
    _ => Err(ObjError::Syntax {
      line,
      message: format!("invalid face index {:?}", token),
    }),
  }
}

/// Error reading or writing OBJ data.
#[derive(Debug)]
pub enum ObjError {
  Io { path: PathBuf, source: io::Error },
  Syntax { line: usize, message: String },
  FaceIndex { face: usize, index: u32, vertex_count: u32 },
}

impl ObjError {
  fn io(path: &Path, source: io::Error) -> Self {
    Self::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}

impl std::fmt::Display for ObjError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Io { path, source } => write!(f, "{}: {}", path.display(), source),
      Self::Syntax { line, message } => write!(f, "line {}: {}", line, message),
      Self::FaceIndex {
        face,
        index,
        vertex_count,
      } => write!(
        f,
        "face {} references vertex {} but only {} exist",
        face, index, vertex_count
      ),
    }
  }
}

impl std::error::Error for ObjError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Io { source, .. } => Some(source),
      _ => None,
    }
  }
}
