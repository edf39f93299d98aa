//! Dense tile grids.
//!
//! A [`TileGrid`] is the single representation of a layer's tile indices once
//! loading is done. Both the tile map and the collision mesh read it; neither
//! mutates it.

mod chunk;

use bevy::math::IVec2;
pub use chunk::{Chunk, ChunkError, LayerData, assemble_chunks};

use crate::coords::TilePos;

/// Tile index reserved for "no tile".
pub const EMPTY_TILE: i32 = 0;

/// Row-major grid of global tile ids with a placement offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileGrid {
  width: u32,
  height: u32,
  /// Position of cell (0, 0) in the level's tile space.
  offset: IVec2,
  data: Vec<i32>,
}

impl TileGrid {
  /// Creates a zero-filled grid.
  pub fn empty(width: u32, height: u32, offset: IVec2) -> Self {
    Self {
      width,
      height,
      offset,
      data: vec![EMPTY_TILE; width as usize * height as usize],
    }
  }

  /// Wraps existing row-major data.
  pub fn from_data(width: u32, height: u32, offset: IVec2, data: Vec<i32>) -> Result<Self, GridError> {
    let expected = width as usize * height as usize;
    if data.len() != expected {
      return Err(GridError::DataLength {
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      width,
      height,
      offset,
      data,
    })
  }

  /// Parses comma-separated rows as written by Tiled's CSV encoding.
  ///
  /// Blank lines and trailing commas are ignored. Every non-blank row must
  /// hold exactly `width` values and there must be exactly `height` rows.
  pub fn from_csv(width: u32, height: u32, text: &str) -> Result<Self, GridError> {
    let mut data = Vec::with_capacity(width as usize * height as usize);
    let mut rows = 0u32;

    for (line_no, line) in text.lines().enumerate() {
      let line = line.trim();
      if line.is_empty() {
        continue;
      }

      let before = data.len();
      for cell in line.split(',') {
        let cell = cell.trim();
        if cell.is_empty() {
          continue;
        }
        let value = cell.parse::<i32>().map_err(|_| GridError::InvalidCell {
          line: line_no + 1,
          value: cell.to_string(),
        })?;
        data.push(value);
      }

      let count = data.len() - before;
      if count != width as usize {
        return Err(GridError::RowLength {
          line: line_no + 1,
          expected: width,
          actual: count,
        });
      }
      rows += 1;
    }

    if rows != height {
      return Err(GridError::RowCount {
        expected: height,
        actual: rows,
      });
    }

    Self::from_data(width, height, IVec2::ZERO, data)
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn offset(&self) -> IVec2 {
    self.offset
  }

  /// Returns a copy of this grid placed at a different offset.
  pub fn with_offset(mut self, offset: IVec2) -> Self {
    self.offset = offset;
    self
  }

  pub fn data(&self) -> &[i32] {
    &self.data
  }

  /// Returns the tile id at grid-local `(x, y)`, or `None` outside the grid.
  pub fn get(&self, x: u32, y: u32) -> Option<i32> {
    if x >= self.width || y >= self.height {
      return None;
    }
    Some(self.data[self.index(x, y)])
  }

  /// Copies one row of cells starting at grid-local `(x, y)`.
  pub(crate) fn copy_row(&mut self, x: u32, y: u32, row: &[i32]) {
    let start = self.index(x, y);
    self.data[start..start + row.len()].copy_from_slice(row);
  }

  /// Iterates non-empty cells as `(grid_x, grid_y, tile_id)`.
  pub fn cells(&self) -> impl Iterator<Item = (u32, u32, i32)> + '_ {
    let width = self.width.max(1);
    self
      .data
      .iter()
      .enumerate()
      .filter(|(_, id)| **id != EMPTY_TILE)
      .map(move |(i, id)| ((i as u32) % width, (i as u32) / width, *id))
  }

  /// Converts a grid-local cell to its position in level tile space.
  pub fn tile_pos(&self, x: u32, y: u32) -> TilePos {
    TilePos::new(self.offset.x + x as i32, self.offset.y + y as i32)
  }

  /// Smallest non-empty tile id, used to resolve the grid's tileset.
  pub fn min_gid(&self) -> Option<i32> {
    self.data.iter().copied().filter(|id| *id > EMPTY_TILE).min()
  }

  pub fn is_empty(&self) -> bool {
    self.data.iter().all(|id| *id == EMPTY_TILE)
  }

  #[inline]
  fn index(&self, x: u32, y: u32) -> usize {
    y as usize * self.width as usize + x as usize
  }
}

/// Error constructing a grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
  DataLength { expected: usize, actual: usize },
  InvalidCell { line: usize, value: String },
  RowLength { line: usize, expected: u32, actual: usize },
  RowCount { expected: u32, actual: u32 },
}

impl std::fmt::Display for GridError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::DataLength { expected, actual } => {
        write!(f, "grid data has {} cells, expected {}", actual, expected)
      }
      Self::InvalidCell { line, value } => write!(f, "line {}: invalid tile id {:?}", line, value),
      Self::RowLength {
        line,
        expected,
        actual,
      } => write!(f, "line {}: row has {} cells, expected {}", line, actual, expected),
      Self::RowCount { expected, actual } => {
        write!(f, "grid has {} rows, expected {}", actual, expected)
      }
    }
  }
}

impl std::error::Error for GridError {}
