//! Infinite-map chunk assembly.
//!
//! Tiled stores infinite maps as fixed-size chunks scattered over tile space.
//! The pipeline works on one dense grid per layer, so chunks are stitched
//! into the smallest grid covering all of them. Holes between chunks stay
//! empty.

use bevy::math::IVec2;

use super::TileGrid;

/// Rectangular patch of tile data positioned in tile space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
  /// Tile-space position of the chunk's top-left cell.
  pub position: IVec2,
  pub width: u32,
  pub height: u32,
  /// Row-major tile ids, `width * height` entries.
  pub data: Vec<i32>,
}

impl Chunk {
  pub fn new(position: IVec2, width: u32, height: u32, data: Vec<i32>) -> Self {
    Self {
      position,
      width,
      height,
      data,
    }
  }

  /// Creates a chunk with every cell set to `value`.
  pub fn filled(position: IVec2, width: u32, height: u32, value: i32) -> Self {
    Self::new(position, width, height, vec![value; (width * height) as usize])
  }

  fn row(&self, y: u32) -> &[i32] {
    let start = (y * self.width) as usize;
    &self.data[start..start + self.width as usize]
  }
}

/// Tile data of one layer as authored.
#[derive(Clone, Debug)]
pub enum LayerData {
  /// Inline grid (finite maps).
  Inline(TileGrid),
  /// Sparse chunks (infinite maps).
  Chunks(Vec<Chunk>),
}

impl LayerData {
  /// Produces the layer's dense grid.
  ///
  /// Inline grids are used as is at offset (0, 0); chunk lists are
  /// assembled.
  pub fn into_grid(self) -> Result<TileGrid, ChunkError> {
    match self {
      LayerData::Inline(grid) => Ok(grid.with_offset(IVec2::ZERO)),
      LayerData::Chunks(chunks) => assemble_chunks(&chunks),
    }
  }
}

/// Merges uniformly sized chunks into one dense grid.
///
/// The grid's offset is the smallest chunk origin; its extent reaches the far
/// edge of the farthest chunk.
pub fn assemble_chunks(chunks: &[Chunk]) -> Result<TileGrid, ChunkError> {
  let Some(first) = chunks.first() else {
    return Err(ChunkError::NoChunks);
  };

  let (chunk_width, chunk_height) = (first.width, first.height);
  let mut min = first.position;
  let mut max = first.position;

  for (index, chunk) in chunks.iter().enumerate() {
    if chunk.width != chunk_width || chunk.height != chunk_height {
      return Err(ChunkError::UnevenChunkSize {
        index,
        expected: (chunk_width, chunk_height),
        actual: (chunk.width, chunk.height),
      });
    }
    let cells = chunk.width as usize * chunk.height as usize;
    if chunk.data.len() != cells {
      return Err(ChunkError::DataLength {
        index,
        expected: cells,
        actual: chunk.data.len(),
      });
    }
    min = min.min(chunk.position);
    max = max.max(chunk.position);
  }

  let width = (max.x - min.x) as u32 + chunk_width;
  let height = (max.y - min.y) as u32 + chunk_height;
  let mut grid = TileGrid::empty(width, height, min);

  for chunk in chunks {
    let local = chunk.position - min;
    for y in 0..chunk.height {
      grid.copy_row(local.x as u32, local.y as u32 + y, chunk.row(y));
    }
  }

  bevy::log::debug!(
    "assembled {} chunks into {}x{} grid at offset {:?}",
    chunks.len(),
    width,
    height,
    min
  );

  Ok(grid)
}

/// Error assembling chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
  NoChunks,
  UnevenChunkSize {
    index: usize,
    expected: (u32, u32),
    actual: (u32, u32),
  },
  DataLength {
    index: usize,
    expected: usize,
    actual: usize,
  },
}

impl std::fmt::Display for ChunkError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::NoChunks => write!(f, "layer has no chunks"),
      Self::UnevenChunkSize {
        index,
        expected,
        actual,
      } => write!(
        f,
        "chunk {} is {}x{}, expected {}x{} like the first chunk",
        index, actual.0, actual.1, expected.0, expected.1
      ),
      Self::DataLength {
        index,
        expected,
        actual,
      } => write!(f, "chunk {} has {} cells, expected {}", index, actual, expected),
    }
  }
}

impl std::error::Error for ChunkError {}
