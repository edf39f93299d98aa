//! Block proximity ranges.
//!
//! Rendering and animation work is limited to the blocks around the player's
//! block, so per-frame cost stays bounded no matter how large the level is.

use serde::Deserialize;

use crate::coords::BlockPos;

/// Rectangular range of blocks around a center block.
///
/// `half_x = 3, half_y = 2` covers a 7x5 block window.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct BlockRange {
  pub half_x: u32,
  pub half_y: u32,
}

impl Default for BlockRange {
  fn default() -> Self {
    Self::new(3, 2)
  }
}

impl BlockRange {
  pub const fn new(half_x: u32, half_y: u32) -> Self {
    Self { half_x, half_y }
  }

  /// Returns true if `block` lies within this range of `center`.
  ///
  /// Per-axis Chebyshev test; the window edges are inclusive.
  pub fn contains(&self, center: BlockPos, block: BlockPos) -> bool {
    let dx = (block.x as i64 - center.x as i64).unsigned_abs();
    let dy = (block.y as i64 - center.y as i64).unsigned_abs();
    dx <= self.half_x as u64 && dy <= self.half_y as u64
  }

  /// Iterates the blocks of the window around `center`, row by row.
  pub fn blocks_around(&self, center: BlockPos) -> impl Iterator<Item = BlockPos> + use<> {
    let hx = self.half_x as i32;
    let hy = self.half_y as i32;
    let (cx, cy) = (center.x, center.y);
    (cy.saturating_sub(hy)..=cy.saturating_add(hy))
      .flat_map(move |y| (cx.saturating_sub(hx)..=cx.saturating_add(hx)).map(move |x| BlockPos::new(x, y)))
  }

  /// Number of blocks in the window.
  pub fn block_count(&self) -> u64 {
    (2 * self.half_x as u64 + 1) * (2 * self.half_y as u64 + 1)
  }
}
