use std::collections::HashMap;

use bevy::math::Vec2;

/// Deduplicates vertices by quantized position.
///
/// Positions are rounded to `1 / precision` pixels before hashing, so points
/// produced by neighbouring tiles for the same corner share one id. Ids are
/// 1-based to match OBJ face indices.
#[derive(Debug, Clone)]
pub struct WeldTable {
  precision: f32,
  ids: HashMap<(i64, i64), u32>,
  vertices: Vec<Vec2>,
}

impl WeldTable {
  pub fn new(precision: f32) -> Self {
    Self {
      precision: if precision > 0.0 { precision } else { 1000.0 },
      ids: HashMap::new(),
      vertices: Vec::new(),
    }
  }

  /// Returns the id for `point`, allocating one if no welded vertex exists.
  pub fn weld(&mut self, point: Vec2) -> u32 {
    let key = self.key(point);
    if let Some(&id) = self.ids.get(&key) {
      return id;
    }
    self.vertices.push(point);
    let id = self.vertices.len() as u32;
    self.ids.insert(key, id);
    id
  }

  /// Id of an already welded point.
  pub fn get(&self, point: Vec2) -> Option<u32> {
    self.ids.get(&self.key(point)).copied()
  }

  pub fn len(&self) -> usize {
    self.vertices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vertices.is_empty()
  }

  /// Welded vertices in id order (`vertices()[id - 1]`).
  pub fn vertices(&self) -> &[Vec2] {
    &self.vertices
  }

  pub fn into_vertices(self) -> Vec<Vec2> {
    self.vertices
  }

  fn key(&self, point: Vec2) -> (i64, i64) {
    (
      (point.x as f64 * self.precision as f64).round() as i64,
      (point.y as f64 * self.precision as f64).round() as i64,
    )
  }
}
