//! Chain diagnostics.
//!
//! Chains that touch at a vertex make bodies catch on the seam ("ghost"
//! collisions). The optimizer should merge such outlines; this pass reports
//! the ones it did not.

use std::collections::{BTreeMap, BTreeSet};

use bevy::log::warn;
use bevy::math::Vec2;

use super::PhysicsLoop;

/// A position used by more than one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedVertex {
  pub position: Vec2,
  /// Indices into the analyzed chain list, ascending.
  pub chains: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainReport {
  pub chain_count: usize,
  pub vertex_count: usize,
  pub shared: Vec<SharedVertex>,
}

impl ChainReport {
  pub fn is_clean(&self) -> bool {
    self.shared.is_empty()
  }
}

/// Finds vertices shared between different chains.
///
/// Positions are compared after rounding to `1 / precision` units.
pub fn analyze_chains(chains: &[PhysicsLoop], precision: f32) -> ChainReport {
  let precision = if precision > 0.0 { precision as f64 } else { 1000.0 };
  let mut owners: BTreeMap<(i64, i64), (Vec2, BTreeSet<usize>)> = BTreeMap::new();
  let mut vertex_count = 0;

  for (index, chain) in chains.iter().enumerate() {
    for p in &chain.points {
      vertex_count += 1;
      let key = (
        (p.x as f64 * precision).round() as i64,
        (p.y as f64 * precision).round() as i64,
      );
      owners
        .entry(key)
        .or_insert_with(|| (*p, BTreeSet::new()))
        .1
        .insert(index);
    }
  }

  let shared: Vec<SharedVertex> = owners
    .into_values()
    .filter(|(_, set)| set.len() > 1)
    .map(|(position, set)| SharedVertex {
      position,
      chains: set.into_iter().collect(),
    })
    .collect();

  for vertex in &shared {
    warn!(
      "vertex ({:.3}, {:.3}) is shared by chains {:?}",
      vertex.position.x, vertex.position.y, vertex.chains
    );
  }

  ChainReport {
    chain_count: chains.len(),
    vertex_count,
    shared,
  }
}
