//! Physics world integration for collision loops.
//!
//! The pipeline only creates static bodies and chain fixtures; it never steps
//! the simulation. [`ChainWorld`] records what was created and is used by
//! tests and the command-line tool. The `rapier2d` feature adds
//! [`rapier::RapierChainWorld`].

#[cfg(feature = "rapier2d")]
pub mod rapier;

use bevy::math::Vec2;

use super::{ObjectType, PhysicsLoop};
use crate::config::CollisionConfig;

/// Chain fixture description handed to a [`PhysicsWorld`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChainFixture {
  /// Chain points in physics units, relative to the body.
  pub points: Vec<Vec2>,
  /// The chain connects its last point back to the first.
  pub closed: bool,
  pub friction: f32,
  pub density: f32,
  pub tag: ObjectType,
}

/// Material properties of generated fixtures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixtureSettings {
  pub friction: f32,
  pub density: f32,
}

impl Default for FixtureSettings {
  fn default() -> Self {
    Self {
      friction: 0.2,
      density: 0.0,
    }
  }
}

impl FixtureSettings {
  pub fn from_config(config: &CollisionConfig) -> Self {
    Self {
      friction: config.friction,
      ..Default::default()
    }
  }
}

/// Minimal rigid-body world interface needed for static level geometry.
pub trait PhysicsWorld {
  type Body: Copy;

  fn create_static_body(&mut self, position: Vec2) -> Self::Body;

  fn create_chain_fixture(&mut self, body: Self::Body, fixture: ChainFixture);
}

/// Adds `lp` to `world` as one closed chain fixture.
///
/// Creates a static body at the origin unless `body` is given. Returns the
/// body the fixture was attached to.
pub fn add_loop_to_world<W: PhysicsWorld>(
  world: &mut W,
  lp: &PhysicsLoop,
  settings: &FixtureSettings,
  body: Option<W::Body>,
) -> W::Body {
  let body = body.unwrap_or_else(|| world.create_static_body(Vec2::ZERO));
  world.create_chain_fixture(
    body,
    ChainFixture {
      points: lp.points.clone(),
      closed: true,
      friction: settings.friction,
      density: settings.density,
      tag: lp.object_type,
    },
  );
  body
}

/// Handle of a body in a [`ChainWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct StaticBody {
  pub position: Vec2,
  pub fixtures: Vec<ChainFixture>,
}

/// In-memory physics world that records bodies and fixtures.
#[derive(Debug, Clone, Default)]
pub struct ChainWorld {
  bodies: Vec<StaticBody>,
}

impl ChainWorld {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn bodies(&self) -> &[StaticBody] {
    &self.bodies
  }

  pub fn body(&self, id: BodyId) -> Option<&StaticBody> {
    self.bodies.get(id.0)
  }

  pub fn fixtures(&self) -> impl Iterator<Item = &ChainFixture> {
    self.bodies.iter().flat_map(|b| b.fixtures.iter())
  }

  pub fn fixture_count(&self) -> usize {
    self.bodies.iter().map(|b| b.fixtures.len()).sum()
  }
}

impl PhysicsWorld for ChainWorld {
  type Body = BodyId;

  fn create_static_body(&mut self, position: Vec2) -> BodyId {
    self.bodies.push(StaticBody {
      position,
      fixtures: Vec::new(),
    });
    BodyId(self.bodies.len() - 1)
  }

  fn create_chain_fixture(&mut self, body: BodyId, fixture: ChainFixture) {
    if let Some(b) = self.bodies.get_mut(body.0) {
      b.fixtures.push(fixture);
    }
  }
}
