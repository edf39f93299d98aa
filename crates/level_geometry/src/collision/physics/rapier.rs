//! rapier2d backend.
//!
//! Bodies are `RigidBody::Fixed` entities; each chain fixture is a child
//! entity with a closed `Collider::polyline` and the loop's `ObjectType`
//! as a component, so collision handlers can query it.

use bevy::prelude::*;
use bevy_rapier2d::prelude::*;

use super::{ChainFixture, PhysicsWorld};
use crate::coords::physics_to_pixels;

/// Marker for bodies spawned for level geometry.
#[derive(Component, Debug)]
pub struct LevelGeometryBody;

/// [`PhysicsWorld`] that spawns rapier entities into a Bevy world.
pub struct RapierChainWorld<'a> {
  world: &'a mut World,
  /// Multiplier from physics units to rapier length units.
  scale: f32,
}

impl<'a> RapierChainWorld<'a> {
  pub fn new(world: &'a mut World) -> Self {
    Self { world, scale: 1.0 }
  }

  /// Sets the physics-unit to rapier-unit factor (e.g. pixels per meter when
  /// rapier runs in pixel space).
  pub fn with_scale(mut self, scale: f32) -> Self {
    self.scale = scale;
    self
  }
}

impl PhysicsWorld for RapierChainWorld<'_> {
  type Body = Entity;

  fn create_static_body(&mut self, position: Vec2) -> Entity {
    let translation = physics_to_pixels(position, self.scale).extend(0.0);
    self
      .world
      .spawn((
        RigidBody::Fixed,
        Transform::from_translation(translation),
        LevelGeometryBody,
      ))
      .id()
  }

  fn create_chain_fixture(&mut self, body: Entity, fixture: ChainFixture) {
    let vertices: Vec<Vec2> = fixture
      .points
      .iter()
      .map(|p| physics_to_pixels(*p, self.scale))
      .collect();
    let collider = Collider::polyline(vertices, Some(chain_indices(fixture.points.len(), fixture.closed)));

    self.world.spawn((
      collider,
      Friction::coefficient(fixture.friction),
      ColliderMassProperties::Density(fixture.density),
      Transform::default(),
      fixture.tag,
      ChildOf(body),
    ));
  }
}

/// Segment indices of a chain over `len` points.
fn chain_indices(len: usize, closed: bool) -> Vec<[u32; 2]> {
  let mut indices: Vec<[u32; 2]> = (1..len).map(|i| [i as u32 - 1, i as u32]).collect();
  if closed && len > 2 {
    indices.push([len as u32 - 1, 0]);
  }
  indices
}
