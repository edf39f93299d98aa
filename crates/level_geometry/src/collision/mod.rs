//! Collision mesh generation.
//!
//! Turns tile grids into static chain geometry:
//! - [`build_mesh`] collects and welds tile collision shapes into an
//!   [`ObjMesh`]
//! - [`dump_obj`] writes that mesh as Wavefront OBJ for the external optimizer
//! - [`parse_obj`] reads an (optimized) OBJ back as [`PhysicsLoop`]s
//! - [`add_loop_to_world`] attaches loops to a [`PhysicsWorld`] as chain
//!   fixtures

mod analyzer;
mod builder;
mod obj;
mod optimizer;
pub mod physics;
mod weld;

use bevy::prelude::Component;
use serde::Deserialize;

pub use analyzer::{ChainReport, SharedVertex, analyze_chains};
pub use builder::{
  GeometryError, LOOP_CLOSURE_EPSILON, ParseOptions, PhysicsLoop, build_mesh, dump_obj,
  loops_from_mesh, parse_obj, parse_obj_str,
};
pub use obj::{ObjError, ObjMesh};
pub use optimizer::{ExternalOptimizer, MeshOptimizer, OptimizerError, OptimizerOutput};
pub use physics::{ChainFixture, ChainWorld, FixtureSettings, PhysicsWorld, add_loop_to_world};
pub use weld::WeldTable;

/// Gameplay tag attached to every chain fixture.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectType {
  Solid,
  SolidOneSided,
  Deadly,
  Crusher,
  Door,
  /// Tag defined by gameplay code.
  Other(u32),
}

/// Vertex order of loops read from OBJ faces.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoopWinding {
  /// Keep the face's vertex order.
  #[default]
  Authored,
  /// Reverse the face's vertex order.
  Reversed,
}

/// Which collision mesh a tile layer feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionLayerKind {
  Solid,
  SolidOneSided,
  Deadly,
}

impl CollisionLayerKind {
  /// Resolves a layer's kind from its `collision` property, falling back to
  /// the conventional layer names. Returns `None` for non-colliding layers.
  pub fn detect(layer_name: &str, collision_property: Option<&str>) -> Option<Self> {
    match collision_property {
      Some(value) => Self::from_property(value),
      None => match layer_name {
        "level" => Some(Self::Solid),
        "level_solid_onesided" => Some(Self::SolidOneSided),
        "level_deadly" => Some(Self::Deadly),
        _ => None,
      },
    }
  }

  fn from_property(value: &str) -> Option<Self> {
    match value {
      "solid" => Some(Self::Solid),
      "solid_onesided" | "one_sided" => Some(Self::SolidOneSided),
      "deadly" => Some(Self::Deadly),
      _ => None,
    }
  }

  /// Suffix of this kind's OBJ cache files.
  pub fn file_suffix(self) -> &'static str {
    match self {
      Self::Solid => "solid",
      Self::SolidOneSided => "solid_onesided",
      Self::Deadly => "deadly",
    }
  }

  pub fn object_type(self) -> ObjectType {
    match self {
      Self::Solid => ObjectType::Solid,
      Self::SolidOneSided => ObjectType::SolidOneSided,
      Self::Deadly => ObjectType::Deadly,
    }
  }

  /// `layer_<name>_<suffix>.obj`
  pub fn optimized_file_name(self, layer_name: &str) -> String {
    format!("layer_{}_{}.obj", layer_name, self.file_suffix())
  }

  /// `layer_<name>_<suffix>_not_optimised.obj`
  pub fn unoptimized_file_name(self, layer_name: &str) -> String {
    format!("layer_{}_{}_not_optimised.obj", layer_name, self.file_suffix())
  }
}
