//! Level Geometry - tile map streaming and collision meshes for Bevy levels.
//!
//! Turns tile-grid level layers into:
//! - block-partitioned [`SpatialTileMap`]s whose drawing and animation is
//!   limited to the blocks around the player
//! - welded, externally optimized collision meshes attached to a physics
//!   world as static chain fixtures
//!
//! The rigid-body simulator, GPU backend and mesh optimizer are external
//! collaborators behind [`PhysicsWorld`], [`RenderTarget`] and
//! [`MeshOptimizer`].

pub mod collision;
pub mod config;
pub mod coords;
pub mod culling;
pub mod grid;
pub mod level;
pub mod plugin;
pub mod tilemap;
pub mod tileset;

pub use collision::{
  CollisionLayerKind, ExternalOptimizer, GeometryError, LoopWinding, MeshOptimizer, ObjMesh,
  ObjectType, PhysicsLoop, PhysicsWorld, add_loop_to_world, build_mesh, dump_obj, parse_obj,
};
pub use config::{LevelGeometryConfig, ValidationMode};
pub use coords::{BLOCK_SIZE, BlockPos, TilePos};
pub use culling::BlockRange;
pub use grid::{Chunk, ChunkError, GridError, LayerData, TileGrid, assemble_chunks};
pub use level::{
  LevelFileWatcher, LevelLoadError, LevelLoadReport, LevelLoader, LevelSource, LoadedLevel,
};
pub use plugin::{LevelFocus, LevelGeometryPlugin, LevelReloadRequested, LevelTileMaps, LevelWatcher};
pub use tilemap::{RenderTarget, Rgba, SpatialTileMap, StencilMask, TileLayerInfo, TileMapError};
pub use tileset::{CollisionShape, Tileset, resolve_tileset};
