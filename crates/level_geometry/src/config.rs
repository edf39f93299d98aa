//! Pipeline configuration.
//!
//! Loaded from a TOML file (usually `level_geometry.config.toml`). Every
//! field has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! [units]
//! pixels_per_meter = 48.0
//!
//! [collision]
//! winding = "reversed"
//! validation = "content"
//!
//! [optimizer]
//! program = "tools/path_merge/path_merge"
//! timeout_ms = 30000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use bevy::prelude::Resource;
use serde::Deserialize;

use crate::collision::LoopWinding;
use crate::culling::BlockRange;

/// Top-level configuration for the level geometry pipeline.
#[derive(Resource, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LevelGeometryConfig {
  pub units: UnitsConfig,
  pub culling: CullingConfig,
  pub collision: CollisionConfig,
  pub optimizer: OptimizerConfig,
  pub watcher: WatcherConfig,
}

impl LevelGeometryConfig {
  /// Parses a configuration from TOML text.
  pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
    toml::from_str(text).map_err(ConfigError::Parse)
  }

  /// Reads and parses a configuration file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
      path: path.to_path_buf(),
      source: e,
    })?;
    Self::from_toml_str(&text)
  }
}

/// Unit conversion factors.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct UnitsConfig {
  /// Level pixels per physics unit.
  /// Default: 48.0
  pub pixels_per_meter: f32,
}

impl Default for UnitsConfig {
  fn default() -> Self {
    Self {
      pixels_per_meter: 48.0,
    }
  }
}

/// Proximity ranges, in blocks, around the player's block.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CullingConfig {
  /// Static blocks submitted for drawing.
  /// Default: 3 x 2
  pub draw: BlockRange,
  /// Animated tiles advanced each frame.
  /// Default: 3 x 2
  pub update: BlockRange,
}

impl Default for CullingConfig {
  fn default() -> Self {
    Self {
      draw: BlockRange::new(3, 2),
      update: BlockRange::new(3, 2),
    }
  }
}

/// How malformed collision geometry is treated.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
  /// Record a per-layer diagnostic and keep loading.
  #[default]
  Runtime,
  /// Abort the level load with an error on the first malformed layer.
  Content,
}

/// Collision mesh settings.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CollisionConfig {
  /// Vertex order of generated chain loops.
  pub winding: LoopWinding,
  pub validation: ValidationMode,
  /// Weld quantization steps per pixel (1000 = 1/1000 px).
  pub weld_precision: f32,
  /// Attach all loops of a layer to one static body instead of one body per
  /// loop.
  pub share_layer_body: bool,
  pub friction: f32,
  /// Report vertices shared between chains after loading.
  pub analyze_chains: bool,
}

impl Default for CollisionConfig {
  fn default() -> Self {
    Self {
      winding: LoopWinding::Authored,
      validation: ValidationMode::Runtime,
      weld_precision: 1000.0,
      share_layer_body: false,
      friction: 0.2,
      analyze_chains: false,
    }
  }
}

/// External mesh optimizer settings.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct OptimizerConfig {
  pub enabled: bool,
  /// Executable invoked as `<program> <not_optimised.obj> <optimised.obj>`.
  pub program: PathBuf,
  pub timeout_ms: u64,
}

impl OptimizerConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      program: default_optimizer_program(),
      timeout_ms: 30_000,
    }
  }
}

#[cfg(windows)]
fn default_optimizer_program() -> PathBuf {
  PathBuf::from("tools\\path_merge\\path_merge.exe")
}

#[cfg(not(windows))]
fn default_optimizer_program() -> PathBuf {
  PathBuf::from("tools/path_merge/path_merge")
}

/// Level source file watcher settings.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WatcherConfig {
  pub enabled: bool,
  pub poll_interval_ms: u64,
}

impl WatcherConfig {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms.max(1))
  }
}

impl Default for WatcherConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      poll_interval_ms: 1000,
    }
  }
}

/// Error reading a configuration file.
#[derive(Debug)]
pub enum ConfigError {
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Io { path, source } => write!(f, "failed to read {}: {}", path.display(), source),
      Self::Parse(e) => write!(f, "invalid config: {}", e),
    }
  }
}

impl std::error::Error for ConfigError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Io { source, .. } => Some(source),
      Self::Parse(e) => Some(e),
    }
  }
}
