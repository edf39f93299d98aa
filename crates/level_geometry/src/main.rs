//! Command-line baking and validation of level geometry.
//!
//! ```text
//! level_tool bake levels/intro/level.toml
//! level_tool dump-obj levels/intro/level.toml --layer level
//! level_tool check-obj levels/intro/layer_level_solid.obj
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bevy::log::{error, info, warn};
use clap::{Parser, Subcommand};
use level_geometry::collision::{
  ChainWorld, ParseOptions, analyze_chains, dump_obj, parse_obj,
};
use level_geometry::level::read_level_source;
use level_geometry::{
  CollisionLayerKind, ExternalOptimizer, LevelGeometryConfig, LevelLoader, ObjectType,
  ValidationMode, resolve_tileset,
};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(name = "level_tool", about = "Bake and validate level collision geometry")]
struct Cli {
  /// Pipeline configuration file.
  #[arg(long, global = true)]
  config: Option<PathBuf>,
  /// Log debug output.
  #[arg(short, long, global = true)]
  verbose: bool,
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Load a level, regenerating missing collision meshes.
  Bake {
    level: PathBuf,
    /// Fail on the first malformed collision layer.
    #[arg(long)]
    strict: bool,
    /// Skip the external optimizer.
    #[arg(long)]
    no_optimizer: bool,
  },
  /// Write a layer's welded, un-optimized collision mesh.
  DumpObj {
    level: PathBuf,
    #[arg(long)]
    layer: String,
    /// Output path; defaults to the layer's `_not_optimised.obj` cache file.
    #[arg(long)]
    out: Option<PathBuf>,
  },
  /// Validate the loops of an OBJ file.
  CheckObj {
    obj: PathBuf,
    /// Report vertices shared between loops.
    #[arg(long)]
    shared: bool,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  let level = if cli.verbose {
    LevelFilter::DEBUG
  } else {
    LevelFilter::INFO
  };
  tracing_subscriber::fmt().with_max_level(level).with_target(false).init();

  let config = match &cli.config {
    Some(path) => match LevelGeometryConfig::load(path) {
      Ok(config) => config,
      Err(e) => {
        error!("{}", e);
        return ExitCode::from(2);
      }
    },
    None => LevelGeometryConfig::default(),
  };

  let result = match cli.command {
    Command::Bake {
      level,
      strict,
      no_optimizer,
    } => bake(config, &level, strict, no_optimizer),
    Command::DumpObj { level, layer, out } => dump(&config, &level, &layer, out),
    Command::CheckObj { obj, shared } => check(&config, &obj, shared),
  };

  match result {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(message) => {
      error!("{}", message);
      ExitCode::from(2)
    }
  }
}

/// Returns whether the level loaded without diagnostics.
fn bake(mut config: LevelGeometryConfig, level: &Path, strict: bool, no_optimizer: bool) -> Result<bool, String> {
  if strict {
    config.collision.validation = ValidationMode::Content;
  }
  if no_optimizer {
    config.optimizer.enabled = false;
  }

  let optimizer = ExternalOptimizer::from_config(&config.optimizer);
  let loader = LevelLoader::new(&config, &optimizer);
  let mut world = ChainWorld::new();
  let loaded = loader.load_file(level, &mut world).map_err(|e| e.to_string())?;

  for collision in &loaded.collision {
    info!(
      "{}: {} loops ({:?}, {:?})",
      collision.layer, collision.loops, collision.kind, collision.source
    );
  }
  for layer in &loaded.layers {
    let map = layer.map();
    info!(
      "{}: {} blocks, {} animated tiles",
      map.name(),
      map.block_count(),
      map.animated_count()
    );
  }
  info!(
    "{} bodies, {} fixtures",
    world.bodies().len(),
    world.fixture_count()
  );

  for diagnostic in &loaded.report.diagnostics {
    warn!("{}", diagnostic);
  }
  Ok(loaded.is_clean())
}

fn dump(config: &LevelGeometryConfig, level: &Path, layer_name: &str, out: Option<PathBuf>) -> Result<bool, String> {
  let source = read_level_source(level).map_err(|e| e.to_string())?;
  let dir = level.parent().unwrap_or(Path::new("."));
  let layer = source
    .layer(layer_name)
    .ok_or_else(|| format!("no layer named '{}'", layer_name))?;

  let grid = layer
    .layer_data()
    .map_err(|e| e.to_string())?
    .into_grid()
    .map_err(|e| e.to_string())?;
  let offset = grid.offset() + layer.extra_offset();
  let grid = grid.with_offset(offset);

  let tilesets = source.tilesets(dir);
  let gid = grid.min_gid().ok_or("layer has no tiles")?;
  let tileset = resolve_tileset(&tilesets, gid).ok_or_else(|| format!("no tileset contains tile id {}", gid))?;

  let out = match out {
    Some(out) => out,
    None => {
      let kind = CollisionLayerKind::detect(&layer.name, layer.properties.collision.as_deref())
        .unwrap_or(CollisionLayerKind::Solid);
      dir.join(kind.unoptimized_file_name(&layer.name))
    }
  };

  let precision = config.collision.weld_precision;
  dump_obj(&grid, tileset, &out, precision).map_err(|e| e.to_string())?;
  Ok(true)
}

fn check(config: &LevelGeometryConfig, obj: &Path, shared: bool) -> Result<bool, String> {
  let options = ParseOptions {
    pixels_per_meter: config.units.pixels_per_meter,
    winding: config.collision.winding,
  };
  let loops = parse_obj(obj, ObjectType::Solid, &options).map_err(|e| format!("{}: {}", obj.display(), e))?;
  info!("{}: {} valid loops", obj.display(), loops.len());

  if !shared {
    return Ok(true);
  }
  let report = analyze_chains(&loops, config.collision.weld_precision);
  info!(
    "{} chains, {} vertices, {} shared",
    report.chain_count,
    report.vertex_count,
    report.shared.len()
  );
  Ok(report.is_clean())
}
