//! External mesh optimizer.
//!
//! The optimizer merges per-tile quads into larger outlines. It runs as a
//! separate program with file-in/file-out IPC:
//! `<program> <not_optimised.obj> <optimised.obj>`, exit code 0 on success.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use async_channel::{Receiver, TryRecvError};
use bevy::log::{debug, info, warn};
use web_time::Instant;

use crate::config::OptimizerConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for output pipes after the child is gone. Processes the
/// optimizer spawned may keep the pipes open past its exit.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Converts an un-optimized OBJ file into an optimized one.
pub trait MeshOptimizer {
  fn optimize(&self, input: &Path, output: &Path) -> Result<OptimizerOutput, OptimizerError>;
}

/// Captured output of a successful optimizer run.
#[derive(Debug, Clone, Default)]
pub struct OptimizerOutput {
  pub stdout: String,
  pub stderr: String,
  pub elapsed: Duration,
}

/// Runs the optimizer as a child process, bounded by a timeout.
#[derive(Debug, Clone)]
pub struct ExternalOptimizer {
  program: PathBuf,
  timeout: Duration,
}

impl ExternalOptimizer {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      timeout: Duration::from_secs(30),
    }
  }

  pub fn from_config(config: &OptimizerConfig) -> Self {
    Self::new(&config.program).with_timeout(config.timeout())
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn program(&self) -> &Path {
    &self.program
  }

  fn wait_with_timeout(&self, child: &mut Child) -> Result<ExitStatus, OptimizerError> {
    let start = Instant::now();
    loop {
      if let Some(status) = child.try_wait().map_err(OptimizerError::Wait)? {
        return Ok(status);
      }
      if start.elapsed() >= self.timeout {
        // Kill can fail if the child exited between the checks.
        let _ = child.kill();
        let _ = child.wait();
        return Err(OptimizerError::TimedOut {
          timeout: self.timeout,
        });
      }
      thread::sleep(POLL_INTERVAL);
    }
  }
}

impl MeshOptimizer for ExternalOptimizer {
  fn optimize(&self, input: &Path, output: &Path) -> Result<OptimizerOutput, OptimizerError> {
    info!(
      "running optimizer: {} {} {}",
      self.program.display(),
      input.display(),
      output.display()
    );

    let start = Instant::now();
    let mut child = Command::new(&self.program)
      .arg(input)
      .arg(output)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|e| OptimizerError::Spawn {
        program: self.program.clone(),
        source: e,
      })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = self.wait_with_timeout(&mut child);
    let stdout = collect(stdout, DRAIN_GRACE);
    let stderr = collect(stderr, DRAIN_GRACE);
    let status = status?;
    let elapsed = start.elapsed();

    if !stdout.is_empty() {
      debug!("optimizer stdout: {}", stdout.trim_end());
    }

    if !status.success() {
      warn!("optimizer failed with {}", status);
      return Err(OptimizerError::Failed {
        code: status.code(),
        stderr,
      });
    }

    if !output.exists() {
      return Err(OptimizerError::MissingOutput(output.to_path_buf()));
    }

    info!("optimizer finished in {:.2?}", elapsed);
    Ok(OptimizerOutput {
      stdout,
      stderr,
      elapsed,
    })
  }
}

/// Reads a pipe to its end on a detached thread.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<String> {
  let (tx, rx) = async_channel::bounded(1);
  thread::spawn(move || {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    // The receiver is gone if collection gave up.
    let _ = tx.send_blocking(String::from_utf8_lossy(&buf).into_owned());
  });
  rx
}

/// Waits up to `grace` for a drained pipe. A reader still blocked after that
/// is left behind and exits once the last writer closes the pipe.
fn collect(output: Option<Receiver<String>>, grace: Duration) -> String {
  let Some(rx) = output else {
    return String::new();
  };
  let start = Instant::now();
  loop {
    match rx.try_recv() {
      Ok(text) => return text,
      Err(TryRecvError::Closed) => return String::new(),
      Err(TryRecvError::Empty) if start.elapsed() >= grace => {
        debug!("optimizer output still open after exit, not waiting for it");
        return String::new();
      }
      Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(1)),
    }
  }
}

/// Error running the optimizer. All variants are recoverable: the caller
/// falls back to the un-optimized mesh.
#[derive(Debug)]
pub enum OptimizerError {
  Spawn {
    program: PathBuf,
    source: std::io::Error,
  },
  Wait(std::io::Error),
  TimedOut {
    timeout: Duration,
  },
  /// Nonzero exit. `code` is `None` if the process was killed by a signal.
  Failed {
    code: Option<i32>,
    stderr: String,
  },
  MissingOutput(PathBuf),
}

impl std::fmt::Display for OptimizerError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Spawn { program, source } => {
        write!(f, "failed to start {}: {}", program.display(), source)
      }
      Self::Wait(e) => write!(f, "failed to wait for optimizer: {}", e),
      Self::TimedOut { timeout } => write!(f, "optimizer timed out after {:?}", timeout),
      Self::Failed { code, stderr } => {
        match code {
          Some(code) => write!(f, "optimizer exited with code {}", code)?,
          None => write!(f, "optimizer was terminated by a signal")?,
        }
        if !stderr.trim().is_empty() {
          write!(f, ": {}", stderr.trim())?;
        }
        Ok(())
      }
      Self::MissingOutput(path) => {
        write!(f, "optimizer succeeded but did not write {}", path.display())
      }
    }
  }
}

impl std::error::Error for OptimizerError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Spawn { source, .. } => Some(source),
      Self::Wait(e) => Some(e),
      _ => None,
    }
  }
}
