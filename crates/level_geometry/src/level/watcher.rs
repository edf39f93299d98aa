//! Level source file watcher.
//!
//! A background thread polls the level file's modification time and raises a
//! dirty flag when it changes. The main thread reads and clears the flag; the
//! watcher never touches level data itself.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use bevy::log::{debug, info};

/// Upper bound on how long `stop` waits for the thread to notice the stop
/// flag.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(20);

/// Polls a file's mtime on a fixed interval.
pub struct LevelFileWatcher {
  path: PathBuf,
  dirty: Arc<AtomicBool>,
  stop: Arc<AtomicBool>,
  handle: Option<JoinHandle<()>>,
}

impl LevelFileWatcher {
  /// Starts watching `path`.
  pub fn spawn(path: impl Into<PathBuf>, poll_interval: Duration) -> std::io::Result<Self> {
    let path = path.into();
    let dirty = Arc::new(AtomicBool::new(false));
    let stop = Arc::new(AtomicBool::new(false));

    let mut last = modified(&path);
    let handle = {
      let path = path.clone();
      let dirty = Arc::clone(&dirty);
      let stop = Arc::clone(&stop);
      thread::Builder::new()
        .name("level-watcher".to_string())
        .spawn(move || {
          while !stop.load(Ordering::Acquire) {
            sleep_unless_stopped(poll_interval, &stop);
            let current = modified(&path);
            if current.is_some() && current != last {
              debug!("{} changed on disk", path.display());
              last = current;
              dirty.store(true, Ordering::Release);
            }
          }
        })?
    };

    info!("watching {} every {:?}", path.display(), poll_interval);
    Ok(Self {
      path,
      dirty,
      stop,
      handle: Some(handle),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty.load(Ordering::Acquire)
  }

  /// Returns the dirty flag and clears it.
  pub fn take_dirty(&self) -> bool {
    self.dirty.swap(false, Ordering::AcqRel)
  }

  pub fn is_running(&self) -> bool {
    self.handle.as_ref().is_some_and(|h| !h.is_finished())
  }

  /// Signals the thread to stop and waits for it.
  pub fn stop(&mut self) {
    self.stop.store(true, Ordering::Release);
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

impl Drop for LevelFileWatcher {
  fn drop(&mut self) {
    self.stop();
  }
}

fn modified(path: &Path) -> Option<SystemTime> {
  std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
  let mut remaining = total;
  while !remaining.is_zero() && !stop.load(Ordering::Acquire) {
    let step = remaining.min(STOP_CHECK_INTERVAL);
    thread::sleep(step);
    remaining -= step;
  }
}
