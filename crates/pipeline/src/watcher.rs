use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, channel};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum WatchError {
  #[error("Notify error: {0}")]
  Notify(#[from] notify::Error),
  #[error("Channel receive error")]
  ChannelRecv,
}

/// Type of file change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
  Created,
  Modified,
  Deleted,
  Renamed,
}

/// A file change event.
#[derive(Debug, Clone)]
pub struct FileChange {
  pub path: PathBuf,
  pub kind: ChangeKind,
}

/// Filesystem watcher over one project root.
pub struct FileWatcher {
  _watcher: RecommendedWatcher,
  receiver: Receiver<Result<Event, notify::Error>>,
  root: PathBuf,
}

impl FileWatcher {
  pub fn new(root: &Path) -> Result<Self, WatchError> {
    Self::with_poll_interval(root, Duration::from_secs(2))
  }

  pub fn with_poll_interval(root: &Path, poll_interval: Duration) -> Result<Self, WatchError> {
    let (tx, rx) = channel();

    let config = Config::default().with_poll_interval(poll_interval);

    let mut watcher = RecommendedWatcher::new(
      move |res| {
        let _ = tx.send(res);
      },
      config,
    )?;

    watcher.watch(root, RecursiveMode::Recursive)?;

    Ok(Self {
      _watcher: watcher,
      receiver: rx,
      root: root.to_path_buf(),
    })
  }

  pub fn with_poll_interval_ms(root: &Path, poll_ms: u64) -> Result<Self, WatchError> {
    Self::with_poll_interval(root, Duration::from_millis(poll_ms))
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Poll for the next file change event (non-blocking).
  pub fn poll(&self) -> Option<FileChange> {
    match self.receiver.try_recv() {
      Ok(Ok(event)) => self.process_event(event),
      Ok(Err(e)) => {
        warn!("Watch error: {}", e);
        None
      }
      Err(_) => None,
    }
  }

  pub fn wait(&self) -> Result<FileChange, WatchError> {
    loop {
      match self.receiver.recv() {
        Ok(Ok(event)) => {
          if let Some(change) = self.process_event(event) {
            return Ok(change);
          }
        }
        Ok(Err(e)) => {
          warn!("Watch error: {}", e);
          return Err(WatchError::Notify(e));
        }
        Err(_) => return Err(WatchError::ChannelRecv),
      }
    }
  }

  pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<FileChange>, WatchError> {
    match self.receiver.recv_timeout(timeout) {
      Ok(Ok(event)) => Ok(self.process_event(event)),
      Ok(Err(e)) => {
        warn!("Watch error: {}", e);
        Err(WatchError::Notify(e))
      }
      Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Ok(None),
      Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => Err(WatchError::ChannelRecv),
    }
  }

  pub fn collect_pending(&self) -> Vec<FileChange> {
    let mut changes = Vec::new();
    while let Some(change) = self.poll() {
      changes.push(change);
    }
    changes
  }

  fn process_event(&self, event: Event) -> Option<FileChange> {
    let path = event.paths.first()?.clone();

    if path.is_dir() {
      return None;
    }

    let kind = match event.kind {
      EventKind::Create(_) => ChangeKind::Created,
      EventKind::Modify(_) => ChangeKind::Modified,
      EventKind::Remove(_) => ChangeKind::Deleted,
      EventKind::Any => {
        debug!("Ignoring Any event for {:?}", path);
        return None;
      }
      EventKind::Access(_) => {
        debug!("Ignoring Access event for {:?}", path);
        return None;
      }
      EventKind::Other => {
        debug!("Ignoring Other event for {:?}", path);
        return None;
      }
    };

    Some(FileChange { path, kind })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  #[test]
  fn test_watcher_creation() {
    let dir = TempDir::new().unwrap();
    let watcher = FileWatcher::new(dir.path());
    assert!(watcher.is_ok());
  }

  #[test]
  fn test_watcher_detects_create() {
    let dir = TempDir::new().unwrap();
    let watcher = FileWatcher::new(dir.path()).unwrap();

    let file_path = dir.path().join("test.rs");
    fs::write(&file_path, "fn main() {}").unwrap();

    std::thread::sleep(Duration::from_millis(100));

    let changes = watcher.collect_pending();

    let has_create_or_modify = changes
      .iter()
      .any(|c| c.path == file_path && (c.kind == ChangeKind::Created || c.kind == ChangeKind::Modified));

    assert!(
      has_create_or_modify || changes.is_empty(),
      "expected create/modify event or empty (due to timing)"
    );
  }

  #[test]
  fn test_change_kind_equality() {
    assert_eq!(ChangeKind::Created, ChangeKind::Created);
    assert_ne!(ChangeKind::Created, ChangeKind::Modified);
  }
}
