// Watcher coordination - lock files and process management.
//
// Ensures only one watcher runs per project:
// - Lock files at <data_dir>/watchers/<hash>.lock
// - Stale lock detection via process-alive check
// - Activity tracking for health monitoring

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CoordinationError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
  #[error("Lock held by process {0}")]
  LockHeld(u32),
  #[error("Lock file corrupted")]
  CorruptedLock,
}

/// Lock file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherLock {
  pub project_id: String,
  pub project_path: String,
  pub pid: u32,
  pub started_at: u64,
  pub last_activity: u64,
  pub indexed_files: u32,
}

impl WatcherLock {
  pub fn new(project_id: &str, project_path: &str) -> Self {
    let now = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs();

    Self {
      project_id: project_id.to_string(),
      project_path: project_path.to_string(),
      pid: std::process::id(),
      started_at: now,
      last_activity: now,
      indexed_files: 0,
    }
  }
}

/// Coordinates watcher lock files across processes for one data directory.
pub struct WatcherCoordinator {
  locks_dir: PathBuf,
}

impl WatcherCoordinator {
  /// Create a coordinator rooted at `<base_dir>/watchers`. `base_dir` is the
  /// caller-supplied base data directory (see `amanmcp_core::default_data_dir`).
  pub fn new(base_dir: &Path) -> Self {
    Self {
      locks_dir: base_dir.join("watchers"),
    }
  }

  /// Create a coordinator with a custom locks directory (for testing).
  pub fn with_locks_dir(locks_dir: PathBuf) -> Self {
    Self { locks_dir }
  }

  pub fn lock_path(&self, project_path: &Path) -> PathBuf {
    let hash = project_hash(project_path);
    self.locks_dir.join(format!("{}.lock", hash))
  }

  /// Returns Ok(true) if the lock was acquired, Ok(false) if already held
  /// by a live process.
  pub fn try_acquire(&self, project_id: &str, project_path: &Path) -> Result<bool, CoordinationError> {
    fs::create_dir_all(&self.locks_dir)?;

    let lock_path = self.lock_path(project_path);

    if lock_path.exists() {
      match self.read_lock(&lock_path) {
        Ok(existing) => {
          if is_process_running(existing.pid) {
            debug!("Lock held by process {} for project {}", existing.pid, existing.project_path);
            return Ok(false);
          }
          info!("Cleaning up stale lock from dead process {}", existing.pid);
          fs::remove_file(&lock_path)?;
        }
        Err(e) => {
          warn!("Corrupted lock file, removing: {}", e);
          fs::remove_file(&lock_path)?;
        }
      }
    }

    let lock = WatcherLock::new(project_id, &project_path.to_string_lossy());
    self.write_lock(&lock_path, &lock)?;

    info!("Acquired watcher lock for project: {}", project_path.display());
    Ok(true)
  }

  pub fn release(&self, project_path: &Path) -> Result<(), CoordinationError> {
    let lock_path = self.lock_path(project_path);

    if lock_path.exists() {
      if let Ok(lock) = self.read_lock(&lock_path) {
        if lock.pid == std::process::id() {
          fs::remove_file(&lock_path)?;
          info!("Released watcher lock for project: {}", project_path.display());
        } else {
          warn!(
            "Not releasing lock owned by different process {} (we are {})",
            lock.pid,
            std::process::id()
          );
        }
      }
    }

    Ok(())
  }

  pub fn update_activity(&self, project_path: &Path, indexed_files: u32) -> Result<(), CoordinationError> {
    let lock_path = self.lock_path(project_path);

    if !lock_path.exists() {
      return Ok(());
    }

    let mut lock = self.read_lock(&lock_path)?;

    if lock.pid != std::process::id() {
      return Ok(());
    }

    lock.last_activity = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    lock.indexed_files = indexed_files;

    self.write_lock(&lock_path, &lock)?;
    Ok(())
  }

  pub fn is_running(&self, project_path: &Path) -> Result<bool, CoordinationError> {
    let lock_path = self.lock_path(project_path);

    if !lock_path.exists() {
      return Ok(false);
    }

    let lock = self.read_lock(&lock_path)?;
    Ok(is_process_running(lock.pid))
  }

  pub fn get_lock(&self, project_path: &Path) -> Result<Option<WatcherLock>, CoordinationError> {
    let lock_path = self.lock_path(project_path);

    if !lock_path.exists() {
      return Ok(None);
    }

    let lock = self.read_lock(&lock_path)?;
    if is_process_running(lock.pid) { Ok(Some(lock)) } else { Ok(None) }
  }

  pub fn list_active(&self) -> Result<Vec<WatcherLock>, CoordinationError> {
    if !self.locks_dir.exists() {
      return Ok(Vec::new());
    }

    let mut active = Vec::new();

    for entry in fs::read_dir(&self.locks_dir)? {
      let entry = entry?;
      let path = entry.path();

      if path.extension().map(|e| e == "lock").unwrap_or(false) {
        match self.read_lock(&path) {
          Ok(lock) => {
            if is_process_running(lock.pid) {
              active.push(lock);
            } else {
              debug!("Removing stale lock: {:?}", path);
              let _ = fs::remove_file(&path);
            }
          }
          Err(e) => {
            warn!("Failed to read lock {:?}: {}", path, e);
            let _ = fs::remove_file(&path);
          }
        }
      }
    }

    Ok(active)
  }

  /// Stop a watcher by sending SIGTERM, escalating to SIGKILL if it hasn't
  /// exited after a short grace period.
  pub fn stop_watcher(&self, project_path: &Path) -> Result<bool, CoordinationError> {
    let lock_path = self.lock_path(project_path);

    if !lock_path.exists() {
      return Ok(false);
    }

    let lock = self.read_lock(&lock_path)?;

    if !is_process_running(lock.pid) {
      fs::remove_file(&lock_path)?;
      return Ok(false);
    }

    if terminate_process(lock.pid) {
      std::thread::sleep(Duration::from_millis(500));

      if is_process_running(lock.pid) {
        kill_process(lock.pid);
        std::thread::sleep(Duration::from_millis(100));
      }

      let _ = fs::remove_file(&lock_path);
      info!("Stopped watcher for project: {}", project_path.display());
      Ok(true)
    } else {
      Ok(false)
    }
  }

  fn read_lock(&self, path: &Path) -> Result<WatcherLock, CoordinationError> {
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(serde_json::from_str(&contents)?)
  }

  fn write_lock(&self, path: &Path, lock: &WatcherLock) -> Result<(), CoordinationError> {
    let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;

    let contents = serde_json::to_string_pretty(lock)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;

    Ok(())
  }
}

fn project_hash(path: &Path) -> String {
  let mut hasher = Sha256::new();
  hasher.update(path.to_string_lossy().as_bytes());
  let hash = hasher.finalize();
  hex::encode(&hash[..8])
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
  unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(windows)]
fn is_process_running(pid: u32) -> bool {
  use windows_sys::Win32::Foundation::{CloseHandle, STILL_ACTIVE};
  use windows_sys::Win32::System::Threading::{GetExitCodeProcess, OpenProcess, PROCESS_QUERY_INFORMATION};

  unsafe {
    let handle = OpenProcess(PROCESS_QUERY_INFORMATION, 0, pid);
    if handle.is_null() {
      return false;
    }
    let mut exit_code = 0;
    let result = GetExitCodeProcess(handle, &mut exit_code);
    CloseHandle(handle);
    result != 0 && exit_code == STILL_ACTIVE
  }
}

#[cfg(not(any(unix, windows)))]
fn is_process_running(_pid: u32) -> bool {
  true
}

#[cfg(unix)]
fn terminate_process(pid: u32) -> bool {
  unsafe { libc::kill(pid as i32, libc::SIGTERM) == 0 }
}

#[cfg(windows)]
fn terminate_process(pid: u32) -> bool {
  use windows_sys::Win32::Foundation::CloseHandle;
  use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_TERMINATE, TerminateProcess as WinTerminate};

  unsafe {
    let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
    if handle.is_null() {
      return false;
    }
    let result = WinTerminate(handle, 1) != 0;
    CloseHandle(handle);
    result
  }
}

#[cfg(not(any(unix, windows)))]
fn terminate_process(_pid: u32) -> bool {
  false
}

#[cfg(unix)]
fn kill_process(pid: u32) -> bool {
  unsafe { libc::kill(pid as i32, libc::SIGKILL) == 0 }
}

#[cfg(windows)]
fn kill_process(pid: u32) -> bool {
  terminate_process(pid)
}

#[cfg(not(any(unix, windows)))]
fn kill_process(_pid: u32) -> bool {
  false
}
