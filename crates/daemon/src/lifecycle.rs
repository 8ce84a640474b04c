use crate::registry::{EmbedderCache, ProjectCache};
use crate::router::Router;
use crate::server::{Client, Server, ShutdownHandle, default_socket_path};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum LifecycleError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("server error: {0}")]
  Server(#[from] crate::server::ServerError),
}

/// Runtime configuration for starting a daemon process. Idle/cache-size
/// policy is read from `amanmcp_core::DaemonConfig`; the rest is resolved
/// at process start rather than persisted.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
  pub socket_path: PathBuf,
  pub data_dir: PathBuf,
  pub idle_timeout_secs: u64,
  pub max_projects_cached: usize,
}

impl Default for DaemonConfig {
  fn default() -> Self {
    let core = amanmcp_core::DaemonConfig::default();
    Self {
      socket_path: core.socket_path.unwrap_or_else(default_socket_path),
      data_dir: amanmcp_core::default_data_dir(),
      idle_timeout_secs: core.idle_timeout_secs,
      max_projects_cached: core.max_projects_cached,
    }
  }
}

/// Owns the daemon's running state: the project/embedder caches, the
/// listening socket, and the idle-shutdown ticker.
pub struct Daemon {
  config: DaemonConfig,
  shutdown: Option<ShutdownHandle>,
}

impl Daemon {
  pub fn new(config: DaemonConfig) -> Self {
    Self { config, shutdown: None }
  }

  pub async fn run(&mut self) -> Result<(), LifecycleError> {
    info!(socket = %self.config.socket_path.display(), data_dir = %self.config.data_dir.display(), "starting daemon");

    let embedders = Arc::new(EmbedderCache::new());
    let projects = Arc::new(ProjectCache::new(
      self.config.data_dir.clone(),
      self.config.max_projects_cached,
      Arc::clone(&embedders),
    ));
    let router = Arc::new(Router::new(Arc::clone(&projects), embedders, self.config.socket_path.clone()));

    let server = Server::new(Arc::clone(&router), self.config.socket_path.clone());
    let shutdown = server.shutdown_handle();
    self.shutdown = Some(shutdown.clone());
    router.set_shutdown_handle(shutdown.clone()).await;

    write_pid_file()?;
    spawn_signal_handlers(shutdown.clone());
    spawn_idle_ticker(router.last_request_handle(), shutdown.clone(), self.config.idle_timeout_secs);

    let result = server.run().await;
    projects.close_all().await;
    remove_pid_file();
    result?;

    info!("daemon shutdown complete");
    Ok(())
  }

  pub fn shutdown(&self) {
    if let Some(ref handle) = self.shutdown {
      handle.shutdown();
    }
  }
}

fn spawn_signal_handlers(shutdown: ShutdownHandle) {
  tokio::spawn(async move {
    let mut term = match signal(SignalKind::terminate()) {
      Ok(s) => s,
      Err(e) => {
        warn!(error = %e, "failed to install SIGTERM handler");
        return;
      }
    };
    tokio::select! {
      _ = term.recv() => info!("received SIGTERM, shutting down"),
      _ = tokio::signal::ctrl_c() => info!("received ctrl-c, shutting down"),
    }
    shutdown.shutdown();
  });
}

/// Every `tick` interval, shuts the daemon down if no request has completed
/// in the last `idle_timeout_secs`. A zero timeout disables this entirely.
fn spawn_idle_ticker(last_request: Arc<Mutex<Instant>>, shutdown: ShutdownHandle, idle_timeout_secs: u64) {
  if idle_timeout_secs == 0 {
    return;
  }
  let idle_timeout = Duration::from_secs(idle_timeout_secs);
  let tick = Duration::from_secs(idle_timeout_secs.min(60).max(1));
  tokio::spawn(async move {
    loop {
      tokio::time::sleep(tick).await;
      let elapsed = last_request.lock().await.elapsed();
      if elapsed >= idle_timeout {
        info!(idle_secs = elapsed.as_secs(), "idle timeout reached, shutting down");
        shutdown.shutdown();
        break;
      }
    }
  });
}

/// True if a socket is listening and accepting connections at `socket_path`.
pub fn is_running(socket_path: &std::path::Path) -> bool {
  std::os::unix::net::UnixStream::connect(socket_path).is_ok()
}

pub fn pid_file_path() -> PathBuf {
  if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
    PathBuf::from(runtime_dir).join("amanmcp").join("daemon.pid")
  } else {
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/amanmcp-{uid}")).join("daemon.pid")
  }
}

fn write_pid_file() -> std::io::Result<()> {
  let path = pid_file_path();
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(&path, std::process::id().to_string())
}

pub fn remove_pid_file() {
  let _ = std::fs::remove_file(pid_file_path());
}

/// Reads the PID file and checks liveness via signal 0.
pub fn running_pid() -> Option<i32> {
  let content = std::fs::read_to_string(pid_file_path()).ok()?;
  let pid: i32 = content.trim().parse().ok()?;
  let alive = unsafe { libc::kill(pid, 0) == 0 };
  alive.then_some(pid)
}

/// Sends SIGTERM, then SIGKILL if the process hasn't exited within `timeout`.
pub async fn stop(pid: i32, timeout: Duration) -> bool {
  unsafe {
    libc::kill(pid, libc::SIGTERM);
  }
  let deadline = Instant::now() + timeout;
  while Instant::now() < deadline {
    if unsafe { libc::kill(pid, 0) } != 0 {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
  }
  unsafe {
    libc::kill(pid, libc::SIGKILL);
  }
  false
}

/// Re-execs the current binary with `--foreground`, detached into a new
/// session, then polls the socket for readiness (racing against the child
/// exiting early, which would mean startup failed).
pub async fn spawn_background(socket_path: &std::path::Path, ready_timeout: Duration) -> Result<(), LifecycleError> {
  use std::os::unix::process::CommandExt;

  let exe = std::env::current_exe()?;
  let mut command = std::process::Command::new(exe);
  command.arg("daemon").arg("start").arg("--foreground");
  command.stdin(std::process::Stdio::null());
  command.stdout(std::process::Stdio::null());
  command.stderr(std::process::Stdio::null());
  unsafe {
    command.pre_exec(|| {
      libc::setsid();
      Ok(())
    });
  }
  let mut child = command.spawn()?;

  let deadline = Instant::now() + ready_timeout;
  loop {
    if let Ok(Some(status)) = child.try_wait() {
      return Err(LifecycleError::Io(std::io::Error::other(format!(
        "daemon exited during startup with status {status}"
      ))));
    }
    if Client::connect_to(socket_path).await.is_ok() {
      return Ok(());
    }
    if Instant::now() >= deadline {
      return Err(LifecycleError::Io(std::io::Error::other("daemon did not become ready in time")));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_config_reads_core_daemon_config() {
    let config = DaemonConfig::default();
    assert_eq!(config.idle_timeout_secs, 1800);
    assert_eq!(config.max_projects_cached, 8);
  }

  #[test]
  fn is_running_false_for_missing_socket() {
    let dir = tempfile::TempDir::new().unwrap();
    assert!(!is_running(&dir.path().join("nonexistent.sock")));
  }

  #[test]
  fn running_pid_none_without_pid_file() {
    unsafe {
      std::env::set_var("XDG_RUNTIME_DIR", format!("/tmp/amanmcp-lifecycle-test-{}", std::process::id()));
    }
    let _ = std::fs::remove_file(pid_file_path());
    assert!(running_pid().is_none());
  }
}
