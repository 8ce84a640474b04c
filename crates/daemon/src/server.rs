use crate::protocol::{RpcRequest, RpcResponse};
use crate::router::Router;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ServerError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

/// Default socket path: `${XDG_RUNTIME_DIR}/amanmcp/daemon.sock`, falling
/// back to a uid-scoped path under `/tmp` when no runtime dir is set.
pub fn default_socket_path() -> PathBuf {
  if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
    PathBuf::from(runtime_dir).join("amanmcp").join("daemon.sock")
  } else {
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/amanmcp-{uid}")).join("daemon.sock")
  }
}

/// Unix socket server accepting one line-delimited JSON request per
/// connection round-trip.
pub struct Server {
  socket_path: PathBuf,
  router: Arc<Router>,
  shutdown_tx: broadcast::Sender<()>,
}

impl Server {
  pub fn new(router: Arc<Router>, socket_path: PathBuf) -> Self {
    let (shutdown_tx, _) = broadcast::channel(1);
    Self { socket_path, router, shutdown_tx }
  }

  pub fn shutdown_handle(&self) -> ShutdownHandle {
    ShutdownHandle { tx: self.shutdown_tx.clone() }
  }

  pub fn socket_path(&self) -> &Path {
    &self.socket_path
  }

  /// Binds the socket (removing a stale file first), serves connections
  /// until a shutdown signal arrives, then removes the socket file again.
  pub async fn run(&self) -> Result<(), ServerError> {
    if self.socket_path.exists() {
      std::fs::remove_file(&self.socket_path)?;
    }
    if let Some(parent) = self.socket_path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(&self.socket_path)?;
    set_owner_only_permissions(&self.socket_path)?;
    info!(socket = %self.socket_path.display(), "daemon listening");

    let mut shutdown_rx = self.shutdown_tx.subscribe();
    loop {
      tokio::select! {
        result = listener.accept() => {
          match result {
            Ok((stream, _)) => {
              let router = Arc::clone(&self.router);
              tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, router).await {
                  error!(error = %e, "connection error");
                }
              });
            }
            Err(e) => error!(error = %e, "accept error"),
          }
        }
        _ = shutdown_rx.recv() => {
          info!("shutdown signal received");
          break;
        }
      }
    }

    if self.socket_path.exists() {
      std::fs::remove_file(&self.socket_path)?;
    }
    Ok(())
  }
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<(), ServerError> {
  use std::os::unix::fs::PermissionsExt;
  let permissions = std::fs::Permissions::from_mode(0o600);
  std::fs::set_permissions(path, permissions)?;
  Ok(())
}

#[derive(Clone)]
pub struct ShutdownHandle {
  tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
  pub fn shutdown(&self) {
    let _ = self.tx.send(());
  }
}

async fn handle_connection(stream: UnixStream, router: Arc<Router>) -> Result<(), ServerError> {
  let (reader, mut writer) = stream.into_split();
  let mut reader = BufReader::new(reader);
  let mut line = String::new();

  loop {
    line.clear();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
      debug!("client disconnected");
      break;
    }

    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    let request: RpcRequest = match serde_json::from_str(trimmed) {
      Ok(r) => r,
      Err(e) => {
        warn!(error = %e, "invalid request JSON");
        let response = RpcResponse::failure(crate::protocol::RpcError {
          code: "invalid_input".to_string(),
          message: format!("parse error: {e}"),
          retryable: false,
          suggestion: None,
        });
        write_response(&mut writer, &response).await?;
        continue;
      }
    };

    let response = router.handle(request).await;
    write_response(&mut writer, &response).await?;
  }

  Ok(())
}

async fn write_response(
  writer: &mut (impl AsyncWriteExt + Unpin),
  response: &RpcResponse,
) -> Result<(), ServerError> {
  let json = serde_json::to_string(response)?;
  writer.write_all(json.as_bytes()).await?;
  writer.write_all(b"\n").await?;
  writer.flush().await?;
  Ok(())
}

/// Thin client used by the CLI to talk to a running daemon.
pub struct Client {
  stream: UnixStream,
}

impl Client {
  pub async fn connect() -> Result<Self, ServerError> {
    Self::connect_to(&default_socket_path()).await
  }

  pub async fn connect_to(socket_path: &Path) -> Result<Self, ServerError> {
    let stream = UnixStream::connect(socket_path).await?;
    Ok(Self { stream })
  }

  pub async fn call(&mut self, op: &str, params: serde_json::Value) -> Result<RpcResponse, ServerError> {
    let (reader, mut writer) = self.stream.split();
    let request = RpcRequest { op: op.to_string(), params };
    let json = serde_json::to_string(&request)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Ok(serde_json::from_str(&line)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::registry::{EmbedderCache, ProjectCache};
  use tempfile::TempDir;

  #[test]
  fn default_socket_path_is_scoped_to_amanmcp() {
    let path = default_socket_path();
    assert!(path.to_string_lossy().contains("amanmcp"));
  }

  #[tokio::test]
  async fn server_client_roundtrip() {
    let data = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("test.sock");

    let embedders = Arc::new(EmbedderCache::new());
    let projects = Arc::new(ProjectCache::new(data.path().to_path_buf(), 8, embedders.clone()));
    let router = Arc::new(Router::new(projects, embedders, socket_path.clone()));
    let server = Server::new(router, socket_path.clone());
    let shutdown = server.shutdown_handle();

    let server_handle = tokio::spawn(async move { server.run().await });
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    let mut client = Client::connect_to(&socket_path).await.unwrap();
    let response = client.call("status", serde_json::json!({})).await.unwrap();
    assert!(response.ok);

    shutdown.shutdown();
    let _ = server_handle.await;
  }
}
