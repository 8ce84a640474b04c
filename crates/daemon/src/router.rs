use crate::protocol::{RpcRequest, RpcResponse};
use crate::registry::{EmbedderCache, ProjectCache};
use crate::server::ShutdownHandle;
use amanmcp_core::validation::{optional_bool, optional_string_array, optional_u64, require_string};
use amanmcp_core::{Error, ErrorKind, Language};
use search::{ContentTypeFilter, SearchOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Dispatches the three ops the wire contract names: `status`, `search`,
/// `shutdown`. Each open project's engine and each loaded embedder are
/// cached in `ProjectCache`/`EmbedderCache` rather than reopened per request.
pub struct Router {
  projects: Arc<ProjectCache>,
  embedders: Arc<EmbedderCache>,
  socket_path: PathBuf,
  started_at: Instant,
  shutdown_handle: Mutex<Option<ShutdownHandle>>,
  last_request: Arc<Mutex<Instant>>,
}

impl Router {
  pub fn new(projects: Arc<ProjectCache>, embedders: Arc<EmbedderCache>, socket_path: PathBuf) -> Self {
    Self {
      projects,
      embedders,
      socket_path,
      started_at: Instant::now(),
      shutdown_handle: Mutex::new(None),
      last_request: Arc::new(Mutex::new(Instant::now())),
    }
  }

  pub async fn set_shutdown_handle(&self, handle: ShutdownHandle) {
    *self.shutdown_handle.lock().await = Some(handle);
  }

  /// Timestamp of the last request this router finished handling, used by
  /// the idle-shutdown ticker.
  pub fn last_request_handle(&self) -> Arc<Mutex<Instant>> {
    Arc::clone(&self.last_request)
  }

  pub async fn handle(&self, request: RpcRequest) -> RpcResponse {
    debug!(op = %request.op, "handling daemon request");
    let response = match request.op.as_str() {
      "status" => self.handle_status().await,
      "search" => self.handle_search(request.params).await,
      "shutdown" => self.handle_shutdown().await,
      other => {
        warn!(op = %other, "unknown daemon op");
        RpcResponse::from(Error::new(ErrorKind::InvalidInput, format!("unknown op: {other}")))
      }
    };
    *self.last_request.lock().await = Instant::now();
    response
  }

  async fn handle_status(&self) -> RpcResponse {
    let (embedder_type, embedder_status) = self.embedders.summary().await;
    RpcResponse::success(serde_json::json!({
      "pid": std::process::id(),
      "uptime_secs": self.started_at.elapsed().as_secs(),
      "embedder_type": embedder_type,
      "embedder_status": embedder_status,
      "projects_loaded": self.projects.len().await,
      "socket_path": self.socket_path.display().to_string(),
    }))
  }

  async fn handle_search(&self, params: serde_json::Value) -> RpcResponse {
    match self.run_search(params).await {
      Ok(hits) => RpcResponse::success(hits),
      Err(e) => RpcResponse::from(e),
    }
  }

  async fn run_search(&self, params: serde_json::Value) -> Result<serde_json::Value, Error> {
    let query = require_string(params.get("query"), "query").map_err(|e| Error::new(ErrorKind::InvalidInput, e.to_string()))?;
    let root_path =
      require_string(params.get("root_path"), "root_path").map_err(|e| Error::new(ErrorKind::InvalidPath, e.to_string()))?;

    let limit = optional_u64(params.get("limit"), "limit")
      .map_err(|e| Error::new(ErrorKind::InvalidInput, e.to_string()))?
      .unwrap_or(10) as usize;
    let bm25_only = optional_bool(params.get("bm25_only"), "bm25_only")
      .map_err(|e| Error::new(ErrorKind::InvalidInput, e.to_string()))?
      .unwrap_or(false);
    let explain = optional_bool(params.get("explain"), "explain")
      .map_err(|e| Error::new(ErrorKind::InvalidInput, e.to_string()))?
      .unwrap_or(false);
    let scopes = optional_string_array(params.get("scopes"), "scopes")
      .map_err(|e| Error::new(ErrorKind::InvalidInput, e.to_string()))?;
    let content_type_filter = match params.get("filter") {
      Some(v) if !v.is_null() => serde_json::from_value::<ContentTypeFilter>(v.clone())
        .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("filter: {e}")))?,
      _ => ContentTypeFilter::All,
    };
    let language = match params.get("language") {
      Some(v) if !v.is_null() => {
        Some(serde_json::from_value::<Language>(v.clone()).map_err(|e| Error::new(ErrorKind::InvalidInput, format!("language: {e}")))?)
      }
      _ => None,
    };

    let options = SearchOptions { limit, content_type_filter, language, scopes, bm25_only, explain };

    let engine = self.projects.get_or_open(std::path::Path::new(&root_path)).await?;
    let response = engine.search_with_telemetry(&query, &options).await?;
    Ok(serde_json::to_value(response.hits).expect("Hit serializes"))
  }

  async fn handle_shutdown(&self) -> RpcResponse {
    let guard = self.shutdown_handle.lock().await;
    match guard.as_ref() {
      Some(handle) => {
        handle.shutdown();
        RpcResponse::success(serde_json::json!({"ok": true}))
      }
      None => RpcResponse::from(Error::new(ErrorKind::Internal, "shutdown handle not installed")),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use amanmcp_core::EmbedderVariant;
  use tempfile::TempDir;

  fn router_with_data_dir(data_dir: PathBuf) -> Router {
    let embedders = Arc::new(EmbedderCache::new());
    let projects = Arc::new(ProjectCache::new(data_dir, 8, Arc::clone(&embedders)));
    Router::new(projects, embedders, PathBuf::from("/tmp/test.sock"))
  }

  #[tokio::test]
  async fn status_reports_zero_projects_before_any_search() {
    let data = TempDir::new().unwrap();
    let router = router_with_data_dir(data.path().to_path_buf());
    let response = router.handle(RpcRequest { op: "status".to_string(), params: serde_json::json!({}) }).await;
    assert!(response.ok);
    assert_eq!(response.result.unwrap()["projects_loaded"], 0);
  }

  #[tokio::test]
  async fn search_finds_indexed_project() {
    let project = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    std::fs::write(project.path().join("a.rs"), "/// Validates input\npub fn validate(x: i32) -> bool { x > 0 }\n").unwrap();
    let mut config = amanmcp_core::Config::default();
    config.embedding.variant = EmbedderVariant::Static;
    pipeline::run_once(project.path(), data.path(), config).await.unwrap();

    let router = router_with_data_dir(data.path().to_path_buf());
    let params = serde_json::json!({"query": "validate", "root_path": project.path().to_string_lossy()});
    let response = router.handle(RpcRequest { op: "search".to_string(), params }).await;
    assert!(response.ok, "{:?}", response.error);
    assert!(!response.result.unwrap().as_array().unwrap().is_empty());
  }

  #[tokio::test]
  async fn unknown_op_is_rejected() {
    let data = TempDir::new().unwrap();
    let router = router_with_data_dir(data.path().to_path_buf());
    let response = router.handle(RpcRequest { op: "frobnicate".to_string(), params: serde_json::json!({}) }).await;
    assert!(!response.ok);
    assert_eq!(response.error.unwrap().code, "invalid_input");
  }

  #[tokio::test]
  async fn shutdown_without_installed_handle_fails_cleanly() {
    let data = TempDir::new().unwrap();
    let router = router_with_data_dir(data.path().to_path_buf());
    let response = router.handle(RpcRequest { op: "shutdown".to_string(), params: serde_json::json!({}) }).await;
    assert!(!response.ok);
  }
}
