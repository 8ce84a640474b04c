//! Caches kept by a running daemon: one embedder per distinct
//! `(provider, model)` pair, and one open search engine per project root.

use amanmcp_core::{Config, ProjectId};
use embedding::Embedder;
use search::SearchEngine;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

fn embedder_key(config: &amanmcp_core::config::EmbeddingConfig) -> String {
  match config.variant {
    amanmcp_core::EmbedderVariant::Local => format!("local:{}", config.model),
    amanmcp_core::EmbedderVariant::Remote => format!("remote:{}:{}", config.remote_url, config.model),
    amanmcp_core::EmbedderVariant::Static => "static".to_string(),
  }
}

/// Keeps at most one loaded embedder per `(provider, model)` tuple, shared
/// across every project whose config resolves to that pair.
#[derive(Default)]
pub struct EmbedderCache {
  embedders: RwLock<HashMap<String, Arc<Embedder>>>,
}

impl EmbedderCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn get_or_open(&self, config: &amanmcp_core::config::EmbeddingConfig) -> search::Result<Arc<Embedder>> {
    let key = embedder_key(config);
    {
      let embedders = self.embedders.read().await;
      if let Some(embedder) = embedders.get(&key) {
        return Ok(Arc::clone(embedder));
      }
    }

    let embedder = Arc::new(Embedder::open(config).map_err(search::SearchError::from)?);
    let mut embedders = self.embedders.write().await;
    let embedder = embedders.entry(key).or_insert(embedder);
    Ok(Arc::clone(embedder))
  }

  pub async fn len(&self) -> usize {
    self.embedders.read().await.len()
  }

  /// Summary of loaded embedders for the status op: `(type, status)`. With
  /// more than one distinct pair loaded, reports a count instead of a single
  /// identity since the wire contract has room for only one of each.
  pub async fn summary(&self) -> (String, String) {
    let embedders = self.embedders.read().await;
    match embedders.len() {
      0 => ("none".to_string(), "idle".to_string()),
      1 => {
        let (key, _) = embedders.iter().next().unwrap();
        (key.clone(), "ready".to_string())
      }
      n => (format!("{n} embedders"), "ready".to_string()),
    }
  }
}

struct CacheEntry {
  engine: Arc<SearchEngine>,
  project_id: ProjectId,
  last_used: Instant,
}

/// Path of the per-project liveness marker a caller scoped to `root` can use
/// to tell whether some daemon is currently serving it.
fn serve_pid_path(data_dir: &Path, project_id: &ProjectId) -> PathBuf {
  project_id.data_dir(data_dir).join("serve.pid")
}

/// Maps canonical project roots to their open search engine, evicting the
/// least-recently-used entry once the configured cap is reached.
pub struct ProjectCache {
  data_dir: PathBuf,
  max_cached: usize,
  embedders: Arc<EmbedderCache>,
  entries: RwLock<HashMap<PathBuf, CacheEntry>>,
}

impl ProjectCache {
  pub fn new(data_dir: PathBuf, max_cached: usize, embedders: Arc<EmbedderCache>) -> Self {
    Self { data_dir, max_cached, embedders, entries: RwLock::new(HashMap::new()) }
  }

  pub async fn len(&self) -> usize {
    self.entries.read().await.len()
  }

  pub async fn get_or_open(&self, root_path: &Path) -> search::Result<Arc<SearchEngine>> {
    let canonical = root_path.canonicalize().map_err(search::SearchError::Io)?;

    {
      let mut entries = self.entries.write().await;
      if let Some(entry) = entries.get_mut(&canonical) {
        entry.last_used = Instant::now();
        debug!(root = %canonical.display(), "reusing cached search engine");
        return Ok(Arc::clone(&entry.engine));
      }
    }

    let project_id = ProjectId::from_path(&canonical);
    let config = Config::load_for_project(&canonical);
    let embedder = self.embedders.get_or_open(&config.embedding).await?;
    let engine = Arc::new(SearchEngine::open_with_embedder(&canonical, &self.data_dir, config, embedder)?);

    let mut entries = self.entries.write().await;
    if entries.len() >= self.max_cached && !entries.contains_key(&canonical) {
      self.evict_one(&mut entries);
    }
    write_serve_pid(&serve_pid_path(&self.data_dir, &project_id));
    entries.insert(
      canonical.clone(),
      CacheEntry { engine: Arc::clone(&engine), project_id, last_used: Instant::now() },
    );
    info!(root = %canonical.display(), cached = entries.len(), "opened search engine for project");
    Ok(engine)
  }

  fn evict_one(&self, entries: &mut HashMap<PathBuf, CacheEntry>) {
    if let Some(oldest) = entries.iter().min_by_key(|(_, e)| e.last_used).map(|(k, _)| k.clone()) {
      if let Some(entry) = entries.remove(&oldest) {
        let _ = std::fs::remove_file(serve_pid_path(&self.data_dir, &entry.project_id));
      }
      debug!(root = %oldest.display(), "evicted least-recently-used project");
    }
  }

  /// Drops every cached engine, removing each project's liveness marker.
  pub async fn close_all(&self) {
    let mut entries = self.entries.write().await;
    for entry in entries.values() {
      let _ = std::fs::remove_file(serve_pid_path(&self.data_dir, &entry.project_id));
    }
    entries.clear();
  }
}

fn write_serve_pid(path: &Path) {
  if let Some(parent) = path.parent() {
    let _ = std::fs::create_dir_all(parent);
  }
  if let Err(e) = std::fs::write(path, std::process::id().to_string()) {
    debug!(path = %path.display(), error = %e, "failed to write serve.pid");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use amanmcp_core::EmbedderVariant;
  use tempfile::TempDir;

  fn static_config() -> Config {
    let mut config = Config::default();
    config.embedding.variant = EmbedderVariant::Static;
    config
  }

  #[tokio::test]
  async fn reopening_the_same_project_reuses_the_cached_engine() {
    let project = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    std::fs::write(project.path().join("a.rs"), "pub fn f() {}\n").unwrap();
    pipeline::run_once(project.path(), data.path(), static_config()).await.unwrap();

    let embedders = Arc::new(EmbedderCache::new());
    let cache = ProjectCache::new(data.path().to_path_buf(), 8, embedders);

    let first = cache.get_or_open(project.path()).await.unwrap();
    let second = cache.get_or_open(project.path()).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len().await, 1);
  }

  #[tokio::test]
  async fn distinct_projects_share_one_embedder() {
    let project_a = TempDir::new().unwrap();
    let project_b = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    std::fs::write(project_a.path().join("a.rs"), "pub fn a() {}\n").unwrap();
    std::fs::write(project_b.path().join("b.rs"), "pub fn b() {}\n").unwrap();
    pipeline::run_once(project_a.path(), data.path(), static_config()).await.unwrap();
    pipeline::run_once(project_b.path(), data.path(), static_config()).await.unwrap();

    let embedders = Arc::new(EmbedderCache::new());
    let cache = ProjectCache::new(data.path().to_path_buf(), 8, Arc::clone(&embedders));

    cache.get_or_open(project_a.path()).await.unwrap();
    cache.get_or_open(project_b.path()).await.unwrap();
    assert_eq!(cache.len().await, 2);
    assert_eq!(embedders.len().await, 1);
  }

  #[tokio::test]
  async fn cache_evicts_least_recently_used_past_the_cap() {
    let data = TempDir::new().unwrap();
    let embedders = Arc::new(EmbedderCache::new());
    let cache = ProjectCache::new(data.path().to_path_buf(), 1, embedders);

    let project_a = TempDir::new().unwrap();
    let project_b = TempDir::new().unwrap();
    std::fs::write(project_a.path().join("a.rs"), "pub fn a() {}\n").unwrap();
    std::fs::write(project_b.path().join("b.rs"), "pub fn b() {}\n").unwrap();
    pipeline::run_once(project_a.path(), data.path(), static_config()).await.unwrap();
    pipeline::run_once(project_b.path(), data.path(), static_config()).await.unwrap();

    cache.get_or_open(project_a.path()).await.unwrap();
    cache.get_or_open(project_b.path()).await.unwrap();
    assert_eq!(cache.len().await, 1);
  }
}
