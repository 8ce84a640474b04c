//! Hybrid search: parallel lexical + dense retrieval fused with RRF.

use crate::error::{Result, SearchError};
use crate::fusion::{self, FusedCandidate};
use crate::types::{Hit, HitExplain, SearchExplain, SearchOptions, SearchResponse};
use crate::{decompose, max_query_len};
use amanmcp_core::{Chunk, Config, ProjectId, QueryTelemetry};
use embedding::Embedder;
use lexical::{Bm25Params, LexicalBackend, LexicalBackendKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use store::MetadataStore;
use vector::{VectorIndex, VectorIndexConfig};

fn vector_index_path(data_dir: &Path, project_id: &ProjectId) -> PathBuf {
  project_id.data_dir(data_dir).join("vector.usearch")
}

fn lexical_dir(data_dir: &Path, project_id: &ProjectId) -> PathBuf {
  project_id.data_dir(data_dir).join("lexical")
}

/// Query engine for one already-indexed project. Holds read access to the
/// same three backends the indexing pipeline writes, plus the embedder used
/// to vectorize queries.
pub struct SearchEngine {
  project_id: ProjectId,
  store: MetadataStore,
  lexical: Box<dyn LexicalBackend>,
  vector: Option<VectorIndex>,
  embedder: Arc<Embedder>,
  rrf_k: f32,
  bm25_weight: f64,
  vector_weight: f64,
  max_chunks_per_file: usize,
  /// Set once a dimension mismatch is observed; the dense branch stays off
  /// for the rest of this engine's lifetime rather than retrying per query.
  dense_disabled: AtomicBool,
}

impl SearchEngine {
  /// Opens the same on-disk backends the pipeline maintains for
  /// `project_root`, in read access only: no writes happen here, with a
  /// dedicated embedder owned by this engine alone.
  pub fn open(project_root: &Path, data_dir: &Path, config: Config) -> Result<Self> {
    let embedder = Arc::new(Embedder::open(&config.embedding)?);
    Self::open_with_embedder(project_root, data_dir, config, embedder)
  }

  /// Opens backends for `project_root` reusing an embedder already loaded
  /// elsewhere (the daemon keeps one embedder per distinct provider/model
  /// pair and hands it to every project's engine).
  pub fn open_with_embedder(project_root: &Path, data_dir: &Path, config: Config, embedder: Arc<Embedder>) -> Result<Self> {
    let project_id = ProjectId::from_path(project_root);
    let store = MetadataStore::open(project_id.as_str(), data_dir)?;

    let lexical_kind = match config.index.lexical_backend {
      amanmcp_core::LexicalBackend::SingleFile => LexicalBackendKind::SingleFile,
      amanmcp_core::LexicalBackend::Legacy => LexicalBackendKind::Legacy,
    };
    let lexical = lexical::open(&lexical_dir(data_dir, &project_id), lexical_kind, Bm25Params::default())?;

    let state = store.get_store_state(project_id.as_str())?;
    let dimension_mismatch = state.index_dimensions.is_some() && state.dimension_mismatch(embedder.dimensions());

    let vector_path = vector_index_path(data_dir, &project_id);
    let vector_config = VectorIndexConfig::new(embedder.dimensions());
    let vector = if dimension_mismatch {
      None
    } else if vector_path.with_extension("meta.json").exists() {
      Some(VectorIndex::load(&vector_path, vector_config)?)
    } else {
      None
    };

    Ok(Self {
      project_id,
      store,
      lexical,
      vector,
      embedder,
      rrf_k: config.search.rrf_k as f32,
      bm25_weight: config.search.bm25_weight,
      vector_weight: config.search.vector_weight,
      max_chunks_per_file: config.search.max_chunks_per_file,
      dense_disabled: AtomicBool::new(dimension_mismatch),
    })
  }

  /// Runs `search`, recording the query's latency and result count to the
  /// telemetry table so zero-result rate can be inspected later.
  pub async fn search_with_telemetry(&self, query: &str, options: &SearchOptions) -> Result<SearchResponse> {
    let start = std::time::Instant::now();
    let response = self.search(query, options).await?;

    let telemetry = QueryTelemetry {
      query: query.to_string(),
      timestamp: chrono::Utc::now(),
      latency_ms: start.elapsed().as_millis() as u64,
      result_count: response.hits.len(),
      query_type: if options.bm25_only { "bm25_only".to_string() } else { "hybrid".to_string() },
      zero_result: response.hits.is_empty(),
    };
    // Telemetry is best-effort: a write failure here must not fail the query.
    if let Err(e) = self.store.append_telemetry(self.project_id.as_str(), &telemetry) {
      tracing::warn!(error = %e, "failed to record query telemetry");
    }

    Ok(response)
  }

  pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResponse> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
      return Err(SearchError::QueryEmpty);
    }
    if trimmed.chars().count() > max_query_len() {
      return Err(SearchError::QueryTooLong { len: trimmed.chars().count(), max: max_query_len() });
    }

    let sub_queries = decompose::decompose(trimmed);
    let queries: Vec<&str> = match &sub_queries {
      Some(parts) => parts.iter().map(String::as_str).collect(),
      None => vec![trimmed],
    };

    let mut bm25_total = 0;
    let mut vector_total = 0;
    let mut fused_sets = Vec::with_capacity(queries.len());
    for q in &queries {
      let (fused, bm25_count, vector_count) = self.retrieve_and_fuse(q, options).await?;
      bm25_total += bm25_count;
      vector_total += vector_count;
      fused_sets.push(fused);
    }
    let fused = fusion::merge_fused(fused_sets);

    let hits = self.hydrate_and_filter(fused, options)?;
    let dimension_mismatch = self.dense_disabled.load(Ordering::Relaxed);

    let explain = options.explain.then(|| SearchExplain {
      mode: if options.bm25_only || dimension_mismatch { "bm25_only" } else { "hybrid" },
      bm25_weight: self.bm25_weight,
      vector_weight: self.vector_weight,
      rrf_constant: self.rrf_k as u32,
      sub_queries: sub_queries.clone(),
      bm25_result_count: bm25_total,
      vector_result_count: vector_total,
      dimension_mismatch,
    });

    Ok(SearchResponse { hits, explain })
  }

  /// Runs the lexical and dense branches for one (sub-)query and fuses them.
  async fn retrieve_and_fuse(&self, query: &str, options: &SearchOptions) -> Result<(Vec<FusedCandidate>, usize, usize)> {
    // Over-fetch beyond the requested limit so post-fusion filtering and the
    // per-file diversity cap still have enough candidates to work with.
    let fetch_k = (options.limit * 4).max(40);
    let scopes = options.scopes.as_deref();

    let bm25_results = self.lexical.search(query, fetch_k, scopes)?;

    let vector_results = if self.dense_branch_enabled(options) {
      let query_vector = self.embedder.embed_one(query).await?;
      match self.vector.as_ref() {
        Some(index) if index.count() > 0 => index.search(&query_vector, fetch_k)?,
        _ => Vec::new(),
      }
    } else {
      Vec::new()
    };

    let bm25_count = bm25_results.len();
    let vector_count = vector_results.len();
    let fused = fusion::fuse_rrf(&bm25_results, &vector_results, self.rrf_k, self.bm25_weight, self.vector_weight);
    Ok((fused, bm25_count, vector_count))
  }

  fn dense_branch_enabled(&self, options: &SearchOptions) -> bool {
    if options.bm25_only {
      return false;
    }
    if self.dense_disabled.load(Ordering::Relaxed) {
      return false;
    }
    self.vector.is_some()
  }

  fn hydrate_and_filter(&self, fused: Vec<FusedCandidate>, options: &SearchOptions) -> Result<Vec<Hit>> {
    let mut per_file_counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut hits = Vec::new();

    for candidate in fused {
      if hits.len() >= options.limit {
        break;
      }
      let Some(chunk) = self.store.get_chunk(&candidate.id)? else {
        continue;
      };
      if !options.passes_filters(&chunk.file_path, chunk.content_type, chunk.language) {
        continue;
      }

      if self.max_chunks_per_file > 0 {
        let count = per_file_counts.entry(chunk.file_path.clone()).or_insert(0);
        if *count >= self.max_chunks_per_file {
          continue;
        }
        *count += 1;
      }

      hits.push(self.to_hit(chunk, &candidate, options.explain));
    }

    Ok(hits)
  }

  fn to_hit(&self, chunk: Chunk, candidate: &FusedCandidate, explain: bool) -> Hit {
    Hit {
      chunk_id: chunk.id,
      file_path: chunk.file_path,
      start_line: chunk.start_line,
      end_line: chunk.end_line,
      content: chunk.content,
      content_type: chunk.content_type,
      language: chunk.language,
      score: candidate.score,
      explain: explain.then(|| HitExplain {
        bm25_rank: candidate.bm25_rank,
        bm25_score: candidate.bm25_score,
        vec_rank: candidate.vec_rank,
        vec_score: candidate.vec_score,
      }),
    }
  }

  pub fn has_dense_index(&self) -> bool {
    self.vector.is_some() && !self.dense_disabled.load(Ordering::Relaxed)
  }

  pub async fn close(self) -> Result<()> {
    self.lexical.close()?;
    self.embedder.close().await?;
    Ok(())
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

  async fn indexed_fixture() -> (TempDir, TempDir) {
    let project = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    std::fs::write(
      project.path().join("auth.rs"),
      "/// Validates a user session token against the store.\npub fn validate_session(token: &str) -> bool {\n    !token.is_empty()\n}\n",
    )
    .unwrap();
    std::fs::write(
      project.path().join("math.rs"),
      "/// Adds two integers.\npub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n",
    )
    .unwrap();

    pipeline::run_once(project.path(), data.path(), static_config()).await.unwrap();
    (project, data)
  }

  #[tokio::test]
  async fn finds_matching_chunk_by_keyword() {
    let (project, data) = indexed_fixture().await;
    let engine = SearchEngine::open(project.path(), data.path(), static_config()).unwrap();

    let response = engine.search("validate_session", &SearchOptions::default()).await.unwrap();
    assert!(!response.hits.is_empty());
    assert!(response.hits[0].content.contains("validate_session"));
  }

  #[tokio::test]
  async fn empty_query_is_rejected() {
    let (project, data) = indexed_fixture().await;
    let engine = SearchEngine::open(project.path(), data.path(), static_config()).unwrap();

    let err = engine.search("   ", &SearchOptions::default()).await.unwrap_err();
    assert!(matches!(err, SearchError::QueryEmpty));
  }

  #[tokio::test]
  async fn bm25_only_skips_dense_branch() {
    let (project, data) = indexed_fixture().await;
    let engine = SearchEngine::open(project.path(), data.path(), static_config()).unwrap();

    let options = SearchOptions { bm25_only: true, explain: true, ..Default::default() };
    let response = engine.search("add", &options).await.unwrap();
    let explain = response.explain.unwrap();
    assert_eq!(explain.mode, "bm25_only");
    assert_eq!(explain.vector_result_count, 0);
  }

  #[tokio::test]
  async fn explain_attaches_per_result_ranks() {
    let (project, data) = indexed_fixture().await;
    let engine = SearchEngine::open(project.path(), data.path(), static_config()).unwrap();

    let options = SearchOptions { explain: true, ..Default::default() };
    let response = engine.search("add two integers", &options).await.unwrap();
    assert!(response.hits.iter().all(|h| h.explain.is_some()));
  }

  #[tokio::test]
  async fn per_file_diversity_limit_caps_hits_from_one_file() {
    let project = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let mut big = String::new();
    for i in 0..40 {
      big.push_str(&format!("/// helper {i}\npub fn helper_{i}(x: i32) -> i32 {{ x + {i} }}\n\n"));
    }
    std::fs::write(project.path().join("helpers.rs"), big).unwrap();
    pipeline::run_once(project.path(), data.path(), static_config()).await.unwrap();

    let engine = SearchEngine::open(project.path(), data.path(), static_config()).unwrap();
    let options = SearchOptions { limit: 20, ..Default::default() };
    let response = engine.search("helper", &options).await.unwrap();

    let from_file = response.hits.iter().filter(|h| h.file_path.contains("helpers.rs")).count();
    assert!(from_file <= 2, "max_chunks_per_file defaults to 2, got {from_file}");
  }
}
