//! End-to-end indexing run: INIT -> SCAN -> CHUNK -> EMBED -> PERSIST -> DONE,
//! with a checkpoint written after every embedding batch so a crashed or
//! killed run can resume mid-EMBED instead of starting over.

use crate::error::{PipelineError, Result};
use crate::scanner::{ScanProgress, Scanner};
use amanmcp_core::{Checkpoint, Chunk, Config, File as IndexedFile, PipelineStage, ProjectId};
use chunker::{Chunker, ChunkerConfig};
use embedding::Embedder;
use lexical::{Bm25Params, LexicalBackend, LexicalBackendKind, LexicalDoc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use store::MetadataStore;
use tracing::{info, warn};
use vector::{VectorIndex, VectorIndexConfig};

/// Summary of one completed run, surfaced to the CLI/daemon.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
  pub files_scanned: usize,
  pub files_changed: usize,
  pub files_deleted: usize,
  pub chunks_upserted: usize,
  pub chunks_deleted: usize,
  pub chunks_embedded: usize,
  pub resumed: bool,
}

/// Orchestrates scanning, chunking, embedding, and persistence for a single
/// project. Holds the project's three retrieval backends (metadata store,
/// lexical index, vector index) plus the configured embedder; one instance
/// is reused across a full run and across incremental watch-triggered runs.
pub struct Pipeline {
  project_id: ProjectId,
  project_root: PathBuf,
  data_dir: PathBuf,
  config: Config,
  store: MetadataStore,
  lexical: Box<dyn LexicalBackend>,
  vector: VectorIndex,
  embedder: Embedder,
  scanner: Scanner,
  chunker: Chunker,
}

fn vector_index_path(data_dir: &Path, project_id: &ProjectId) -> PathBuf {
  project_id.data_dir(data_dir).join("vector.usearch")
}

fn lexical_dir(data_dir: &Path, project_id: &ProjectId) -> PathBuf {
  project_id.data_dir(data_dir).join("lexical")
}

impl Pipeline {
  /// Open (or create) every on-disk artifact for `project_root` under
  /// `data_dir`. Refuses to open an index whose stored chunk id scheme
  /// predates content addressing, or whose stored vector dimensionality no
  /// longer matches the configured embedder, unless the caller clears the
  /// index first via `force_rebuild`.
  pub fn open(project_root: &Path, data_dir: &Path, config: Config) -> Result<Self> {
    let project_id = ProjectId::from_path(project_root);
    let store = MetadataStore::open(project_id.as_str(), data_dir)?;
    let embedder = Embedder::open(&config.embedding)?;

    let project_name = project_root
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| project_id.as_str().to_string());
    if store.get_project(project_id.as_str())?.is_none() {
      let created_at = chrono::Utc::now();
      store.save_project(project_id.as_str(), &project_name, &project_root.to_string_lossy(), created_at)?;
      store.set_state(project_id.as_str(), "created_at", &created_at.to_rfc3339())?;
    }

    let state = store.get_store_state(project_id.as_str())?;
    if state.index_dimensions.is_some() && state.dimension_mismatch(embedder.dimensions()) {
      return Err(PipelineError::DimensionMismatch {
        expected: embedder.dimensions(),
        found: state.index_dimensions.unwrap(),
      });
    }
    if let Some(version) = &state.chunk_id_version
      && version != amanmcp_core::CHUNK_ID_VERSION
    {
      return Err(PipelineError::StaleCheckpoint {
        stored: version.clone(),
        current: amanmcp_core::CHUNK_ID_VERSION.to_string(),
      });
    }

    let lexical_kind = match config.index.lexical_backend {
      amanmcp_core::LexicalBackend::SingleFile => LexicalBackendKind::SingleFile,
      amanmcp_core::LexicalBackend::Legacy => LexicalBackendKind::Legacy,
    };
    let lexical = lexical::open(&lexical_dir(data_dir, &project_id), lexical_kind, Bm25Params::default())?;

    let vector_path = vector_index_path(data_dir, &project_id);
    let vector_config = VectorIndexConfig::new(embedder.dimensions());
    let vector = if vector_path.with_extension("meta.json").exists() {
      VectorIndex::load(&vector_path, vector_config)?
    } else {
      VectorIndex::new(vector_config)?
    };

    let chunker = Chunker::new(ChunkerConfig::from(&config.index));
    let scanner = Scanner::new().with_max_file_size(config.index.max_file_size_bytes);

    Ok(Self {
      project_id,
      project_root: project_root.to_path_buf(),
      data_dir: data_dir.to_path_buf(),
      config,
      store,
      lexical,
      vector,
      embedder,
      scanner,
      chunker,
    })
  }

  pub fn project_id(&self) -> &ProjectId {
    &self.project_id
  }

  /// Deletes every persistent artifact for this project (metadata, lexical
  /// backend files, vector snapshot) so the next `open` starts clean.
  /// `--force` and resume are mutually exclusive: call this before `open`,
  /// never after.
  pub fn force_rebuild(data_dir: &Path, project_root: &Path) -> Result<()> {
    let project_id = ProjectId::from_path(project_root);
    let dir = project_id.data_dir(data_dir);
    if dir.exists() {
      std::fs::remove_dir_all(&dir)?;
    }
    Ok(())
  }

  /// Run the full state machine once: SCAN the whole tree, CHUNK changed
  /// files, EMBED pending chunks, PERSIST both retrieval indexes. If a
  /// resumable checkpoint exists it resumes at EMBED instead of re-scanning.
  pub async fn run_full<F>(&mut self, progress: F) -> Result<PipelineStats>
  where
    F: Fn(ScanProgress) + Send + Sync,
  {
    if let Some(checkpoint) = self.store.load_checkpoint(self.project_id.as_str())? {
      if checkpoint.stage == PipelineStage::Done {
        self.store.clear_checkpoint(self.project_id.as_str())?;
      } else if checkpoint.is_resumable_against(self.embedder.model_name()) {
        info!(stage = ?checkpoint.stage, embedded = checkpoint.embedded_count, "resuming indexing run");
        return self.resume_embed(checkpoint).await;
      } else {
        warn!(
          stored = %checkpoint.embedder_model,
          current = %self.embedder.model_name(),
          "checkpoint embedder model differs from configured embedder; refusing to resume"
        );
        return Err(PipelineError::CheckpointModelMismatch {
          stored: checkpoint.embedder_model.clone(),
          current: self.embedder.model_name().to_string(),
        });
      }
    }

    self.run_from_scan(progress).await
  }

  async fn run_from_scan<F>(&mut self, progress: F) -> Result<PipelineStats>
  where
    F: Fn(ScanProgress) + Send + Sync,
  {
    let mut stats = PipelineStats::default();

    // -- SCAN --------------------------------------------------------------
    let scan = self.scanner.scan(&self.project_root, progress);
    stats.files_scanned = scan.files.len();

    let known_hashes = self.store.list_file_hashes(self.project_id.as_str())?;
    let scanned_paths: HashSet<&str> = scan.files.iter().map(|f| f.relative_path.as_str()).collect();

    let deleted_relative_paths: Vec<String> = known_hashes
      .keys()
      .filter(|path| !scanned_paths.contains(path.as_str()))
      .cloned()
      .collect();

    let changed: Vec<_> = scan
      .files
      .iter()
      .filter(|f| known_hashes.get(&f.relative_path).map(|h| h != &f.checksum).unwrap_or(true))
      .collect();
    stats.files_changed = changed.len();
    stats.files_deleted = deleted_relative_paths.len();

    // -- CHUNK ---------------------------------------------------------------
    self
      .store
      .save_checkpoint(self.project_id.as_str(), PipelineStage::Chunking, 0, 0, self.embedder.model_name())?;

    let mut upserted_files = Vec::with_capacity(changed.len());
    let mut new_chunks: Vec<Chunk> = Vec::new();
    let mut stale_chunk_ids: HashSet<String> = HashSet::new();

    for scanned in &changed {
      let file_id = IndexedFile::derive_id(self.project_id.as_str(), &scanned.relative_path);

      for old_chunk in self.store.chunks_for_file(&file_id)? {
        stale_chunk_ids.insert(old_chunk.id);
      }

      let bytes = std::fs::read(&scanned.path)?;
      let chunks = match self.chunker.chunk(&file_id, &scanned.relative_path, &bytes, Some(scanned.language)) {
        Ok(chunks) => chunks,
        Err(chunker::ChunkError::Binary) => {
          warn!(path = %scanned.relative_path, "binary content detected, skipping file");
          continue;
        }
        Err(e) => return Err(e.into()),
      };

      for chunk in &chunks {
        stale_chunk_ids.remove(&chunk.id);
      }

      upserted_files.push(IndexedFile {
        id: file_id,
        project_id: self.project_id.as_str().to_string(),
        relative_path: scanned.relative_path.clone(),
        language: Some(scanned.language),
        size_bytes: scanned.size,
        content_hash: scanned.checksum.clone(),
        last_modified: chrono::DateTime::from_timestamp(scanned.mtime as i64, 0).unwrap_or_else(chrono::Utc::now),
      });
      new_chunks.extend(chunks);
    }

    for relative_path in &deleted_relative_paths {
      let file_id = IndexedFile::derive_id(self.project_id.as_str(), relative_path);
      for old_chunk in self.store.chunks_for_file(&file_id)? {
        stale_chunk_ids.insert(old_chunk.id);
      }
      self.store.delete_files(&[file_id])?;
    }

    let stale_chunk_ids: Vec<String> = stale_chunk_ids.into_iter().collect();
    stats.chunks_deleted = stale_chunk_ids.len();
    stats.chunks_upserted = new_chunks.len();

    self.store.save_files(self.project_id.as_str(), &upserted_files)?;
    self.store.save_chunks(&new_chunks)?;
    self.store.delete_chunks(&stale_chunk_ids)?;
    self.lexical.remove(&stale_chunk_ids)?;
    self.vector.delete(&stale_chunk_ids)?;

    // -- EMBED / PERSIST ------------------------------------------------------
    let pending_ids = self.store.project_chunk_ids(self.project_id.as_str())?;
    let embedded = self.store.get_all_embeddings(self.project_id.as_str())?;
    let pending: Vec<Chunk> = pending_ids
      .into_iter()
      .filter(|id| !embedded.contains_key(id))
      .filter_map(|id| self.store.get_chunk(&id).ok().flatten())
      .collect();

    let total_pending = pending.len() as u64;
    self.store.save_checkpoint(
      self.project_id.as_str(),
      PipelineStage::Embedding,
      0,
      total_pending,
      self.embedder.model_name(),
    )?;

    let embedded_count = self.embed_and_persist(&pending, 0).await?;
    stats.chunks_embedded = embedded_count;

    self.finish_persist()?;
    Ok(stats)
  }

  async fn resume_embed(&mut self, checkpoint: Checkpoint) -> Result<PipelineStats> {
    let mut stats = PipelineStats {
      resumed: true,
      ..Default::default()
    };

    if checkpoint.embedded_count >= checkpoint.total {
      self.finish_persist()?;
      return Ok(stats);
    }

    let pending_ids = self.store.project_chunk_ids(self.project_id.as_str())?;
    let embedded = self.store.get_all_embeddings(self.project_id.as_str())?;
    let pending: Vec<Chunk> = pending_ids
      .into_iter()
      .filter(|id| !embedded.contains_key(id))
      .filter_map(|id| self.store.get_chunk(&id).ok().flatten())
      .collect();

    stats.chunks_embedded = self.embed_and_persist(&pending, checkpoint.embedded_count).await?;
    self.finish_persist()?;
    Ok(stats)
  }

  /// Embeds `pending` in fixed-size batches. After each batch, persists
  /// embedding records and vector entries, appends to the lexical index,
  /// and advances the checkpoint - so a crash mid-EMBED loses at most one
  /// batch of progress.
  async fn embed_and_persist(&mut self, pending: &[Chunk], already_done: u64) -> Result<usize> {
    const BATCH_SIZE: usize = 32;
    let total = already_done + pending.len() as u64;
    let mut done = already_done;

    for batch in pending.chunks(BATCH_SIZE) {
      let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
      let vectors = self.embedder.embed_batch(&texts).await?;

      let ids: Vec<String> = batch.iter().map(|c| c.id.clone()).collect();
      let records: Vec<(String, String, usize, Vec<f32>)> = batch
        .iter()
        .zip(vectors.iter())
        .map(|(c, v)| (c.id.clone(), self.embedder.model_name().to_string(), self.embedder.dimensions(), v.clone()))
        .collect();

      self.store.save_embeddings(&records)?;
      self.vector.add(&ids, &vectors)?;

      let docs: Vec<LexicalDoc<'_>> = batch
        .iter()
        .map(|c| LexicalDoc {
          id: &c.id,
          file_path: &c.file_path,
          content: &c.content,
        })
        .collect();
      self.lexical.index(&docs)?;

      done += batch.len() as u64;
      self.store.save_checkpoint(
        self.project_id.as_str(),
        PipelineStage::Embedding,
        done,
        total,
        self.embedder.model_name(),
      )?;

      if !self.config.embedding.thermal.inter_batch_delay.is_zero() {
        tokio::time::sleep(self.config.embedding.thermal.inter_batch_delay).await;
      }
    }

    Ok((total - already_done) as usize)
  }

  fn finish_persist(&mut self) -> Result<()> {
    self.lexical.flush()?;
    self.vector.save(&vector_index_path(&self.data_dir, &self.project_id))?;

    self.store.set_state(
      self.project_id.as_str(),
      "chunk_id_version",
      amanmcp_core::CHUNK_ID_VERSION,
    )?;
    self
      .store
      .set_state(self.project_id.as_str(), "index_model", self.embedder.model_name())?;
    self
      .store
      .set_state(self.project_id.as_str(), "index_dimensions", &self.embedder.dimensions().to_string())?;
    let backend_name = match self.config.index.lexical_backend {
      amanmcp_core::LexicalBackend::SingleFile => "single_file",
      amanmcp_core::LexicalBackend::Legacy => "legacy",
    };
    self.store.set_state(self.project_id.as_str(), "index_backend", backend_name)?;

    let chunk_count = self.store.project_chunk_ids(self.project_id.as_str())?.len() as u64;
    let file_count = self.store.list_file_hashes(self.project_id.as_str())?.len() as u64;
    self
      .store
      .mark_project_indexed(self.project_id.as_str(), file_count, chunk_count)?;
    self.store.clear_checkpoint(self.project_id.as_str())?;

    info!(project = %self.project_id, chunks = chunk_count, "indexing run complete");
    Ok(())
  }

  /// Rebuilds the vector graph from durable embedding records, reclaiming
  /// tombstoned nodes. The rebuilt graph is atomically swapped in and
  /// written to disk; orphan count after is always <= before.
  pub fn compact(&mut self) -> Result<()> {
    let embeddings = self.store.get_all_embeddings(self.project_id.as_str())?;
    let dimensions = self.embedder.dimensions();
    let placeholder = VectorIndex::new(VectorIndexConfig::new(dimensions))?;
    let current = std::mem::replace(&mut self.vector, placeholder);
    self.vector = current.compact(embeddings.into_iter())?;
    self.vector.save(&vector_index_path(&self.data_dir, &self.project_id))?;
    Ok(())
  }

  pub async fn close(self) -> Result<()> {
    self.lexical.close()?;
    self.embedder.close().await?;
    Ok(())
  }
}

/// Resolves the project root and wraps a `WatcherCoordinator`/`Pipeline` pair
/// so the caller only has to provide the two directories once.
pub async fn run_once(project_root: &Path, data_dir: &Path, config: Config) -> Result<PipelineStats> {
  let mut pipeline = Pipeline::open(project_root, data_dir, config)?;
  let stats = pipeline.run_full(|_progress| {}).await?;
  pipeline.close().await?;
  Ok(stats)
}
