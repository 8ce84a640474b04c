use crate::error::{DbError, Result};
use crate::schema::{CURRENT_SCHEMA_VERSION, MIGRATIONS};
use amanmcp_core::{Chunk, ContentType, File, Language, PipelineStage};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn vector_to_blob(v: &[f32]) -> Vec<u8> {
  let mut out = Vec::with_capacity(v.len() * 4);
  for x in v {
    out.extend_from_slice(&x.to_le_bytes());
  }
  out
}

fn blob_to_vector(b: &[u8]) -> Vec<f32> {
  b.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

/// Relational store of projects, files, chunks, embeddings, checkpoints and
/// telemetry. A single writer is expected (the indexing pipeline); readers
/// (search, status) may run concurrently thanks to SQLite's WAL journal.
pub struct MetadataStore {
  conn: Mutex<Connection>,
  pub path: PathBuf,
}

impl MetadataStore {
  pub fn open(project_id_str: &str, base_dir: &Path) -> Result<Self> {
    let dir = base_dir.join("projects").join(project_id_str);
    std::fs::create_dir_all(&dir)?;
    Self::open_at_path(dir.join("metadata.db"))
  }

  pub fn open_at_path(path: PathBuf) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    info!(path = %path.display(), "opening metadata store");
    let conn = Connection::open(&path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    let store = Self {
      conn: Mutex::new(conn),
      path,
    };
    store.run_migrations()?;
    Ok(store)
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", true)?;
    let store = Self {
      conn: Mutex::new(conn),
      path: PathBuf::from(":memory:"),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.conn.lock();
    conn.execute_batch(
      "CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY, name TEXT NOT NULL, applied_at TEXT NOT NULL);",
    )?;

    let current: i64 = conn
      .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |r| r.get(0))
      .unwrap_or(0);

    if current > CURRENT_SCHEMA_VERSION {
      return Err(DbError::SchemaTooNew {
        found: current,
        known: CURRENT_SCHEMA_VERSION,
      });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
      debug!(version = migration.version, name = migration.name, "applying migration");
      conn.execute_batch(migration.sql)?;
      conn.execute(
        "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
        params![migration.version, migration.name, Utc::now().to_rfc3339()],
      )?;
    }
    Ok(())
  }

  // -- projects -----------------------------------------------------------

  pub fn save_project(&self, id: &str, name: &str, root_path: &str, created_at: DateTime<Utc>) -> Result<()> {
    let conn = self.conn.lock();
    conn.execute(
      "INSERT INTO projects (id, name, root_path, file_count, chunk_count, created_at, indexed_at)
       VALUES (?1, ?2, ?3, 0, 0, ?4, NULL)
       ON CONFLICT(id) DO UPDATE SET name = excluded.name, root_path = excluded.root_path",
      params![id, name, root_path, created_at.to_rfc3339()],
    )?;
    Ok(())
  }

  pub fn mark_project_indexed(&self, id: &str, file_count: u64, chunk_count: u64) -> Result<()> {
    let conn = self.conn.lock();
    conn.execute(
      "UPDATE projects SET file_count = ?2, chunk_count = ?3, indexed_at = ?4 WHERE id = ?1",
      params![id, file_count, chunk_count, Utc::now().to_rfc3339()],
    )?;
    Ok(())
  }

  pub fn get_project(&self, id: &str) -> Result<Option<ProjectRow>> {
    let conn = self.conn.lock();
    conn
      .query_row(
        "SELECT id, name, root_path, file_count, chunk_count, created_at, indexed_at FROM projects WHERE id = ?1",
        params![id],
        |r| {
          Ok(ProjectRow {
            id: r.get(0)?,
            name: r.get(1)?,
            root_path: r.get(2)?,
            file_count: r.get(3)?,
            chunk_count: r.get(4)?,
            created_at: r.get(5)?,
            indexed_at: r.get(6)?,
          })
        },
      )
      .optional()
      .map_err(DbError::from)
  }

  // -- files ----------------------------------------------------------------

  pub fn save_files(&self, project_id: &str, files: &[File]) -> Result<()> {
    let mut conn = self.conn.lock();
    let tx = conn.transaction()?;
    for f in files {
      tx.execute(
        "INSERT INTO files (id, project_id, relative_path, language, size_bytes, content_hash, last_modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET size_bytes = excluded.size_bytes, content_hash = excluded.content_hash,
           last_modified = excluded.last_modified",
        params![
          f.id,
          project_id,
          f.relative_path,
          f.language.map(|l| format!("{:?}", l)),
          f.size_bytes,
          f.content_hash,
          f.last_modified.to_rfc3339()
        ],
      )?;
    }
    tx.commit()?;
    Ok(())
  }

  pub fn delete_files(&self, ids: &[String]) -> Result<()> {
    let conn = self.conn.lock();
    for id in ids {
      conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;
    }
    Ok(())
  }

  pub fn list_file_hashes(&self, project_id: &str) -> Result<HashMap<String, String>> {
    let conn = self.conn.lock();
    let mut stmt = conn.prepare("SELECT relative_path, content_hash FROM files WHERE project_id = ?1")?;
    let rows = stmt.query_map(params![project_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
    let mut out = HashMap::new();
    for row in rows {
      let (path, hash) = row?;
      out.insert(path, hash);
    }
    Ok(out)
  }

  // -- chunks -----------------------------------------------------------------

  pub fn save_chunks(&self, chunks: &[Chunk]) -> Result<()> {
    let mut conn = self.conn.lock();
    let tx = conn.transaction()?;
    for c in chunks {
      tx.execute(
        "INSERT INTO chunks (id, file_id, file_path, start_line, end_line, content, content_type, language, tokens_estimate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET start_line = excluded.start_line, end_line = excluded.end_line",
        params![
          c.id,
          c.file_id,
          c.file_path,
          c.start_line,
          c.end_line,
          c.content,
          format!("{:?}", c.content_type),
          format!("{:?}", c.language),
          c.tokens_estimate
        ],
      )?;
    }
    tx.commit()?;
    Ok(())
  }

  pub fn delete_chunks(&self, ids: &[String]) -> Result<()> {
    let mut conn = self.conn.lock();
    let tx = conn.transaction()?;
    for id in ids {
      tx.execute("DELETE FROM chunks WHERE id = ?1", params![id])?;
      tx.execute("DELETE FROM embeddings WHERE chunk_id = ?1", params![id])?;
    }
    tx.commit()?;
    Ok(())
  }

  pub fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
    let conn = self.conn.lock();
    conn
      .query_row(
        "SELECT id, file_id, file_path, start_line, end_line, content, content_type, language, tokens_estimate
         FROM chunks WHERE id = ?1",
        params![id],
        row_to_chunk,
      )
      .optional()
      .map_err(DbError::from)
  }

  pub fn chunks_for_file(&self, file_id: &str) -> Result<Vec<Chunk>> {
    let conn = self.conn.lock();
    let mut stmt = conn.prepare(
      "SELECT id, file_id, file_path, start_line, end_line, content, content_type, language, tokens_estimate
       FROM chunks WHERE file_id = ?1",
    )?;
    let rows = stmt.query_map(params![file_id], row_to_chunk)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(DbError::from)
  }

  pub fn project_chunk_ids(&self, project_id: &str) -> Result<Vec<String>> {
    let conn = self.conn.lock();
    let mut stmt = conn.prepare(
      "SELECT chunks.id FROM chunks JOIN files ON chunks.file_id = files.id WHERE files.project_id = ?1",
    )?;
    let rows = stmt.query_map(params![project_id], |r| r.get::<_, String>(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(DbError::from)
  }

  // -- embeddings ---------------------------------------------------------

  pub fn save_embeddings(&self, records: &[(String, String, usize, Vec<f32>)]) -> Result<()> {
    let mut conn = self.conn.lock();
    let tx = conn.transaction()?;
    for (chunk_id, model_id, dims, vector) in records {
      tx.execute(
        "INSERT INTO embeddings (chunk_id, model_id, dimensions, vector) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(chunk_id) DO UPDATE SET model_id = excluded.model_id, dimensions = excluded.dimensions,
           vector = excluded.vector",
        params![chunk_id, model_id, *dims as i64, vector_to_blob(vector)],
      )?;
    }
    tx.commit()?;
    Ok(())
  }

  pub fn get_all_embeddings(&self, project_id: &str) -> Result<HashMap<String, Vec<f32>>> {
    let conn = self.conn.lock();
    let mut stmt = conn.prepare(
      "SELECT embeddings.chunk_id, embeddings.vector FROM embeddings
       JOIN chunks ON embeddings.chunk_id = chunks.id
       JOIN files ON chunks.file_id = files.id
       WHERE files.project_id = ?1",
    )?;
    let rows = stmt.query_map(params![project_id], |r| {
      Ok((r.get::<_, String>(0)?, blob_to_vector(&r.get::<_, Vec<u8>>(1)?)))
    })?;
    let mut out = HashMap::new();
    for row in rows {
      let (id, v) = row?;
      out.insert(id, v);
    }
    Ok(out)
  }

  pub fn embedded_chunk_count(&self, project_id: &str) -> Result<u64> {
    let conn = self.conn.lock();
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM embeddings
       JOIN chunks ON embeddings.chunk_id = chunks.id
       JOIN files ON chunks.file_id = files.id
       WHERE files.project_id = ?1",
      params![project_id],
      |r| r.get(0),
    )?;
    Ok(count as u64)
  }

  // -- checkpoints ----------------------------------------------------------

  pub fn save_checkpoint(&self, project_id: &str, stage: PipelineStage, embedded_count: u64, total: u64, model: &str) -> Result<()> {
    let conn = self.conn.lock();
    conn.execute(
      "INSERT INTO checkpoints (project_id, stage, embedded_count, total, embedder_model, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6)
       ON CONFLICT(project_id) DO UPDATE SET stage = excluded.stage, embedded_count = excluded.embedded_count,
         total = excluded.total, embedder_model = excluded.embedder_model, updated_at = excluded.updated_at",
      params![project_id, format!("{:?}", stage), embedded_count, total, model, Utc::now().to_rfc3339()],
    )?;
    Ok(())
  }

  pub fn load_checkpoint(&self, project_id: &str) -> Result<Option<amanmcp_core::Checkpoint>> {
    let conn = self.conn.lock();
    conn
      .query_row(
        "SELECT stage, embedded_count, total, embedder_model, updated_at FROM checkpoints WHERE project_id = ?1",
        params![project_id],
        |r| {
          let stage_str: String = r.get(0)?;
          let updated_at: String = r.get(4)?;
          Ok(amanmcp_core::Checkpoint {
            stage: parse_stage(&stage_str),
            embedded_count: r.get(1)?,
            total: r.get(2)?,
            embedder_model: r.get(3)?,
            updated_at: DateTime::parse_from_rfc3339(&updated_at).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
          })
        },
      )
      .optional()
      .map_err(DbError::from)
  }

  pub fn clear_checkpoint(&self, project_id: &str) -> Result<()> {
    let conn = self.conn.lock();
    conn.execute("DELETE FROM checkpoints WHERE project_id = ?1", params![project_id])?;
    Ok(())
  }

  // -- store state ------------------------------------------------------------

  pub fn set_state(&self, project_id: &str, key: &str, value: &str) -> Result<()> {
    let conn = self.conn.lock();
    conn.execute(
      "INSERT INTO store_state (project_id, key, value) VALUES (?1, ?2, ?3)
       ON CONFLICT(project_id, key) DO UPDATE SET value = excluded.value",
      params![project_id, key, value],
    )?;
    Ok(())
  }

  pub fn get_state(&self, project_id: &str, key: &str) -> Result<Option<String>> {
    let conn = self.conn.lock();
    conn
      .query_row(
        "SELECT value FROM store_state WHERE project_id = ?1 AND key = ?2",
        params![project_id, key],
        |r| r.get(0),
      )
      .optional()
      .map_err(DbError::from)
  }

  pub fn get_store_state(&self, project_id: &str) -> Result<amanmcp_core::StoreStateMap> {
    Ok(amanmcp_core::StoreStateMap {
      chunk_id_version: self.get_state(project_id, "chunk_id_version")?,
      index_model: self.get_state(project_id, "index_model")?,
      index_backend: self.get_state(project_id, "index_backend")?,
      index_dimensions: self.get_state(project_id, "index_dimensions")?.and_then(|s| s.parse().ok()),
      created_at: self
        .get_state(project_id, "created_at")?
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc)),
    })
  }

  // -- telemetry --------------------------------------------------------------

  pub fn append_telemetry(&self, project_id: &str, t: &amanmcp_core::QueryTelemetry) -> Result<()> {
    let conn = self.conn.lock();
    conn.execute(
      "INSERT INTO query_telemetry (project_id, query, timestamp, latency_ms, result_count, query_type, zero_result)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      params![
        project_id,
        t.query,
        t.timestamp.to_rfc3339(),
        t.latency_ms as i64,
        t.result_count as i64,
        t.query_type,
        t.zero_result
      ],
    )?;
    Ok(())
  }

  pub fn zero_result_count(&self, project_id: &str) -> Result<u64> {
    let conn = self.conn.lock();
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM query_telemetry WHERE project_id = ?1 AND zero_result = 1",
      params![project_id],
      |r| r.get(0),
    )?;
    Ok(count as u64)
  }
}

fn parse_stage(s: &str) -> PipelineStage {
  match s {
    "Scanning" => PipelineStage::Scanning,
    "Chunking" => PipelineStage::Chunking,
    "Embedding" => PipelineStage::Embedding,
    "Persisting" => PipelineStage::Persisting,
    _ => PipelineStage::Done,
  }
}

fn row_to_chunk(r: &rusqlite::Row) -> rusqlite::Result<Chunk> {
  let content_type: String = r.get(6)?;
  let language: String = r.get(7)?;
  Ok(Chunk {
    id: r.get(0)?,
    file_id: r.get(1)?,
    file_path: r.get(2)?,
    start_line: r.get(3)?,
    end_line: r.get(4)?,
    content: r.get(5)?,
    content_type: parse_content_type(&content_type),
    language: parse_language(&language),
    tokens_estimate: r.get(8)?,
  })
}

fn parse_content_type(s: &str) -> ContentType {
  match s {
    "Code" => ContentType::Code,
    "Docs" => ContentType::Docs,
    "Comment" => ContentType::Comment,
    _ => ContentType::Data,
  }
}

/// Parses back the `{:?}` rendering stored in the `language` column.
fn parse_language(s: &str) -> Language {
    match s {
      "TypeScript" => Language::TypeScript,
      "JavaScript" => Language::JavaScript,
      "Tsx" => Language::Tsx,
      "Jsx" => Language::Jsx,
      "Html" => Language::Html,
      "Css" => Language::Css,
      "Scss" => Language::Scss,
      "Sass" => Language::Sass,
      "Less" => Language::Less,
      "Rust" => Language::Rust,
      "Python" => Language::Python,
      "Go" => Language::Go,
      "Java" => Language::Java,
      "Kotlin" => Language::Kotlin,
      "Scala" => Language::Scala,
      "CSharp" => Language::CSharp,
      "Cpp" => Language::Cpp,
      "C" => Language::C,
      "Swift" => Language::Swift,
      "Ruby" => Language::Ruby,
      "Php" => Language::Php,
      "Lua" => Language::Lua,
      "Elixir" => Language::Elixir,
      "Haskell" => Language::Haskell,
      "Ocaml" => Language::Ocaml,
      "Clojure" => Language::Clojure,
      "Zig" => Language::Zig,
      "Nim" => Language::Nim,
      "Json" => Language::Json,
      "Yaml" => Language::Yaml,
      "Toml" => Language::Toml,
      "Xml" => Language::Xml,
      "Markdown" => Language::Markdown,
      "Shell" => Language::Shell,
      "Sql" => Language::Sql,
      "Dockerfile" => Language::Dockerfile,
      "GraphQL" => Language::GraphQL,
      "Proto" => Language::Proto,
      _ => Language::PlainText,
    }
}

#[derive(Debug, Clone)]
pub struct ProjectRow {
  pub id: String,
  pub name: String,
  pub root_path: String,
  pub file_count: i64,
  pub chunk_count: i64,
  pub created_at: String,
  pub indexed_at: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use amanmcp_core::{Checkpoint, ContentType, PipelineStage};

  fn chunk(id_seed: &str) -> Chunk {
    Chunk::new("file1", "a.rs", 1, 2, format!("fn {id_seed}() {{}}"), ContentType::Code, Language::Rust)
  }

  #[test]
  fn test_open_and_migrate() {
    let store = MetadataStore::open_in_memory().unwrap();
    store.save_project("p1", "proj", "/tmp/proj", Utc::now()).unwrap();
    let row = store.get_project("p1").unwrap().unwrap();
    assert_eq!(row.name, "proj");
  }

  #[test]
  fn test_save_and_delete_chunks() {
    let store = MetadataStore::open_in_memory().unwrap();
    store.save_project("p1", "proj", "/tmp", Utc::now()).unwrap();
    let f = File {
      id: "file1".into(),
      project_id: "p1".into(),
      relative_path: "a.rs".into(),
      language: Some(Language::Rust),
      size_bytes: 10,
      content_hash: "abc".into(),
      last_modified: Utc::now(),
    };
    store.save_files("p1", &[f]).unwrap();

    let c = chunk("a");
    store.save_chunks(&[c.clone()]).unwrap();
    assert!(store.get_chunk(&c.id).unwrap().is_some());

    store.delete_chunks(&[c.id.clone()]).unwrap();
    assert!(store.get_chunk(&c.id).unwrap().is_none());
  }

  #[test]
  fn test_embeddings_roundtrip() {
    let store = MetadataStore::open_in_memory().unwrap();
    store.save_project("p1", "proj", "/tmp", Utc::now()).unwrap();
    let f = File {
      id: "file1".into(),
      project_id: "p1".into(),
      relative_path: "a.rs".into(),
      language: Some(Language::Rust),
      size_bytes: 10,
      content_hash: "abc".into(),
      last_modified: Utc::now(),
    };
    store.save_files("p1", &[f]).unwrap();
    let c = chunk("b");
    store.save_chunks(&[c.clone()]).unwrap();

    let vector = vec![0.1f32, 0.2, 0.3];
    store.save_embeddings(&[(c.id.clone(), "model-a".into(), 3, vector.clone())]).unwrap();

    let all = store.get_all_embeddings("p1").unwrap();
    let got = all.get(&c.id).unwrap();
    for (a, b) in got.iter().zip(vector.iter()) {
      assert!((a - b).abs() < 1e-6);
    }
  }

  #[test]
  fn test_checkpoint_roundtrip() {
    let store = MetadataStore::open_in_memory().unwrap();
    store.save_project("p1", "proj", "/tmp", Utc::now()).unwrap();
    store.save_checkpoint("p1", PipelineStage::Embedding, 40, 100, "model-a").unwrap();

    let cp = store.load_checkpoint("p1").unwrap().unwrap();
    assert_eq!(cp.embedded_count, 40);
    assert_eq!(cp.stage, PipelineStage::Embedding);

    store.clear_checkpoint("p1").unwrap();
    assert!(store.load_checkpoint("p1").unwrap().is_none());
  }

  #[test]
  fn test_store_state_roundtrip() {
    let store = MetadataStore::open_in_memory().unwrap();
    store.set_state("p1", "chunk_id_version", amanmcp_core::CHUNK_ID_VERSION).unwrap();
    store.set_state("p1", "index_dimensions", "1024").unwrap();

    let state = store.get_store_state("p1").unwrap();
    assert!(state.is_content_addressed());
    assert!(state.dimension_mismatch(768));
    assert!(!state.dimension_mismatch(1024));
  }

  #[test]
  fn test_telemetry_zero_result_count() {
    let store = MetadataStore::open_in_memory().unwrap();
    let t = amanmcp_core::QueryTelemetry {
      query: "foo".into(),
      timestamp: Utc::now(),
      latency_ms: 5,
      result_count: 0,
      query_type: "bm25".into(),
      zero_result: true,
    };
    store.append_telemetry("p1", &t).unwrap();
    assert_eq!(store.zero_result_count("p1").unwrap(), 1);
  }

  // Silences an unused-import warning for Checkpoint type referenced in doc purposes only.
  #[allow(dead_code)]
  fn _type_check(_c: Checkpoint) {}
}
