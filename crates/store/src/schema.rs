//! Schema DDL and the linear migration list. A `schema_version` row in the
//! `_store_state` table gates which migrations have been applied; an
//! on-disk version newer than this binary's highest known migration is a
//! fatal corruption-class error rather than an attempt at forward
//! compatibility.

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

pub struct Migration {
  pub version: i64,
  pub name: &'static str,
  pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[Migration {
  version: 1,
  name: "initial_schema",
  sql: r#"
    CREATE TABLE IF NOT EXISTS projects (
      id TEXT PRIMARY KEY,
      name TEXT NOT NULL,
      root_path TEXT NOT NULL,
      file_count INTEGER NOT NULL DEFAULT 0,
      chunk_count INTEGER NOT NULL DEFAULT 0,
      created_at TEXT NOT NULL,
      indexed_at TEXT
    );

    CREATE TABLE IF NOT EXISTS files (
      id TEXT PRIMARY KEY,
      project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
      relative_path TEXT NOT NULL,
      language TEXT,
      size_bytes INTEGER NOT NULL,
      content_hash TEXT NOT NULL,
      last_modified TEXT NOT NULL,
      UNIQUE(project_id, relative_path)
    );
    CREATE INDEX IF NOT EXISTS idx_files_project ON files(project_id);

    CREATE TABLE IF NOT EXISTS chunks (
      id TEXT PRIMARY KEY,
      file_id TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
      file_path TEXT NOT NULL,
      start_line INTEGER NOT NULL,
      end_line INTEGER NOT NULL,
      content TEXT NOT NULL,
      content_type TEXT NOT NULL,
      language TEXT NOT NULL,
      tokens_estimate INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_id);

    CREATE TABLE IF NOT EXISTS embeddings (
      chunk_id TEXT PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE,
      model_id TEXT NOT NULL,
      dimensions INTEGER NOT NULL,
      vector BLOB NOT NULL
    );

    CREATE TABLE IF NOT EXISTS checkpoints (
      project_id TEXT PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
      stage TEXT NOT NULL,
      embedded_count INTEGER NOT NULL,
      total INTEGER NOT NULL,
      embedder_model TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS store_state (
      project_id TEXT NOT NULL,
      key TEXT NOT NULL,
      value TEXT,
      PRIMARY KEY (project_id, key)
    );

    CREATE TABLE IF NOT EXISTS query_telemetry (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      project_id TEXT NOT NULL,
      query TEXT NOT NULL,
      timestamp TEXT NOT NULL,
      latency_ms INTEGER NOT NULL,
      result_count INTEGER NOT NULL,
      query_type TEXT NOT NULL,
      zero_result INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_telemetry_project ON query_telemetry(project_id);

    CREATE TABLE IF NOT EXISTS _migrations (
      version INTEGER PRIMARY KEY,
      name TEXT NOT NULL,
      applied_at TEXT NOT NULL
    );
  "#,
}];
