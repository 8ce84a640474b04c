use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("not found: {0}")]
  NotFound(String),
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
  #[error("schema version {found} is newer than the highest known migration {known}; refusing to open")]
  SchemaTooNew { found: i64, known: i64 },
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<DbError> for amanmcp_core::Error {
  fn from(e: DbError) -> Self {
    let kind = match &e {
      DbError::SchemaTooNew { .. } => amanmcp_core::ErrorKind::IndexCorrupt,
      DbError::NotFound(_) => amanmcp_core::ErrorKind::FileNotFound,
      _ => amanmcp_core::ErrorKind::Internal,
    };
    amanmcp_core::Error::new(kind, e.to_string())
  }
}
