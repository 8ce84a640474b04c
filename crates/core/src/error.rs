use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
  Configuration,
  Io,
  Network,
  Validation,
  Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Info,
  Warning,
  Error,
  Fatal,
}

/// A concrete error kind. Category and severity are derived from the kind,
/// not stored redundantly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
  ConfigMissing,
  ConfigInvalid,

  FileNotFound,
  Permission,
  DiskFull,
  TooLarge,
  Corrupt,
  IndexCorrupt,

  NetworkTimeout,
  NetworkUnavailable,
  ModelDownload,

  InvalidInput,
  DimensionMismatch,
  InvalidQuery,
  QueryEmpty,
  QueryTooLong,
  InvalidPath,

  Internal,
  EmbeddingFailed,
  SearchFailed,
  ChunkingFailed,
  IndexFailed,
  LexicalBackendLocked,
}

impl ErrorKind {
  pub fn category(self) -> Category {
    use ErrorKind::*;
    match self {
      ConfigMissing | ConfigInvalid => Category::Configuration,
      FileNotFound | Permission | DiskFull | TooLarge | Corrupt | IndexCorrupt => Category::Io,
      NetworkTimeout | NetworkUnavailable | ModelDownload => Category::Network,
      InvalidInput | DimensionMismatch | InvalidQuery | QueryEmpty | QueryTooLong | InvalidPath => {
        Category::Validation
      }
      Internal | EmbeddingFailed | SearchFailed | ChunkingFailed | IndexFailed => Category::Internal,
      LexicalBackendLocked => Category::Io,
    }
  }

  pub fn severity(self) -> Severity {
    use ErrorKind::*;
    match self {
      DiskFull | IndexCorrupt | Corrupt => Severity::Fatal,
      ConfigMissing | ConfigInvalid | FileNotFound | Permission | TooLarge => Severity::Error,
      NetworkTimeout | NetworkUnavailable | ModelDownload => Severity::Warning,
      InvalidInput | DimensionMismatch | InvalidQuery | QueryEmpty | QueryTooLong | InvalidPath => Severity::Error,
      Internal | EmbeddingFailed | SearchFailed | ChunkingFailed | IndexFailed => Severity::Error,
      LexicalBackendLocked => Severity::Warning,
    }
  }

  pub fn retryable(self) -> bool {
    matches!(
      self,
      ErrorKind::NetworkTimeout
        | ErrorKind::NetworkUnavailable
        | ErrorKind::ModelDownload
        | ErrorKind::EmbeddingFailed
        | ErrorKind::LexicalBackendLocked
    )
  }

  pub fn code(self) -> &'static str {
    use ErrorKind::*;
    match self {
      ConfigMissing => "config_missing",
      ConfigInvalid => "config_invalid",
      FileNotFound => "file_not_found",
      Permission => "permission",
      DiskFull => "disk_full",
      TooLarge => "too_large",
      Corrupt => "corrupt",
      IndexCorrupt => "index_corrupt",
      NetworkTimeout => "network_timeout",
      NetworkUnavailable => "network_unavailable",
      ModelDownload => "model_download",
      InvalidInput => "invalid_input",
      DimensionMismatch => "dimension_mismatch",
      InvalidQuery => "invalid_query",
      QueryEmpty => "query_empty",
      QueryTooLong => "query_too_long",
      InvalidPath => "invalid_path",
      Internal => "internal",
      EmbeddingFailed => "embedding_failed",
      SearchFailed => "search_failed",
      ChunkingFailed => "chunking_failed",
      IndexFailed => "index_failed",
      LexicalBackendLocked => "lexical_backend_locked",
    }
  }
}

/// The structured error returned through every fallible operation in the
/// engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
  pub kind: ErrorKind,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cause: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub suggestion: Option<String>,
  #[serde(default, skip_serializing_if = "HashMap::is_empty")]
  pub details: HashMap<String, String>,
}

impl Error {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
      cause: None,
      suggestion: None,
      details: HashMap::new(),
    }
  }

  pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
    self.cause = Some(cause.into());
    self
  }

  pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
    self.suggestion = Some(suggestion.into());
    self
  }

  pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.details.insert(key.into(), value.into());
    self
  }

  pub fn category(&self) -> Category {
    self.kind.category()
  }

  pub fn severity(&self) -> Severity {
    self.kind.severity()
  }

  pub fn retryable(&self) -> bool {
    self.kind.retryable()
  }
}

impl std::fmt::Display for Error {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "[{}] {}", self.kind.code(), self.message)?;
    if let Some(ref cause) = self.cause {
      write!(f, ": {cause}")?;
    }
    Ok(())
  }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
  fn from(e: std::io::Error) -> Self {
    let kind = match e.kind() {
      std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
      std::io::ErrorKind::PermissionDenied => ErrorKind::Permission,
      _ => ErrorKind::Internal,
    };
    Error::new(kind, e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, Error>;
