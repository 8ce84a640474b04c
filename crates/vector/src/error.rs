use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
  #[error("usearch error: {0}")]
  Usearch(String),
  #[error("vector has {found} dimensions, index expects {expected}")]
  DimensionMismatch { expected: usize, found: usize },
}

pub type Result<T> = std::result::Result<T, VectorError>;

impl From<VectorError> for amanmcp_core::Error {
  fn from(e: VectorError) -> Self {
    let kind = match &e {
      VectorError::DimensionMismatch { .. } => amanmcp_core::ErrorKind::DimensionMismatch,
      _ => amanmcp_core::ErrorKind::Internal,
    };
    amanmcp_core::Error::new(kind, e.to_string())
  }
}
