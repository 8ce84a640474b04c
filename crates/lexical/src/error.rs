use thiserror::Error;

#[derive(Debug, Error)]
pub enum LexicalError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
  #[error("lexical index locked by another writer")]
  Locked,
}

pub type Result<T> = std::result::Result<T, LexicalError>;

impl From<LexicalError> for amanmcp_core::Error {
  fn from(e: LexicalError) -> Self {
    let kind = match &e {
      LexicalError::Locked => amanmcp_core::ErrorKind::LexicalBackendLocked,
      _ => amanmcp_core::ErrorKind::Internal,
    };
    amanmcp_core::Error::new(kind, e.to_string())
  }
}
