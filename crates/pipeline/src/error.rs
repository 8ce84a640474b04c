use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error(transparent)]
  Scan(#[from] crate::scanner::ScanError),
  #[error(transparent)]
  Chunk(#[from] chunker::ChunkError),
  #[error(transparent)]
  Store(#[from] store::DbError),
  #[error(transparent)]
  Lexical(#[from] lexical::LexicalError),
  #[error(transparent)]
  Vector(#[from] vector::VectorError),
  #[error(transparent)]
  Embedding(#[from] embedding::EmbeddingError),
  #[error(transparent)]
  Watch(#[from] crate::watcher::WatchError),
  #[error(transparent)]
  Coordination(#[from] crate::coordination::CoordinationError),
  #[error("stored index dimensions ({found}) do not match the configured embedder ({expected}); re-embed or delete the index")]
  DimensionMismatch { expected: usize, found: usize },
  #[error("checkpoint is from a different embedder model ({stored}); cannot resume with {current}")]
  StaleCheckpoint { stored: String, current: String },
  #[error("checkpoint embedder model ({stored}) does not match the configured embedder ({current}); resuming would mix embedding spaces")]
  CheckpointModelMismatch { stored: String, current: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<PipelineError> for amanmcp_core::Error {
  fn from(e: PipelineError) -> Self {
    match e {
      PipelineError::DimensionMismatch { expected, found } => amanmcp_core::Error::new(
        amanmcp_core::ErrorKind::DimensionMismatch,
        format!("stored index dimensions ({found}) do not match the configured embedder ({expected})"),
      ),
      PipelineError::StaleCheckpoint { stored, current } => amanmcp_core::Error::new(
        amanmcp_core::ErrorKind::IndexCorrupt,
        format!("checkpoint is from embedder model '{stored}', current is '{current}'"),
      ),
      PipelineError::CheckpointModelMismatch { stored, current } => amanmcp_core::Error::new(
        amanmcp_core::ErrorKind::InvalidInput,
        format!("checkpoint embedder model '{stored}' does not match configured embedder '{current}'"),
      )
      .with_suggestion("run with --force to discard the checkpoint and re-embed with the configured model"),
      PipelineError::Store(inner) => inner.into(),
      PipelineError::Lexical(inner) => inner.into(),
      PipelineError::Vector(inner) => inner.into(),
      PipelineError::Embedding(inner) => inner.into(),
      PipelineError::Chunk(inner) => {
        amanmcp_core::Error::new(amanmcp_core::ErrorKind::ChunkingFailed, inner.to_string())
      }
      other => amanmcp_core::Error::new(amanmcp_core::ErrorKind::Internal, other.to_string()),
    }
  }
}
