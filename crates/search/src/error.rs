use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
  #[error("query is empty")]
  QueryEmpty,
  #[error("query too long ({len} chars, max {max})")]
  QueryTooLong { len: usize, max: usize },
  #[error(transparent)]
  Store(#[from] store::DbError),
  #[error(transparent)]
  Lexical(#[from] lexical::LexicalError),
  #[error(transparent)]
  Vector(#[from] vector::VectorError),
  #[error(transparent)]
  Embedding(#[from] embedding::EmbeddingError),
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl From<SearchError> for amanmcp_core::Error {
  fn from(e: SearchError) -> Self {
    match e {
      SearchError::QueryEmpty => amanmcp_core::Error::new(amanmcp_core::ErrorKind::QueryEmpty, e.to_string()),
      SearchError::QueryTooLong { .. } => {
        amanmcp_core::Error::new(amanmcp_core::ErrorKind::QueryTooLong, e.to_string())
      }
      SearchError::Store(inner) => inner.into(),
      SearchError::Lexical(inner) => inner.into(),
      SearchError::Vector(inner) => inner.into(),
      SearchError::Embedding(inner) => inner.into(),
      SearchError::Io(inner) => amanmcp_core::Error::new(amanmcp_core::ErrorKind::SearchFailed, inner.to_string()),
    }
  }
}
