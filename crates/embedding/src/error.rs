use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
  #[error("embedder not available")]
  NotAvailable,
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("provider error: {0}")]
  Provider(String),
  #[error("network error: {0}")]
  Network(String),
  #[error("request timed out")]
  Timeout,
  #[error("embedding has {found} dimensions, expected {expected}")]
  DimensionMismatch { expected: usize, found: usize },
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;

impl From<EmbeddingError> for amanmcp_core::Error {
  fn from(e: EmbeddingError) -> Self {
    let kind = match &e {
      EmbeddingError::DimensionMismatch { .. } => amanmcp_core::ErrorKind::DimensionMismatch,
      EmbeddingError::Timeout => amanmcp_core::ErrorKind::NetworkTimeout,
      EmbeddingError::Network(_) | EmbeddingError::Request(_) => amanmcp_core::ErrorKind::NetworkUnavailable,
      EmbeddingError::NotAvailable => amanmcp_core::ErrorKind::ConfigMissing,
      EmbeddingError::Provider(_) => amanmcp_core::ErrorKind::EmbeddingFailed,
    };
    amanmcp_core::Error::new(kind, e.to_string())
  }
}

/// Whether a failed call is worth retrying at all — transient network
/// conditions and well-known rate-limit/overload status codes are, malformed
/// requests and auth failures are not.
pub fn is_retryable(error: &EmbeddingError) -> bool {
  match error {
    EmbeddingError::Network(_) | EmbeddingError::Timeout => true,
    EmbeddingError::Request(e) => e.is_timeout() || e.is_connect(),
    EmbeddingError::Provider(msg) => {
      msg.contains("429") || msg.contains("502") || msg.contains("503") || msg.contains("504")
    }
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn retryable_provider_messages() {
    assert!(is_retryable(&EmbeddingError::Provider("status 429".into())));
    assert!(is_retryable(&EmbeddingError::Provider("got 503".into())));
    assert!(!is_retryable(&EmbeddingError::Provider("status 400: bad request".into())));
  }

  #[test]
  fn network_and_timeout_are_retryable() {
    assert!(is_retryable(&EmbeddingError::Network("reset".into())));
    assert!(is_retryable(&EmbeddingError::Timeout));
    assert!(!is_retryable(&EmbeddingError::NotAvailable));
  }
}
