use crate::error::{EmbeddingError, Result, is_retryable};
use amanmcp_core::config::EmbeddingConfig;
use amanmcp_core::retry::{CircuitBreaker, RetryConfig, retry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const API_KEY_ENV: &str = "AMANMCP_REMOTE_API_KEY";

/// Embeds against a remote HTTP embeddings API (OpenRouter-shaped: a single
/// `POST {model, input}` endpoint, bearer auth, native batch support via an
/// array `input`).
#[derive(Clone)]
pub struct RemoteEmbedder {
  client: reqwest::Client,
  endpoint: String,
  api_key: String,
  model: String,
  dimensions: usize,
  retry_config: RetryConfig,
  breaker: Arc<CircuitBreaker>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: EmbeddingInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
  Single(&'a str),
  Batch(Vec<&'a str>),
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

impl RemoteEmbedder {
  pub fn new(config: &EmbeddingConfig) -> Result<Self> {
    let api_key = std::env::var(API_KEY_ENV).map_err(|_| EmbeddingError::NotAvailable)?;
    Ok(Self {
      client: reqwest::Client::new(),
      endpoint: config.remote_url.clone(),
      api_key,
      model: config.model.clone(),
      dimensions: config.dimensions,
      retry_config: RetryConfig::for_remote(),
      breaker: Arc::new(CircuitBreaker::new("embedder.remote", 5, Duration::from_secs(60))),
    })
  }

  pub fn dimensions(&self) -> usize {
    self.dimensions
  }

  pub fn model_name(&self) -> &str {
    &self.model
  }

  fn check_dimensions(&self, vectors: &[Vec<f32>]) -> Result<()> {
    for v in vectors {
      if v.len() != self.dimensions {
        return Err(EmbeddingError::DimensionMismatch { expected: self.dimensions, found: v.len() });
      }
    }
    Ok(())
  }

  async fn request(&self, input: EmbeddingInput<'_>) -> Result<Vec<Vec<f32>>> {
    let body = EmbeddingRequest { model: &self.model, input };
    let response = self
      .client
      .post(&self.endpoint)
      .header("Authorization", format!("Bearer {}", self.api_key))
      .json(&body)
      .send()
      .await?;

    if !response.status().is_success() {
      let status = response.status();
      let text = response.text().await.unwrap_or_default();
      warn!("remote embedder returned {status}: {text}");
      return Err(EmbeddingError::Provider(format!("remote embedder returned {status}: {text}")));
    }

    let decoded: EmbeddingResponse = response.json().await?;
    let vectors: Vec<Vec<f32>> = decoded.data.into_iter().map(|d| d.embedding).collect();
    self.check_dimensions(&vectors)?;
    Ok(vectors)
  }

  pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
    if !self.breaker.allow() {
      return Err(EmbeddingError::NotAvailable);
    }
    debug!("embedding {} chars remotely", text.len());
    let result = retry(&self.retry_config, is_retryable, || async {
      self.request(EmbeddingInput::Single(text)).await
    })
    .await;

    match &result {
      Ok(_) => self.breaker.record_success(),
      Err(e) if is_retryable(e) => self.breaker.record_failure(),
      Err(_) => {}
    }
    result.and_then(|mut v| v.pop().ok_or(EmbeddingError::Provider("empty response".to_string())))
  }

  pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }
    if !self.breaker.allow() {
      return Err(EmbeddingError::NotAvailable);
    }
    let result = retry(&self.retry_config, is_retryable, || async {
      self.request(EmbeddingInput::Batch(texts.to_vec())).await
    })
    .await;

    match &result {
      Ok(_) => self.breaker.record_success(),
      Err(e) if is_retryable(e) => self.breaker.record_failure(),
      Err(_) => {}
    }
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config() -> EmbeddingConfig {
    EmbeddingConfig {
      variant: amanmcp_core::config::EmbedderVariant::Remote,
      remote_url: "https://example.invalid/v1/embeddings".to_string(),
      model: "text-embedding-3-small".to_string(),
      dimensions: 1536,
      thermal: Default::default(),
    }
  }

  #[test]
  fn missing_api_key_is_not_available() {
    unsafe {
      std::env::remove_var(API_KEY_ENV);
    }
    assert!(matches!(RemoteEmbedder::new(&config()), Err(EmbeddingError::NotAvailable)));
  }

  #[test]
  fn present_api_key_constructs() {
    unsafe {
      std::env::set_var(API_KEY_ENV, "test-key");
    }
    let embedder = RemoteEmbedder::new(&config()).unwrap();
    assert_eq!(embedder.dimensions(), 1536);
    unsafe {
      std::env::remove_var(API_KEY_ENV);
    }
  }
}
