use crate::error::{EmbeddingError, Result, is_retryable};
use amanmcp_core::config::{EmbeddingConfig, ThermalConfig};
use amanmcp_core::retry::{CircuitBreaker, RetryConfig, retry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const MAX_CONCURRENT_REQUESTS: usize = 4;

/// Embeds against a local model server (an Ollama-compatible HTTP API on the
/// same machine). Requests are parallelized with bounded concurrency since
/// the server has no native batch endpoint, and each request is retried with
/// a progression of timeouts so a thermally-throttled local GPU gets more
/// slack on the second attempt rather than failing outright.
#[derive(Clone)]
pub struct LocalEmbedder {
  client: reqwest::Client,
  base_url: String,
  model: String,
  dimensions: usize,
  thermal: ThermalConfig,
  retry_config: RetryConfig,
  breaker: Arc<CircuitBreaker>,
  semaphore: Arc<Semaphore>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  embedding: Vec<f32>,
}

impl LocalEmbedder {
  pub fn new(config: &EmbeddingConfig) -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: config.remote_url.clone(),
      model: config.model.clone(),
      dimensions: config.dimensions,
      thermal: config.thermal.clone(),
      retry_config: RetryConfig::for_local(),
      breaker: Arc::new(CircuitBreaker::new("embedder.local", 5, Duration::from_secs(30))),
      semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
    }
  }

  fn embeddings_url(&self) -> String {
    format!("{}/api/embeddings", self.base_url)
  }

  pub fn dimensions(&self) -> usize {
    self.dimensions
  }

  pub fn model_name(&self) -> &str {
    &self.model
  }

  pub async fn is_available(&self) -> bool {
    matches!(self.client.get(&self.base_url).send().await, Ok(r) if r.status().is_success())
  }

  async fn embed_attempt(&self, text: &str, timeout: Duration) -> Result<Vec<f32>> {
    let request = EmbeddingRequest { model: &self.model, prompt: text };
    let response = tokio::time::timeout(timeout, self.client.post(self.embeddings_url()).json(&request).send())
      .await
      .map_err(|_| EmbeddingError::Timeout)??;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!("local embedder returned {status}: {body}");
      return Err(EmbeddingError::Provider(format!("local embedder returned {status}: {body}")));
    }

    let decoded: EmbeddingResponse = response.json().await?;
    if decoded.embedding.len() != self.dimensions {
      return Err(EmbeddingError::DimensionMismatch { expected: self.dimensions, found: decoded.embedding.len() });
    }
    Ok(decoded.embedding)
  }

  /// Walks the configured timeout progression: the first timeout in the list
  /// is tried first, the retry machinery moves to the next one on a timeout
  /// failure, and the last entry is reused for any attempts beyond its index.
  pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
    if !self.breaker.allow() {
      return Err(EmbeddingError::NotAvailable);
    }
    debug!("embedding {} chars locally", text.len());
    let progression = &self.thermal.timeout_progression;
    let attempt_count = std::sync::atomic::AtomicU32::new(0);
    let result = retry(&self.retry_config, is_retryable, || {
      let attempt = attempt_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst) as usize;
      let timeout = progression.get(attempt).copied().unwrap_or_else(|| {
        progression.last().copied().unwrap_or(Duration::from_secs(10))
      });
      async move { self.embed_attempt(text, timeout).await }
    })
    .await;

    match &result {
      Ok(_) => self.breaker.record_success(),
      Err(e) if is_retryable(e) => self.breaker.record_failure(),
      Err(_) => {}
    }
    result
  }

  pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
    let futures: Vec<_> = texts
      .iter()
      .map(|text| {
        let semaphore = self.semaphore.clone();
        let text = text.to_string();
        let embedder = self.clone();
        async move {
          let _permit = semaphore.acquire().await.map_err(|_| EmbeddingError::NotAvailable)?;
          let result = embedder.embed_one(&text).await;
          tokio::time::sleep(embedder.thermal.inter_batch_delay).await;
          result
        }
      })
      .collect();

    futures::future::join_all(futures).await.into_iter().collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config() -> EmbeddingConfig {
    EmbeddingConfig {
      variant: amanmcp_core::config::EmbedderVariant::Local,
      remote_url: "http://localhost:11434".to_string(),
      model: "qwen3-embedding-0.6b".to_string(),
      dimensions: 1024,
      thermal: ThermalConfig::default(),
    }
  }

  #[test]
  fn constructs_with_configured_dimensions() {
    let embedder = LocalEmbedder::new(&config());
    assert_eq!(embedder.dimensions(), 1024);
    assert_eq!(embedder.model_name(), "qwen3-embedding-0.6b");
  }

  #[tokio::test]
  async fn unreachable_server_is_not_available() {
    let mut cfg = config();
    cfg.remote_url = "http://127.0.0.1:1".to_string();
    let embedder = LocalEmbedder::new(&cfg);
    assert!(!embedder.is_available().await);
  }
}
