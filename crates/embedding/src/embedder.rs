use crate::error::{EmbeddingError, Result};
use crate::local::LocalEmbedder;
use crate::remote::RemoteEmbedder;
use crate::static_fallback::StaticEmbedder;
use amanmcp_core::config::{EmbedderVariant, EmbeddingConfig};

/// Facade over the three embedding backends, selected once at construction
/// time from configuration rather than dispatched through a trait object.
pub enum Embedder {
  Local(LocalEmbedder),
  Remote(RemoteEmbedder),
  Static(StaticEmbedder),
}

impl Embedder {
  pub fn open(config: &EmbeddingConfig) -> Result<Self> {
    match config.variant {
      EmbedderVariant::Local => Ok(Embedder::Local(LocalEmbedder::new(config))),
      EmbedderVariant::Remote => Ok(Embedder::Remote(RemoteEmbedder::new(config)?)),
      EmbedderVariant::Static => Ok(Embedder::Static(StaticEmbedder::new())),
    }
  }

  pub fn dimensions(&self) -> usize {
    match self {
      Embedder::Local(e) => e.dimensions(),
      Embedder::Remote(e) => e.dimensions(),
      Embedder::Static(e) => e.dimensions(),
    }
  }

  pub fn model_name(&self) -> &str {
    match self {
      Embedder::Local(e) => e.model_name(),
      Embedder::Remote(e) => e.model_name(),
      Embedder::Static(e) => e.model_name(),
    }
  }

  pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
    let raw = match self {
      Embedder::Local(e) => e.embed_one(text).await?,
      Embedder::Remote(e) => e.embed_one(text).await?,
      Embedder::Static(e) => e.embed_one(text),
    };
    Ok(normalize(raw))
  }

  pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
    let raw = match self {
      Embedder::Local(e) => e.embed_batch(texts).await?,
      Embedder::Remote(e) => e.embed_batch(texts).await?,
      Embedder::Static(e) => texts.iter().map(|t| e.embed_one(t)).collect(),
    };
    Ok(raw.into_iter().map(normalize).collect())
  }

  /// Backends hold only a pooled HTTP client and in-memory state, so closing
  /// is a no-op kept for interface symmetry with the lexical/vector stores.
  pub async fn close(&self) -> Result<()> {
    Ok(())
  }
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
  let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
  if norm > 1e-12 {
    for x in &mut v {
      *x /= norm;
    }
  }
  v
}

#[cfg(test)]
mod tests {
  use super::*;
  use amanmcp_core::config::ThermalConfig;

  fn static_config() -> EmbeddingConfig {
    EmbeddingConfig {
      variant: EmbedderVariant::Static,
      remote_url: String::new(),
      model: "static".to_string(),
      dimensions: 1024,
      thermal: ThermalConfig::default(),
    }
  }

  #[tokio::test]
  async fn static_embedder_produces_unit_vectors() {
    let embedder = Embedder::open(&static_config()).unwrap();
    let vector = embedder.embed_one("search query").await.unwrap();
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-4);
    assert_eq!(embedder.dimensions(), 256);
  }

  #[tokio::test]
  async fn static_embedder_batch_matches_single() {
    let embedder = Embedder::open(&static_config()).unwrap();
    let batch = embedder.embed_batch(&["a", "b"]).await.unwrap();
    let single_a = embedder.embed_one("a").await.unwrap();
    assert_eq!(batch[0], single_a);
  }

  #[test]
  fn remote_without_api_key_fails_to_open() {
    unsafe {
      std::env::remove_var("AMANMCP_REMOTE_API_KEY");
    }
    let mut config = static_config();
    config.variant = EmbedderVariant::Remote;
    assert!(matches!(Embedder::open(&config), Err(EmbeddingError::NotAvailable)));
  }
}
