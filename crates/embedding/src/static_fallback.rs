use sha2::{Digest, Sha256};

pub const STATIC_DIMENSIONS: usize = 256;

/// Deterministic content-hash-derived fallback embedder. Used for offline
/// operation and for bm25-only search paths that still need a placeholder
/// vector dimension, not as a semantic embedding — two equal strings always
/// produce identical vectors, and unrelated strings land at roughly uniform
/// random angles from one another.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticEmbedder;

impl StaticEmbedder {
  pub fn new() -> Self {
    Self
  }

  pub fn dimensions(&self) -> usize {
    STATIC_DIMENSIONS
  }

  pub fn model_name(&self) -> &str {
    "static-hash-v1"
  }

  /// Projects `text` into a fixed 256-dimensional subspace by hashing it
  /// with an incrementing round counter until enough bytes have been drawn,
  /// then maps each 4-byte group to a value in [-1, 1].
  pub fn embed_one(&self, text: &str) -> Vec<f32> {
    let mut values = Vec::with_capacity(STATIC_DIMENSIONS);
    let mut round: u32 = 0;
    while values.len() < STATIC_DIMENSIONS {
      let mut hasher = Sha256::new();
      hasher.update(text.as_bytes());
      hasher.update(round.to_le_bytes());
      let digest = hasher.finalize();
      for chunk in digest.chunks_exact(4) {
        if values.len() >= STATIC_DIMENSIONS {
          break;
        }
        let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let unit = bits as f64 / u32::MAX as f64;
        values.push((unit * 2.0 - 1.0) as f32);
      }
      round += 1;
    }
    values
  }
}
