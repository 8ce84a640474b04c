mod embedder;
mod error;
mod local;
mod remote;
mod static_fallback;

pub use embedder::Embedder;
pub use error::{EmbeddingError, Result, is_retryable};
pub use local::LocalEmbedder;
pub use remote::RemoteEmbedder;
pub use static_fallback::{STATIC_DIMENSIONS, StaticEmbedder};
