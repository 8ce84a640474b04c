pub mod decompose;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod types;

pub use engine::SearchEngine;
pub use error::{Result, SearchError};
pub use fusion::{FusedCandidate, fuse_rrf, merge_fused};
pub use types::{ContentTypeFilter, Hit, HitExplain, SearchExplain, SearchOptions, SearchResponse};

/// Upper bound on query length in characters, rejected before any retrieval
/// work starts.
pub const MAX_QUERY_LEN: usize = 2048;

pub fn max_query_len() -> usize {
  MAX_QUERY_LEN
}
