mod chunker;

pub use chunker::{ChunkError, Chunker, ChunkerConfig, classify_content_type, is_binary, sniff_comment_run};
