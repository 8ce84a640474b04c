pub mod chunk;
pub mod config;
pub mod error;
pub mod paths;
pub mod project;
pub mod retry;
pub mod validation;

pub use chunk::{
  CHARS_PER_TOKEN, CHUNK_ID_VERSION, Checkpoint, Chunk, ContentType, EmbeddingRecord, File, LEGACY_CHUNK_ID_VERSION,
  Language, PipelineStage, QueryTelemetry, StoreStateMap,
};
pub use config::{
  Config, DaemonConfig, EmbedderVariant, EmbeddingConfig, IndexConfig, LexicalBackend, SearchConfig, ThermalConfig,
};
pub use error::{Category, Error, ErrorKind, Result, Severity};
pub use paths::{default_cache_dir, default_config_dir, default_data_dir};
pub use project::{ProjectId, ProjectMetadata, find_git_root, resolve_project_path};
pub use retry::{CircuitBreaker, CircuitState, RetryConfig, retry};
pub use validation::{
  ValidationError, ValidationResult, optional_array, optional_bool, optional_enum, optional_f64, optional_f64_range,
  optional_i64, optional_i64_range, optional_string, optional_string_array, optional_string_min, optional_u64,
  require_array, require_bool, require_enum, require_f64, require_f64_range, require_i64, require_i64_range,
  require_string, require_string_array, require_string_min, require_string_range, require_u64,
};
