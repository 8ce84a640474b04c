use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Characters per token estimate, used for quick token-budget accounting
/// without invoking a real tokenizer.
pub const CHARS_PER_TOKEN: usize = 4;

/// The chunk id scheme currently produced by the chunker. Persisted in the
/// store state map as `chunk_id_version` so a pipeline run can tell whether
/// an on-disk index predates content-addressing and refuse to resume it.
pub const CHUNK_ID_VERSION: &str = "content-sha256-v1";

/// The legacy, position-addressed chunk id scheme. Recognizable so the
/// pipeline can detect and refuse to resume it, but never produced by new
/// code.
pub const LEGACY_CHUNK_ID_VERSION: &str = "position-v0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  TypeScript,
  JavaScript,
  Tsx,
  Jsx,
  Html,
  Css,
  Scss,
  Sass,
  Less,
  Rust,
  Python,
  Go,
  Java,
  Kotlin,
  Scala,
  CSharp,
  Cpp,
  C,
  Swift,
  Ruby,
  Php,
  Lua,
  Elixir,
  Haskell,
  Ocaml,
  Clojure,
  Zig,
  Nim,
  Json,
  Yaml,
  Toml,
  Xml,
  Markdown,
  Shell,
  Sql,
  Dockerfile,
  GraphQL,
  Proto,
  PlainText,
}

impl Language {
  pub fn from_extension(ext: &str) -> Option<Self> {
    match ext.to_lowercase().as_str() {
      "ts" | "mts" => Some(Language::TypeScript),
      "js" | "mjs" | "cjs" => Some(Language::JavaScript),
      "tsx" => Some(Language::Tsx),
      "jsx" => Some(Language::Jsx),
      "html" | "htm" => Some(Language::Html),
      "css" => Some(Language::Css),
      "scss" => Some(Language::Scss),
      "sass" => Some(Language::Sass),
      "less" => Some(Language::Less),
      "rs" => Some(Language::Rust),
      "py" | "pyi" | "pyw" => Some(Language::Python),
      "go" => Some(Language::Go),
      "java" => Some(Language::Java),
      "kt" | "kts" => Some(Language::Kotlin),
      "scala" | "sc" => Some(Language::Scala),
      "cs" => Some(Language::CSharp),
      "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "h" => Some(Language::Cpp),
      "c" => Some(Language::C),
      "swift" => Some(Language::Swift),
      "rb" | "rake" => Some(Language::Ruby),
      "php" => Some(Language::Php),
      "lua" => Some(Language::Lua),
      "ex" | "exs" => Some(Language::Elixir),
      "hs" => Some(Language::Haskell),
      "ml" | "mli" => Some(Language::Ocaml),
      "clj" | "cljs" | "cljc" | "edn" => Some(Language::Clojure),
      "zig" => Some(Language::Zig),
      "nim" => Some(Language::Nim),
      "json" | "jsonc" => Some(Language::Json),
      "yaml" | "yml" => Some(Language::Yaml),
      "toml" => Some(Language::Toml),
      "xml" | "xsd" | "xsl" | "svg" => Some(Language::Xml),
      "md" | "markdown" | "rst" | "adoc" => Some(Language::Markdown),
      "sh" | "bash" | "zsh" | "fish" => Some(Language::Shell),
      "sql" => Some(Language::Sql),
      "dockerfile" => Some(Language::Dockerfile),
      "graphql" | "gql" => Some(Language::GraphQL),
      "proto" => Some(Language::Proto),
      "txt" => Some(Language::PlainText),
      _ => None,
    }
  }

  /// The content type a file of this language defaults to, absent any
  /// finer-grained sub-chunk classification (e.g. a detected comment run).
  pub fn default_content_type(&self) -> ContentType {
    match self {
      Language::Markdown | Language::PlainText => ContentType::Docs,
      Language::Json | Language::Yaml | Language::Toml | Language::Xml => ContentType::Data,
      _ => ContentType::Code,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
  Code,
  Docs,
  Comment,
  Data,
}

/// A contiguous, content-addressed slice of a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
  pub id: String,
  pub file_id: String,
  pub file_path: String,
  pub start_line: u32,
  pub end_line: u32,
  pub content: String,
  pub content_type: ContentType,
  pub language: Language,
  pub tokens_estimate: u32,
}

impl Chunk {
  /// Content-addressed id: SHA-256 over `{file_path, content_type, language, content_bytes}`.
  /// Identical content at the same path and classification always yields the
  /// same id regardless of its position in the file.
  pub fn compute_id(file_path: &str, content_type: ContentType, language: Language, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    hasher.update([0u8]);
    hasher.update(format!("{:?}", content_type).as_bytes());
    hasher.update([0u8]);
    hasher.update(format!("{:?}", language).as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
  }

  pub fn new(
    file_id: impl Into<String>,
    file_path: impl Into<String>,
    start_line: u32,
    end_line: u32,
    content: impl Into<String>,
    content_type: ContentType,
    language: Language,
  ) -> Self {
    let file_path = file_path.into();
    let content = content.into();
    let id = Self::compute_id(&file_path, content_type, language, &content);
    let tokens_estimate = (content.len() / CHARS_PER_TOKEN) as u32;
    Self {
      id,
      file_id: file_id.into(),
      file_path,
      start_line,
      end_line,
      content,
      content_type,
      language,
      tokens_estimate,
    }
  }
}

/// A scanned, indexed source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
  pub id: String,
  pub project_id: String,
  pub relative_path: String,
  pub language: Option<Language>,
  pub size_bytes: u64,
  pub content_hash: String,
  pub last_modified: DateTime<Utc>,
}

impl File {
  pub fn derive_id(project_id: &str, relative_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(relative_path.as_bytes());
    hex::encode(&hasher.finalize()[..8])
  }
}

/// A stored embedding, addressed by the chunk it was computed for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
  pub chunk_id: String,
  pub model_id: String,
  pub dimensions: usize,
  pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
  Scanning,
  Chunking,
  Embedding,
  Persisting,
  Done,
}

/// Resumable progress marker for one indexing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
  pub stage: PipelineStage,
  pub embedded_count: u64,
  pub total: u64,
  pub embedder_model: String,
  pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
  pub fn new(total: u64, embedder_model: impl Into<String>) -> Self {
    Self {
      stage: PipelineStage::Scanning,
      embedded_count: 0,
      total,
      embedder_model: embedder_model.into(),
      updated_at: Utc::now(),
    }
  }

  pub fn is_resumable_against(&self, current_model: &str) -> bool {
    self.embedder_model == current_model && self.stage != PipelineStage::Done
  }
}

/// Typed key-value pairs persisted in the metadata store describing the
/// on-disk shape of the two retrieval indexes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStateMap {
  pub chunk_id_version: Option<String>,
  pub index_model: Option<String>,
  pub index_backend: Option<String>,
  pub index_dimensions: Option<usize>,
  pub created_at: Option<DateTime<Utc>>,
}

impl StoreStateMap {
  pub fn is_content_addressed(&self) -> bool {
    self.chunk_id_version.as_deref() == Some(CHUNK_ID_VERSION)
  }

  pub fn dimension_mismatch(&self, current_dimensions: usize) -> bool {
    matches!(self.index_dimensions, Some(d) if d != current_dimensions)
  }
}

/// Append-only record of one search invocation, for the query telemetry log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTelemetry {
  pub query: String,
  pub timestamp: DateTime<Utc>,
  pub latency_ms: u64,
  pub result_count: usize,
  pub query_type: String,
  pub zero_result: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_chunk_id_is_content_addressed() {
    let a = Chunk::new("f1", "a.rs", 1, 3, "fn main() {}", ContentType::Code, Language::Rust);
    let b = Chunk::new("f2", "a.rs", 10, 12, "fn main() {}", ContentType::Code, Language::Rust);
    assert_eq!(a.id, b.id, "identical content+path+type+lang must share an id regardless of position");
  }

  #[test]
  fn test_chunk_id_changes_with_path() {
    let a = Chunk::new("f1", "a.rs", 1, 3, "fn main() {}", ContentType::Code, Language::Rust);
    let b = Chunk::new("f1", "b.rs", 1, 3, "fn main() {}", ContentType::Code, Language::Rust);
    assert_ne!(a.id, b.id);
  }

  #[test]
  fn test_chunk_id_changes_with_content_type() {
    let a = Chunk::new("f1", "a.rs", 1, 3, "hello", ContentType::Code, Language::Rust);
    let b = Chunk::new("f1", "a.rs", 1, 3, "hello", ContentType::Comment, Language::Rust);
    assert_ne!(a.id, b.id);
  }

  #[test]
  fn test_checkpoint_resume_eligibility() {
    let mut cp = Checkpoint::new(100, "model-a");
    assert!(cp.is_resumable_against("model-a"));
    assert!(!cp.is_resumable_against("model-b"));
    cp.stage = PipelineStage::Done;
    assert!(!cp.is_resumable_against("model-a"));
  }

  #[test]
  fn test_store_state_dimension_mismatch() {
    let mut state = StoreStateMap::default();
    assert!(!state.dimension_mismatch(768));
    state.index_dimensions = Some(1024);
    assert!(state.dimension_mismatch(768));
    assert!(!state.dimension_mismatch(1024));
  }

  #[test]
  fn test_file_id_derivation_is_stable() {
    let a = File::derive_id("proj1", "src/main.rs");
    let b = File::derive_id("proj1", "src/main.rs");
    let c = File::derive_id("proj1", "src/lib.rs");
    assert_eq!(a, b);
    assert_ne!(a, c);
  }
}
