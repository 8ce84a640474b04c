//! Layered configuration: compiled-in defaults, overridden by a user-global
//! TOML file, overridden by a project-local TOML file. Neither file is
//! required.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderVariant {
  #[default]
  Local,
  Remote,
  Static,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
  /// Per-batch deadlines tried in order as prior deadlines time out.
  #[serde(with = "duration_vec_secs")]
  pub timeout_progression: Vec<Duration>,
  pub retry_timeout_multiplier: f64,
  #[serde(with = "duration_secs")]
  pub inter_batch_delay: Duration,
}

impl Default for ThermalConfig {
  fn default() -> Self {
    Self {
      timeout_progression: vec![Duration::from_secs(10), Duration::from_secs(30), Duration::from_secs(60)],
      retry_timeout_multiplier: 2.0,
      inter_batch_delay: Duration::from_millis(100),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
  pub variant: EmbedderVariant,
  /// Endpoint for the Remote variant.
  pub remote_url: String,
  pub model: String,
  pub dimensions: usize,
  pub thermal: ThermalConfig,
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      variant: EmbedderVariant::Local,
      remote_url: "http://localhost:11434".to_string(),
      model: "qwen3-embedding-0.6b".to_string(),
      dimensions: 1024,
      thermal: ThermalConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
  pub rrf_k: u32,
  pub bm25_weight: f64,
  pub vector_weight: f64,
  pub max_chunks_per_file: usize,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      rrf_k: 60,
      bm25_weight: 0.5,
      vector_weight: 0.5,
      max_chunks_per_file: 2,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LexicalBackend {
  #[default]
  SingleFile,
  Legacy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
  pub target_chunk_tokens: usize,
  pub min_chunk_tokens: usize,
  pub max_chunk_tokens: usize,
  pub max_file_size_bytes: u64,
  pub lexical_backend: LexicalBackend,
}

impl Default for IndexConfig {
  fn default() -> Self {
    Self {
      target_chunk_tokens: 400,
      min_chunk_tokens: 50,
      max_chunk_tokens: 800,
      max_file_size_bytes: 1024 * 1024,
      lexical_backend: LexicalBackend::SingleFile,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
  pub socket_path: Option<PathBuf>,
  pub idle_timeout_secs: u64,
  pub max_projects_cached: usize,
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      socket_path: None,
      idle_timeout_secs: 1800,
      max_projects_cached: 8,
    }
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub embedding: EmbeddingConfig,
  pub search: SearchConfig,
  pub index: IndexConfig,
  pub daemon: DaemonConfig,
}

impl Config {
  /// Load layered config: project-local (`<project_root>/.amanmcp/config.toml`)
  /// overrides user-global (`$XDG_CONFIG_HOME/amanmcp/config.toml`), which
  /// overrides compiled-in defaults. Absence of either file is not an error.
  pub fn load_for_project(project_root: &Path) -> Self {
    let mut config = Self::default();

    if let Some(user_path) = Self::user_config_path()
      && let Ok(content) = std::fs::read_to_string(&user_path)
      && let Ok(parsed) = toml::from_str::<Config>(&content)
    {
      config = parsed;
    }

    let project_path = Self::project_config_path(project_root);
    if project_path.exists()
      && let Ok(content) = std::fs::read_to_string(&project_path)
      && let Ok(parsed) = toml::from_str::<Config>(&content)
    {
      config = parsed;
    }

    config
  }

  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("amanmcp").join("config.toml"));
    }
    dirs::config_dir().map(|p: PathBuf| p.join("amanmcp").join("config.toml"))
  }

  pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".amanmcp").join("config.toml")
  }

  pub fn needs_reembedding(&self, stored_dimensions: usize) -> bool {
    self.embedding.dimensions != stored_dimensions
  }

  pub fn generate_template() -> String {
    r#"# amanmcp configuration
# Place in .amanmcp/config.toml (project) or $XDG_CONFIG_HOME/amanmcp/config.toml (user)

[embedding]
variant = "local"       # local, remote, static
remote_url = "http://localhost:11434"
model = "qwen3-embedding-0.6b"
dimensions = 1024

[embedding.thermal]
retry_timeout_multiplier = 2.0

[search]
rrf_k = 60
bm25_weight = 0.5
vector_weight = 0.5
max_chunks_per_file = 2

[index]
target_chunk_tokens = 400
min_chunk_tokens = 50
max_chunk_tokens = 800
max_file_size_bytes = 1048576
lexical_backend = "single_file"

[daemon]
idle_timeout_secs = 1800
max_projects_cached = 8
"#
    .to_string()
  }
}

mod duration_secs {
  use serde::{Deserialize, Deserializer, Serializer};
  use std::time::Duration;

  pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    Ok(Duration::from_secs_f64(f64::deserialize(d)?))
  }
}

mod duration_vec_secs {
  use serde::{Deserialize, Deserializer, Serializer};
  use std::time::Duration;

  pub fn serialize<S: Serializer>(v: &[Duration], s: S) -> Result<S::Ok, S::Error> {
    let secs: Vec<f64> = v.iter().map(|d| d.as_secs_f64()).collect();
    secs.serialize(s)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
    let secs = Vec::<f64>::deserialize(d)?;
    Ok(secs.into_iter().map(Duration::from_secs_f64).collect())
  }
}
