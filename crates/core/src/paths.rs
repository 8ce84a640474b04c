//! Base directories shared by the pipeline, daemon, and CLI: where indexed
//! project data, user config, and downloaded model artifacts live on disk.

use std::path::PathBuf;

/// Base data directory holding per-project indexes and watcher locks.
///
/// Respects, in order of precedence:
/// 1. `AMANMCP_DATA_DIR` - explicit override
/// 2. `XDG_DATA_HOME` - standard XDG data home
/// 3. `dirs::data_local_dir()` - platform default
pub fn default_data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("AMANMCP_DATA_DIR") {
    return PathBuf::from(dir);
  }
  if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
    return PathBuf::from(xdg_data).join("amanmcp");
  }
  dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("amanmcp")
}

/// Base config directory. Config::user_config_path() resolves the file
/// within it directly; this is exposed for callers that need the directory
/// itself (e.g. to write a generated template).
///
/// Respects, in order of precedence:
/// 1. `AMANMCP_CONFIG_DIR` - explicit override
/// 2. `XDG_CONFIG_HOME` - standard XDG config home
/// 3. `dirs::config_dir()` - platform default
pub fn default_config_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("AMANMCP_CONFIG_DIR") {
    return PathBuf::from(dir);
  }
  if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
    return PathBuf::from(xdg_config).join("amanmcp");
  }
  dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("amanmcp")
}

/// Cache directory for downloaded model artifacts and other disposable state.
///
/// Respects `XDG_CACHE_HOME`, then falls back to `dirs::cache_dir()`.
pub fn default_cache_dir() -> PathBuf {
  if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
    return PathBuf::from(xdg_cache).join("amanmcp");
  }
  dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")).join("amanmcp")
}
