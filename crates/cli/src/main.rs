use amanmcp_core::{Config, default_data_dir};
use clap::{Parser, Subcommand};
use daemon::{Client, Daemon, DaemonConfig as DaemonRuntimeConfig, default_socket_path, is_running, running_pid, spawn_background, stop};
use search::{ContentTypeFilter, SearchEngine, SearchOptions};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "amanmcp")]
#[command(about = "Hybrid lexical + dense-vector code and documentation search")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Scan, chunk, and embed a project into its search index
  Index {
    /// Project path (default: current directory)
    #[arg(short, long)]
    project: Option<PathBuf>,
    /// Discard the existing index and rebuild from scratch
    #[arg(long)]
    force: bool,
  },
  /// Query a project's index
  Search {
    query: String,
    /// Project path (default: current directory)
    #[arg(short, long)]
    project: Option<PathBuf>,
    #[arg(short, long, default_value = "10")]
    limit: usize,
    /// Restrict results to a content class: all, code, docs
    #[arg(long, default_value = "all")]
    filter: String,
    /// Restrict results to a single language (e.g. rust, python)
    #[arg(long)]
    language: Option<String>,
    /// Restrict results to files under this path prefix (repeatable)
    #[arg(long)]
    scope: Vec<String>,
    /// Skip the dense (vector) retrieval branch
    #[arg(long)]
    bm25_only: bool,
    /// Include per-hit retrieval explanations
    #[arg(long)]
    explain: bool,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Rebuild the vector index from durable embedding records, reclaiming tombstoned entries
  Compact {
    /// Project path (default: current directory)
    #[arg(short, long)]
    project: Option<PathBuf>,
  },
  /// Control the background daemon
  Daemon {
    #[command(subcommand)]
    action: DaemonAction,
  },
  /// Show or initialize configuration
  Config {
    /// Create a project-local config file (.amanmcp/config.toml)
    #[arg(long)]
    init: bool,
    /// Show the effective layered configuration
    #[arg(long)]
    show: bool,
  },
}

#[derive(Subcommand)]
enum DaemonAction {
  /// Start the daemon
  Start {
    /// Run in the foreground instead of detaching
    #[arg(long)]
    foreground: bool,
  },
  /// Stop a running daemon
  Stop,
  /// Query a running daemon's status
  Status,
}

fn init_cli_logging() {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
    .init();
}

/// Daemon logging writes to a rolling file under the data dir in addition to
/// stderr; every other command logs to stderr only.
fn init_daemon_logging() -> Option<WorkerGuard> {
  let log_dir = default_data_dir();
  if std::fs::create_dir_all(&log_dir).is_err() {
    init_cli_logging();
    return None;
  }

  let file_appender = tracing_appender::rolling::daily(&log_dir, "amanmcp.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
  let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
  let console_layer = tracing_subscriber::fmt::layer().with_target(true).with_ansi(true);
  let file_layer = tracing_subscriber::fmt::layer().with_target(true).with_ansi(false).with_writer(file_writer);

  tracing_subscriber::registry().with(env_filter).with(console_layer).with(file_layer).init();
  Some(guard)
}

fn resolve_project(project: Option<PathBuf>) -> anyhow::Result<PathBuf> {
  let root = match project {
    Some(p) => p,
    None => std::env::current_dir()?,
  };
  Ok(root.canonicalize().unwrap_or(root))
}

/// Prints a structured error's message and suggestion, then exits non-zero.
fn fail(err: amanmcp_core::Error) -> ! {
  error!("{err}");
  if let Some(suggestion) = &err.suggestion {
    eprintln!("suggestion: {suggestion}");
  }
  std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  let _guard = match &cli.command {
    Commands::Daemon { action: DaemonAction::Start { foreground: true } } => init_daemon_logging(),
    _ => {
      init_cli_logging();
      None
    }
  };

  match cli.command {
    Commands::Index { project, force } => cmd_index(project, force).await,
    Commands::Search { query, project, limit, filter, language, scope, bm25_only, explain, json } => {
      cmd_search(&query, project, limit, &filter, language.as_deref(), scope, bm25_only, explain, json).await
    }
    Commands::Compact { project } => cmd_compact(project).await,
    Commands::Daemon { action } => cmd_daemon(action).await,
    Commands::Config { init, show } => cmd_config(init, show),
  }
}

/// Runs a full index (or resumes an interrupted one) for a single project.
async fn cmd_index(project: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
  let root = resolve_project(project)?;
  let data_dir = default_data_dir();
  let config = Config::load_for_project(&root);

  if force {
    pipeline::Pipeline::force_rebuild(&data_dir, &root)
      .map_err(amanmcp_core::Error::from)
      .unwrap_or_else(|e| fail(e));
  }

  info!(project = %root.display(), "indexing project");
  let mut pipeline = pipeline::Pipeline::open(&root, &data_dir, config)
    .map_err(amanmcp_core::Error::from)
    .unwrap_or_else(|e| fail(e));

  let stats = pipeline
    .run_full(|progress| info!(scanned = progress.scanned, path = %progress.path.display(), "scanning"))
    .await
    .map_err(amanmcp_core::Error::from)
    .unwrap_or_else(|e| fail(e));
  pipeline.close().await.map_err(amanmcp_core::Error::from).unwrap_or_else(|e| fail(e));

  println!("Indexed {}", root.display());
  println!("  Files scanned:   {}", stats.files_scanned);
  println!("  Files changed:   {}", stats.files_changed);
  println!("  Files deleted:   {}", stats.files_deleted);
  println!("  Chunks upserted: {}", stats.chunks_upserted);
  println!("  Chunks deleted:  {}", stats.chunks_deleted);
  println!("  Chunks embedded: {}", stats.chunks_embedded);
  if stats.resumed {
    println!("  (resumed from checkpoint)");
  }

  Ok(())
}

/// Rebuilds the vector graph from durable embedding records.
async fn cmd_compact(project: Option<PathBuf>) -> anyhow::Result<()> {
  let root = resolve_project(project)?;
  let data_dir = default_data_dir();
  let config = Config::load_for_project(&root);

  let mut pipeline = pipeline::Pipeline::open(&root, &data_dir, config)
    .map_err(amanmcp_core::Error::from)
    .unwrap_or_else(|e| fail(e));
  pipeline.compact().map_err(amanmcp_core::Error::from).unwrap_or_else(|e| fail(e));
  pipeline.close().await.map_err(amanmcp_core::Error::from).unwrap_or_else(|e| fail(e));

  println!("Compacted {}", root.display());
  Ok(())
}

/// Searches a project, preferring a running daemon so the embedder and index
/// stay warm across invocations; falls back to a one-shot in-process engine.
#[allow(clippy::too_many_arguments)]
async fn cmd_search(
  query: &str,
  project: Option<PathBuf>,
  limit: usize,
  filter: &str,
  language: Option<&str>,
  scope: Vec<String>,
  bm25_only: bool,
  explain: bool,
  json_output: bool,
) -> anyhow::Result<()> {
  let root = resolve_project(project)?;
  let content_type_filter = parse_filter(filter).unwrap_or_else(|e| fail(e));
  let language = language.map(parse_language).transpose().unwrap_or_else(|e| fail(e));
  let scopes = if scope.is_empty() { None } else { Some(scope) };

  let socket_path = default_socket_path();
  let hits = if is_running(&socket_path) {
    search_via_daemon(&socket_path, query, &root, limit, content_type_filter, language, scopes, bm25_only, explain)
      .await
      .unwrap_or_else(|e| fail(e))
  } else {
    search_in_process(&root, query, limit, content_type_filter, language, scopes, bm25_only, explain)
      .await
      .unwrap_or_else(|e| fail(e))
  };

  if json_output {
    println!("{}", serde_json::to_string_pretty(&hits)?);
    return Ok(());
  }

  let hits = hits.as_array().cloned().unwrap_or_default();
  if hits.is_empty() {
    println!("No results for: {query}");
    return Ok(());
  }

  println!("Found {} results:\n", hits.len());
  for (i, hit) in hits.iter().enumerate() {
    let file = hit.get("file_path").and_then(|v| v.as_str()).unwrap_or("?");
    let start = hit.get("start_line").and_then(|v| v.as_u64()).unwrap_or(0);
    let end = hit.get("end_line").and_then(|v| v.as_u64()).unwrap_or(0);
    let score = hit.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0);
    println!("{}. {}:{}-{} (score {:.3})", i + 1, file, start, end, score);
    if let Some(content) = hit.get("content").and_then(|v| v.as_str()) {
      let preview = content.lines().take(3).collect::<Vec<_>>().join("\n   ");
      println!("   {preview}");
    }
    println!();
  }

  Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn search_via_daemon(
  socket_path: &std::path::Path,
  query: &str,
  root: &std::path::Path,
  limit: usize,
  content_type_filter: ContentTypeFilter,
  language: Option<amanmcp_core::Language>,
  scopes: Option<Vec<String>>,
  bm25_only: bool,
  explain: bool,
) -> Result<serde_json::Value, amanmcp_core::Error> {
  let mut client = Client::connect_to(socket_path)
    .await
    .map_err(|e| amanmcp_core::Error::new(amanmcp_core::ErrorKind::NetworkUnavailable, e.to_string()))?;

  let mut params = serde_json::json!({
    "query": query,
    "root_path": root.to_string_lossy(),
    "limit": limit,
    "filter": filter_name(content_type_filter),
    "bm25_only": bm25_only,
    "explain": explain,
  });
  if let Some(lang) = language {
    params["language"] = serde_json::to_value(lang).expect("Language serializes");
  }
  if let Some(scopes) = scopes {
    params["scopes"] = serde_json::json!(scopes);
  }

  let response = client
    .call("search", params)
    .await
    .map_err(|e| amanmcp_core::Error::new(amanmcp_core::ErrorKind::NetworkUnavailable, e.to_string()))?;

  if let Some(err) = response.error {
    return Err(amanmcp_core::Error::new(amanmcp_core::ErrorKind::SearchFailed, err.message));
  }
  Ok(response.result.unwrap_or(serde_json::Value::Array(vec![])))
}

#[allow(clippy::too_many_arguments)]
async fn search_in_process(
  root: &std::path::Path,
  query: &str,
  limit: usize,
  content_type_filter: ContentTypeFilter,
  language: Option<amanmcp_core::Language>,
  scopes: Option<Vec<String>>,
  bm25_only: bool,
  explain: bool,
) -> Result<serde_json::Value, amanmcp_core::Error> {
  let data_dir = default_data_dir();
  let config = Config::load_for_project(root);
  let engine = SearchEngine::open(root, &data_dir, config)?;

  let options = SearchOptions { limit, content_type_filter, language, scopes, bm25_only, explain };
  let response = engine.search_with_telemetry(query, &options).await?;
  engine.close().await?;
  Ok(serde_json::to_value(response.hits).expect("Hit serializes"))
}

fn filter_name(filter: ContentTypeFilter) -> &'static str {
  match filter {
    ContentTypeFilter::All => "all",
    ContentTypeFilter::Code => "code",
    ContentTypeFilter::Docs => "docs",
  }
}

fn parse_filter(s: &str) -> Result<ContentTypeFilter, amanmcp_core::Error> {
  serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
    .map_err(|_| amanmcp_core::Error::new(amanmcp_core::ErrorKind::InvalidInput, format!("unknown filter: {s}")))
}

fn parse_language(s: &str) -> Result<amanmcp_core::Language, amanmcp_core::Error> {
  serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
    .map_err(|_| amanmcp_core::Error::new(amanmcp_core::ErrorKind::InvalidInput, format!("unknown language: {s}")))
}

async fn cmd_daemon(action: DaemonAction) -> anyhow::Result<()> {
  match action {
    DaemonAction::Start { foreground: true } => {
      let config = DaemonRuntimeConfig::default();
      let mut daemon = Daemon::new(config);
      info!("starting daemon in foreground");
      daemon.run().await?;
      Ok(())
    }
    DaemonAction::Start { foreground: false } => {
      let socket_path = default_socket_path();
      if is_running(&socket_path) {
        println!("Daemon is already running");
        return Ok(());
      }
      spawn_background(&socket_path, Duration::from_secs(10)).await?;
      println!("Daemon started, listening on {}", socket_path.display());
      Ok(())
    }
    DaemonAction::Stop => {
      let Some(pid) = running_pid() else {
        println!("Daemon is not running");
        return Ok(());
      };
      let graceful = stop(pid, Duration::from_secs(5)).await;
      if graceful {
        println!("Daemon stopped");
      } else {
        println!("Daemon did not stop gracefully, sent SIGKILL");
      }
      Ok(())
    }
    DaemonAction::Status => {
      let socket_path = default_socket_path();
      if !is_running(&socket_path) {
        println!("Daemon:  NOT RUNNING");
        println!("Socket:  {}", socket_path.display());
        std::process::exit(1);
      }
      let mut client = Client::connect_to(&socket_path).await?;
      let response = client.call("status", serde_json::json!({})).await?;
      match response.result {
        Some(result) => {
          println!("Daemon:  RUNNING");
          println!("PID:     {}", result.get("pid").and_then(|v| v.as_u64()).unwrap_or(0));
          println!("Uptime:  {}s", result.get("uptime_secs").and_then(|v| v.as_u64()).unwrap_or(0));
          println!(
            "Embedder: {} ({})",
            result.get("embedder_type").and_then(|v| v.as_str()).unwrap_or("?"),
            result.get("embedder_status").and_then(|v| v.as_str()).unwrap_or("?")
          );
          println!("Projects loaded: {}", result.get("projects_loaded").and_then(|v| v.as_u64()).unwrap_or(0));
        }
        None => println!("Daemon:  RUNNING (status unavailable)"),
      }
      Ok(())
    }
  }
}

fn cmd_config(init: bool, show: bool) -> anyhow::Result<()> {
  let cwd = std::env::current_dir()?;

  if init {
    let config_path = Config::project_config_path(&cwd);
    if config_path.exists() {
      error!("Config file already exists: {}", config_path.display());
      std::process::exit(1);
    }
    if let Some(parent) = config_path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config_path, Config::generate_template())?;
    println!("Created project config: {}", config_path.display());
    return Ok(());
  }

  if show {
    let config = Config::load_for_project(&cwd);
    let project_path = Config::project_config_path(&cwd);
    let user_path = Config::user_config_path();

    println!("Effective configuration for: {}", cwd.display());
    if project_path.exists() {
      println!("Using project config: {}", project_path.display());
    } else if let Some(path) = user_path.filter(|p| p.exists()) {
      println!("Using user config: {}", path.display());
    } else {
      println!("Using default configuration (no config file found)");
    }
    println!();
    println!("{}", toml::to_string_pretty(&config)?);
    return Ok(());
  }

  println!("Usage:");
  println!("  amanmcp config --init   # create a project-local config file");
  println!("  amanmcp config --show   # show the effective configuration");
  Ok(())
}
