pub mod coordination;
pub mod debounce;
pub mod error;
pub mod gitignore;
pub mod orchestrator;
pub mod scanner;
pub mod watcher;

pub use coordination::{CoordinationError, WatcherCoordinator, WatcherLock};
pub use debounce::{BatchProcessor, DebounceConfig, DebouncedWatcher};
pub use error::{PipelineError, Result};
pub use gitignore::{GitignoreState, compute_gitignore_hash, should_ignore};
pub use orchestrator::{Pipeline, PipelineStats, run_once};
pub use scanner::{ScanError, ScanProgress, ScanResult, ScannedFile, Scanner};
pub use watcher::{ChangeKind, FileChange, FileWatcher, WatchError};
