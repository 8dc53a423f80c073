//! File watcher abstraction.

use std::path::PathBuf;
use std::time::Duration;

use crate::event::{WatchEventReceiver, WatchHandle};

/// Options applied to a single watch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchOptions {
    /// Skip `Add` events for files that already match when the watch starts.
    pub ignore_initial: bool,
    /// Drop permission errors instead of logging them.
    pub ignore_permission_errors: bool,
    /// Directory the pattern and reported paths are relative to
    /// (`None` uses the process working directory).
    pub cwd: Option<PathBuf>,
    /// Poll the filesystem instead of using native notifications.
    pub use_polling: bool,
    /// Polling interval.
    pub interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            ignore_initial: true,
            ignore_permission_errors: true,
            cwd: None,
            use_polling: false,
            interval: Duration::from_millis(100),
        }
    }
}

impl WatchOptions {
    /// Set the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Report files that already exist as `Add` events.
    #[must_use]
    pub fn with_initial(mut self) -> Self {
        self.ignore_initial = false;
        self
    }
}

/// Watch error.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Invalid glob pattern.
    #[error("Invalid watch pattern {pattern:?}: {source}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        /// Parser error.
        #[source]
        source: glob::PatternError,
    },

    /// Backend failure.
    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The orchestrator has been torn down and cannot arm new watches.
    #[error("Watcher has been torn down")]
    TornDown,

    /// A build action failed.
    #[error("Build action failed: {0}")]
    Action(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Source of filesystem change events.
///
/// Implementations deliver `Add`/`Change`/`Unlink` events for files matching
/// a glob pattern until the returned [`WatchHandle`] is closed.
pub trait FileWatcher: Send + Sync {
    /// Start watching `pattern`.
    fn watch(
        &self,
        pattern: &str,
        options: &WatchOptions,
    ) -> Result<(WatchEventReceiver, WatchHandle), WatchError>;
}
