//! CLI error types.

use std::path::PathBuf;

use relive_build::BuildError;
use relive_config::ConfigError;
use relive_server::ServerError;
use relive_watch::WatchError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Build(#[from] BuildError),

    #[error("{0}")]
    Watch(#[from] WatchError),

    #[error("{0}")]
    Server(#[from] ServerError),

    #[error("Build failed, see {}", .0.display())]
    BuildFailed(PathBuf),
}
