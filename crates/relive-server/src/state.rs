//! Application state.
//!
//! Shared state for all request handlers.

use std::path::PathBuf;
use std::sync::Arc;

use crate::live::LiveRegistry;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Live asset registry for the served web root.
    pub(crate) live: Arc<LiveRegistry>,
    /// Directory static files and templates are served from.
    pub(crate) web_root: PathBuf,
    /// Template extension rendered through the registry (`None` disables).
    pub(crate) view: Option<String>,
}

impl AppState {
    /// Check whether `extension` names a template.
    #[must_use]
    pub(crate) fn is_template(&self, extension: &str) -> bool {
        self.view.as_deref() == Some(extension)
    }

    /// File served for directory requests.
    #[must_use]
    pub(crate) fn index_file(&self) -> String {
        format!(
            "index.{}",
            self.view
                .as_deref()
                .unwrap_or(relive_config::DEFAULT_VIEW_EXTENSION)
        )
    }
}
