//! Live asset registry.
//!
//! Tracks which built file each asset key currently points at, and which
//! build errors are outstanding, by watching marker files under the web root:
//!
//! - `<asset>.lnk`: content is the path of the built artifact, relative to
//!   the marker's directory
//! - `<name>.err*`: content is diagnostic text; empty or missing means no error
//!
//! Changes visible to development pages are pushed to every connected live
//! channel as `{"live": {..}, "errors": [..]}`.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, Weak};
use std::time::Duration;

use regex::{Captures, Regex};
use relive_watch::{
    FileWatcher, WatchError, WatchEventKind, WatchEventReceiver, WatchHandle, WatchOptions,
};
use serde::Serialize;

use super::paths;
use super::stream::{LiveSender, LiveStream, SubscriberSet, open_channel};

/// Glob for link markers.
pub const LINK_PATTERN: &str = "**/*.lnk";

/// Glob for error markers.
pub const ERROR_PATTERN: &str = "**/*.err*";

/// Environment variable consulted when the mode is not set explicitly.
pub const ENV_VAR: &str = "RELIVE_ENV";

/// Delay after which production mode stops watching.
pub const PRODUCTION_GRACE: Duration = Duration::from_secs(60);

/// Substituted target for keys missing from the active view.
const UNRESOLVED_TARGET: &str = "undefined";

static DATA_LIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-live-([A-Za-z0-9_-]+)=(?:'([^']*)'|"([^"]*)")"#)
        .expect("data-live pattern is valid")
});

/// Which asset view pages are rendered against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    /// Resolve from an explicit flag, falling back to `RELIVE_ENV`.
    #[must_use]
    pub fn resolve(explicit: Option<bool>) -> Self {
        match explicit {
            Some(production) => Self::from_flag(production),
            None => Self::from_env_value(std::env::var(ENV_VAR).ok().as_deref()),
        }
    }

    fn from_flag(production: bool) -> Self {
        if production {
            Self::Production
        } else {
            Self::Development
        }
    }

    fn from_env_value(value: Option<&str>) -> Self {
        Self::from_flag(value == Some("production"))
    }

    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Options for [`LiveRegistry::initialize`].
#[derive(Clone, Debug, Default)]
pub struct LiveOptions {
    /// Explicit production flag (`None` consults the environment).
    pub production: Option<bool>,
    /// Poll the filesystem instead of using native notifications.
    pub use_polling: bool,
    /// Polling interval.
    pub interval: Option<Duration>,
}

/// Message pushed to live channels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LivePayload {
    /// Development view snapshot.
    pub live: BTreeMap<String, String>,
    /// Outstanding build errors, ordered by marker name.
    pub errors: Vec<String>,
}

/// Recipients of [`LiveRegistry::send_change`].
#[derive(Clone, Copy, Debug)]
pub enum Targets<'a> {
    /// Every connected channel.
    All,
    One(&'a LiveSender),
    Many(&'a [LiveSender]),
}

#[derive(Debug, Default)]
struct LiveState {
    development: BTreeMap<String, String>,
    production: BTreeMap<String, String>,
    errors: BTreeMap<String, String>,
}

impl LiveState {
    fn payload(&self) -> LivePayload {
        LivePayload {
            live: self.development.clone(),
            errors: self.errors.values().cloned().collect(),
        }
    }
}

/// Asset views, error records and live channels for one web root.
pub struct LiveRegistry {
    web_root: PathBuf,
    mode: Mode,
    state: Mutex<LiveState>,
    subscribers: Arc<SubscriberSet>,
    watches: Mutex<Vec<WatchHandle>>,
}

impl LiveRegistry {
    /// Create a registry without any watches.
    #[must_use]
    pub fn new(web_root: impl Into<PathBuf>, mode: Mode) -> Self {
        Self {
            web_root: web_root.into(),
            mode,
            state: Mutex::new(LiveState::default()),
            subscribers: Arc::new(SubscriberSet::new()),
            watches: Mutex::new(Vec::new()),
        }
    }

    /// Create a registry and start watching marker files under `web_root`.
    ///
    /// Link markers are always watched. Error markers are watched only in
    /// development. In production every watch is closed after
    /// [`PRODUCTION_GRACE`].
    pub fn initialize(
        web_root: impl Into<PathBuf>,
        options: &LiveOptions,
        watcher: &dyn FileWatcher,
    ) -> Result<Arc<Self>, WatchError> {
        let registry = Arc::new(Self::new(web_root, Mode::resolve(options.production)));

        let mut watch_options = WatchOptions::default()
            .with_cwd(&registry.web_root)
            .with_initial();
        watch_options.use_polling = options.use_polling;
        if let Some(interval) = options.interval {
            watch_options.interval = interval;
        }

        let (rx, handle) = watcher.watch(LINK_PATTERN, &watch_options)?;
        registry.watches.lock().unwrap().push(handle);
        spawn_dispatch(Arc::downgrade(&registry), rx, Marker::Link);

        if registry.mode.is_production() {
            let weak = Arc::downgrade(&registry);
            tokio::spawn(async move {
                tokio::time::sleep(PRODUCTION_GRACE).await;
                if let Some(registry) = weak.upgrade() {
                    registry.close_watches();
                    tracing::info!("Asset manifest settled, stopped watching");
                }
            });
        } else {
            let (rx, handle) = watcher.watch(ERROR_PATTERN, &watch_options)?;
            registry.watches.lock().unwrap().push(handle);
            spawn_dispatch(Arc::downgrade(&registry), rx, Marker::Error);
        }

        tracing::info!(
            web_root = %registry.web_root.display(),
            mode = ?registry.mode,
            "Live asset registry initialized"
        );
        Ok(registry)
    }

    #[must_use]
    pub fn web_root(&self) -> &Path {
        &self.web_root
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Connected live channels.
    #[must_use]
    pub fn subscribers(&self) -> &Arc<SubscriberSet> {
        &self.subscribers
    }

    /// Open a live channel registered with this registry.
    pub fn subscribe(&self) -> (LiveSender, LiveStream) {
        open_channel(Some(&self.subscribers))
    }

    /// Stop watching marker files.
    pub fn close_watches(&self) {
        for handle in self.watches.lock().unwrap().drain(..) {
            handle.close();
        }
    }

    /// Number of open marker watches.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.watches.lock().unwrap().len()
    }

    /// Development view snapshot.
    #[must_use]
    pub fn development(&self) -> BTreeMap<String, String> {
        self.state.lock().unwrap().development.clone()
    }

    /// Production view snapshot.
    #[must_use]
    pub fn production(&self) -> BTreeMap<String, String> {
        self.state.lock().unwrap().production.clone()
    }

    /// Outstanding errors, ordered by marker name.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.state.lock().unwrap().payload().errors
    }

    /// Current broadcast payload.
    #[must_use]
    pub fn payload(&self) -> LivePayload {
        self.state.lock().unwrap().payload()
    }

    /// Apply a link marker at `marker` (relative to the web root).
    ///
    /// Minified markers update the production view under both the key and its
    /// de-minified alias, silently. Other markers update the development view
    /// and broadcast if the target changed.
    pub async fn update_watched_lnk(&self, marker: &Path) {
        let Some(key) = paths::asset_key(marker) else {
            return;
        };
        let content = match tokio::fs::read_to_string(self.web_root.join(marker)).await {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %marker.display(), error = %err, "Failed to read link marker");
                return;
            }
        };
        let target = paths::link_target(marker, content.trim());

        if let Some(alias) = paths::minified_alias(&key) {
            let mut state = self.state.lock().unwrap();
            tracing::debug!(key = %key, alias = %alias, target = %target, "Production asset linked");
            state.production.insert(alias, target.clone());
            state.production.insert(key, target);
            return;
        }

        let changed = {
            let mut state = self.state.lock().unwrap();
            let previous = state.development.insert(key.clone(), target.clone());
            previous.as_deref() != Some(target.as_str())
        };
        if changed {
            tracing::debug!(key = %key, target = %target, "Asset linked");
            self.send_change(Targets::All);
        }
    }

    /// Apply an error marker at `marker` (relative to the web root).
    ///
    /// A missing file counts as empty. Other read failures leave state alone.
    pub async fn update_watched_err(&self, marker: &Path) {
        let content = match tokio::fs::read_to_string(self.web_root.join(marker)).await {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => {
                tracing::warn!(path = %marker.display(), error = %err, "Failed to read error marker");
                return;
            }
        };
        let name = paths::to_posix(marker);
        let message = content.trim_end();

        let changed = {
            let mut state = self.state.lock().unwrap();
            if message.is_empty() {
                state.errors.remove(&name).is_some()
            } else {
                let previous = state.errors.insert(name.clone(), message.to_owned());
                previous.as_deref() != Some(message)
            }
        };
        if changed {
            tracing::debug!(marker = %name, cleared = message.is_empty(), "Build error updated");
            self.send_change(Targets::All);
        }
    }

    /// Push the current state to `targets`. Returns the number of writes
    /// attempted.
    pub fn send_change(&self, targets: Targets<'_>) -> usize {
        let state = self.state.lock().unwrap();
        let payload = state.payload();
        match targets {
            Targets::All => self.subscribers.broadcast(&payload),
            Targets::One(sender) => usize::from(sender.send(&payload)),
            Targets::Many(senders) => senders.iter().filter(|s| s.send(&payload)).count(),
        }
    }

    /// Rewrite `data-live-<attr>='<path>'` attributes in page source.
    ///
    /// Each match becomes `<attr>='<target>' data-live='<attr> <key>'`, where
    /// the target is looked up in the active view. Unknown keys render as
    /// `undefined`.
    #[must_use]
    pub fn replace_data_live(&self, source: &str) -> String {
        let state = self.state.lock().unwrap();
        let view = match self.mode {
            Mode::Development => &state.development,
            Mode::Production => &state.production,
        };

        DATA_LIVE_RE
            .replace_all(source, |caps: &Captures<'_>| {
                let attr = &caps[1];
                let (quote, path) = match (caps.get(2), caps.get(3)) {
                    (Some(single), _) => ('\'', single.as_str()),
                    (None, Some(double)) => ('"', double.as_str()),
                    (None, None) => ('\'', ""),
                };
                let key = paths::request_key(path);
                let target = view.get(&key).map_or_else(
                    || {
                        tracing::debug!(key = %key, "No live asset for key");
                        UNRESOLVED_TARGET
                    },
                    String::as_str,
                );
                format!("{attr}={quote}{target}{quote} data-live={quote}{attr} {key}{quote}")
            })
            .into_owned()
    }
}

#[derive(Clone, Copy, Debug)]
enum Marker {
    Link,
    Error,
}

/// Feed marker events into the registry, one at a time.
fn spawn_dispatch(registry: Weak<LiveRegistry>, mut rx: WatchEventReceiver, marker: Marker) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Some(registry) = registry.upgrade() else {
                break;
            };
            match (marker, event.kind) {
                (Marker::Link, WatchEventKind::Add | WatchEventKind::Change) => {
                    registry.update_watched_lnk(&event.path).await;
                }
                (Marker::Link, WatchEventKind::Unlink) => {}
                (Marker::Error, _) => registry.update_watched_err(&event.path).await,
            }
        }
    });
}
