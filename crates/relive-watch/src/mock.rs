//! Mock file watcher for testing.
//!
//! Records every watch request and lets tests inject events by pattern.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::event::{WatchEvent, WatchEventReceiver, WatchHandle};
use crate::watcher::{FileWatcher, WatchError, WatchOptions};

type SharedSender = Arc<Mutex<Option<mpsc::UnboundedSender<WatchEvent>>>>;

struct Registration {
    pattern: String,
    options: WatchOptions,
    tx: SharedSender,
}

/// Clears the sender when the owning handle is dropped.
struct ClearOnDrop(SharedSender);

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        self.0.lock().unwrap().take();
    }
}

/// In-memory [`FileWatcher`].
///
/// Events are only delivered to watches whose handle is still alive.
#[derive(Default)]
pub struct MockWatcher {
    registrations: Mutex<Vec<Registration>>,
}

impl MockWatcher {
    /// Create a new mock watcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every open watch registered for `pattern`.
    ///
    /// Returns the number of watches that received the event.
    pub fn emit(&self, pattern: &str, event: WatchEvent) -> usize {
        let registrations = self.registrations.lock().unwrap();
        registrations
            .iter()
            .filter(|r| r.pattern == pattern)
            .filter(|r| {
                r.tx.lock()
                    .unwrap()
                    .as_ref()
                    .is_some_and(|tx| tx.send(event.clone()).is_ok())
            })
            .count()
    }

    /// Number of watches whose handle is still alive.
    #[must_use]
    pub fn open_count(&self) -> usize {
        let registrations = self.registrations.lock().unwrap();
        registrations
            .iter()
            .filter(|r| r.tx.lock().unwrap().is_some())
            .count()
    }

    /// Whether an open watch exists for `pattern`.
    #[must_use]
    pub fn is_watching(&self, pattern: &str) -> bool {
        let registrations = self.registrations.lock().unwrap();
        registrations
            .iter()
            .any(|r| r.pattern == pattern && r.tx.lock().unwrap().is_some())
    }

    /// Options passed with the most recent watch of `pattern`.
    #[must_use]
    pub fn options_for(&self, pattern: &str) -> Option<WatchOptions> {
        let registrations = self.registrations.lock().unwrap();
        registrations
            .iter()
            .rev()
            .find(|r| r.pattern == pattern)
            .map(|r| r.options.clone())
    }
}

impl FileWatcher for MockWatcher {
    fn watch(
        &self,
        pattern: &str,
        options: &WatchOptions,
    ) -> Result<(WatchEventReceiver, WatchHandle), WatchError> {
        glob::Pattern::new(pattern).map_err(|source| WatchError::Pattern {
            pattern: pattern.to_owned(),
            source,
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let tx: SharedSender = Arc::new(Mutex::new(Some(tx)));
        self.registrations.lock().unwrap().push(Registration {
            pattern: pattern.to_owned(),
            options: options.clone(),
            tx: Arc::clone(&tx),
        });

        Ok((WatchEventReceiver::new(rx), WatchHandle::new(ClearOnDrop(tx))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_emit_reaches_matching_watch() {
        let watcher = MockWatcher::new();
        let (mut rx, _handle) = watcher.watch("src/**/*", &WatchOptions::default()).unwrap();

        assert_eq!(watcher.emit("src/**/*", WatchEvent::change("src/a.js")), 1);
        assert_eq!(watcher.emit("other", WatchEvent::change("src/a.js")), 0);
        assert_eq!(rx.recv().await, Some(WatchEvent::change("src/a.js")));
    }

    #[tokio::test]
    async fn test_closed_handle_stops_delivery() {
        let watcher = MockWatcher::new();
        let (mut rx, handle) = watcher.watch("*.toml", &WatchOptions::default()).unwrap();
        assert!(watcher.is_watching("*.toml"));

        handle.close();

        assert!(!watcher.is_watching("*.toml"));
        assert_eq!(watcher.open_count(), 0);
        assert_eq!(watcher.emit("*.toml", WatchEvent::change("a.toml")), 0);
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_options_recorded() {
        let watcher = MockWatcher::new();
        let options = WatchOptions::default().with_cwd("public").with_initial();
        let _watch = watcher.watch("**/*.lnk", &options).unwrap();

        assert_eq!(watcher.options_for("**/*.lnk"), Some(options));
        assert_eq!(watcher.options_for("**/*.err*"), None);
    }
}
