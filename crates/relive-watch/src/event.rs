//! Watch event types.
//!
//! Provides the types returned by [`FileWatcher::watch`](crate::FileWatcher::watch).

use std::any::Any;
use std::path::PathBuf;

use tokio::sync::mpsc;

/// Kind of watch event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchEventKind {
    /// File appeared (or existed when the watch started).
    Add,
    /// File content changed.
    Change,
    /// File was removed.
    Unlink,
}

/// A filesystem change matching a watched pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    /// Path relative to the watch's working directory.
    pub path: PathBuf,
    /// Kind of change.
    pub kind: WatchEventKind,
}

impl WatchEvent {
    /// Create an `Add` event.
    pub fn add(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: WatchEventKind::Add,
        }
    }

    /// Create a `Change` event.
    pub fn change(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: WatchEventKind::Change,
        }
    }

    /// Create an `Unlink` event.
    pub fn unlink(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: WatchEventKind::Unlink,
        }
    }
}

/// Receiver for watch events.
///
/// Yields `None` once the corresponding [`WatchHandle`] is closed or dropped.
pub struct WatchEventReceiver {
    rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl WatchEventReceiver {
    /// Create a new receiver from a channel receiver.
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<WatchEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    /// Try to receive an event without waiting.
    #[must_use]
    pub fn try_recv(&mut self) -> Option<WatchEvent> {
        self.rx.try_recv().ok()
    }
}

/// Handle to stop watching for changes.
///
/// Uses RAII pattern - dropping the handle stops watching automatically.
/// The handle owns whatever keeps the underlying watcher alive.
pub struct WatchHandle {
    _guard: Option<Box<dyn Any + Send>>,
}

impl WatchHandle {
    /// Create a handle that keeps `guard` alive until closed.
    pub(crate) fn new<G: Any + Send>(guard: G) -> Self {
        Self {
            _guard: Some(Box::new(guard)),
        }
    }

    /// Stop watching immediately (consumes the handle).
    pub fn close(mut self) {
        self._guard.take();
    }
}
