//! Filesystem watching and rebuild orchestration for relive.
//!
//! This crate provides a [`FileWatcher`] trait abstracting the watch
//! primitive, and an [`Orchestrator`] built on it:
//!
//! - [`NotifyWatcher`]: native (or polling) watcher backed by `notify`
//! - [`MockWatcher`]: in-memory watcher for tests (behind `mock` feature flag)
//! - [`Orchestrator`]: debounced rebuild-on-change and one-shot
//!   restart-on-change policies sharing one set of watches
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use relive_watch::{Action, NotifyWatcher, Orchestrator};
//!
//! let orchestrator = Orchestrator::new(Arc::new(NotifyWatcher::new()), on_restart);
//! orchestrator.rebuild_on(Action::new(move || build()), "src/**/*.js").await?;
//! orchestrator.restart_on("relive.toml")?;
//! ```

mod debounce;
mod event;
mod fs;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod orchestrator;
mod watcher;

pub use event::{WatchEvent, WatchEventKind, WatchEventReceiver, WatchHandle};
pub use fs::NotifyWatcher;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockWatcher;
pub use orchestrator::{
    Action, ActionError, Actions, DEFAULT_DEBOUNCE, Orchestrator, RestartCallback,
};
pub use watcher::{FileWatcher, WatchError, WatchOptions};
