//! Native filesystem watcher.
//!
//! [`NotifyWatcher`] implements [`FileWatcher`] on top of `notify`, filtering
//! raw events through a glob pattern evaluated relative to the watch's
//! working directory.

use std::path::{Component, Path, PathBuf};

use glob::Pattern;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::event::{WatchEvent, WatchEventKind, WatchEventReceiver, WatchHandle};
use crate::watcher::{FileWatcher, WatchError, WatchOptions};

/// Characters that start a glob expression inside a path segment.
const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Filesystem watcher backed by `notify`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NotifyWatcher;

impl NotifyWatcher {
    /// Create a new watcher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FileWatcher for NotifyWatcher {
    fn watch(
        &self,
        pattern: &str,
        options: &WatchOptions,
    ) -> Result<(WatchEventReceiver, WatchHandle), WatchError> {
        let base = match &options.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir()?,
        };
        let base = base.canonicalize().unwrap_or(base);

        let glob = Pattern::new(pattern).map_err(|source| WatchError::Pattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        let (root, mode) = watch_root(&base, pattern);

        let (tx, rx) = mpsc::unbounded_channel();

        if !options.ignore_initial {
            for path in initial_matches(&base, pattern) {
                let _ = tx.send(WatchEvent::add(path));
            }
        }

        let ignore_permission_errors = options.ignore_permission_errors;
        let filter_base = base.clone();
        let handler = move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                for (kind, path) in translate(&event) {
                    let Ok(relative) = path.strip_prefix(&filter_base) else {
                        continue;
                    };
                    if !glob.matches_path(relative) {
                        continue;
                    }
                    if kind != WatchEventKind::Unlink && path.is_dir() {
                        continue;
                    }
                    tracing::debug!(path = %relative.display(), ?kind, "Recorded filesystem event");
                    let _ = tx.send(WatchEvent {
                        path: relative.to_path_buf(),
                        kind,
                    });
                }
            }
            Err(err) => {
                if !(ignore_permission_errors && is_permission_error(&err)) {
                    tracing::warn!(error = %err, "Filesystem watcher error");
                }
            }
        };

        let mut watcher: Box<dyn Watcher + Send> = if options.use_polling {
            let config = notify::Config::default().with_poll_interval(options.interval);
            Box::new(notify::PollWatcher::new(handler, config)?)
        } else {
            Box::new(notify::recommended_watcher(handler)?)
        };
        watcher.watch(&root, mode)?;

        tracing::debug!(pattern, root = %root.display(), "Watching");
        Ok((WatchEventReceiver::new(rx), WatchHandle::new(watcher)))
    }
}

/// Directory to register with the backend for `pattern`.
///
/// Uses the longest literal prefix of the pattern. A pattern without glob
/// syntax names a single file, whose parent is watched non-recursively so
/// that editors replacing the file are still observed.
fn watch_root(base: &Path, pattern: &str) -> (PathBuf, RecursiveMode) {
    let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let literal = segments
        .iter()
        .take_while(|s| !s.contains(GLOB_META))
        .count();

    if literal == segments.len() {
        let file = base.join(pattern);
        let parent = file.parent().filter(|p| p.is_dir()).unwrap_or(base);
        return (parent.to_path_buf(), RecursiveMode::NonRecursive);
    }

    let root = segments[..literal]
        .iter()
        .fold(base.to_path_buf(), |acc, s| acc.join(s));
    if root.is_dir() {
        (root, RecursiveMode::Recursive)
    } else {
        (base.to_path_buf(), RecursiveMode::Recursive)
    }
}

/// Files already matching `pattern`, relative to `base`.
fn initial_matches(base: &Path, pattern: &str) -> Vec<PathBuf> {
    let full = base.join(pattern);
    let Ok(paths) = glob::glob(&full.to_string_lossy()) else {
        return Vec::new();
    };
    paths
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .filter_map(|p| p.strip_prefix(base).ok().map(normalize))
        .collect()
}

/// Drop `.` components so relative paths compare cleanly.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Map a raw `notify` event to watch events.
fn translate(event: &notify::Event) -> Vec<(WatchEventKind, &Path)> {
    let all = |kind| event.paths.iter().map(|p| (kind, p.as_path())).collect();

    match event.kind {
        EventKind::Create(_) => all(WatchEventKind::Add),
        EventKind::Remove(_) => all(WatchEventKind::Unlink),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(WatchEventKind::Unlink),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(WatchEventKind::Add),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut events = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                events.push((WatchEventKind::Unlink, from.as_path()));
            }
            if let Some(to) = event.paths.get(1) {
                events.push((WatchEventKind::Add, to.as_path()));
            }
            events
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    WatchEventKind::Add
                } else {
                    WatchEventKind::Unlink
                };
                (kind, p.as_path())
            })
            .collect(),
        EventKind::Modify(_) => all(WatchEventKind::Change),
        _ => Vec::new(),
    }
}

fn is_permission_error(err: &notify::Error) -> bool {
    matches!(&err.kind, notify::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied)
}
