//! Watch/rebuild orchestration.
//!
//! An [`Orchestrator`] owns every watch it arms. Two policies are supported:
//!
//! - [`Orchestrator::rebuild_on`]: debounced incremental rebuilds
//! - [`Orchestrator::restart_on`]: one-shot teardown followed by a restart
//!   callback, for files that change the build topology itself
//!
//! Teardown is one-way. After a restart fires, the instance refuses to arm
//! new watches and pending rebuilds are dropped.

use std::error::Error;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, try_join_all};

use crate::debounce::Debouncer;
use crate::event::WatchHandle;
use crate::watcher::{FileWatcher, WatchError, WatchOptions};

/// Error returned by a build action.
pub type ActionError = Box<dyn Error + Send + Sync>;

/// Callback invoked with the changed path when a restart watch fires.
pub type RestartCallback = Arc<dyn Fn(&Path) + Send + Sync>;

/// Default coalescing window for rebuilds.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// A repeatable asynchronous build action.
#[derive(Clone)]
pub struct Action(Arc<dyn Fn() -> BoxFuture<'static, Result<(), ActionError>> + Send + Sync>);

impl Action {
    /// Wrap an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        Self(Arc::new(move || Box::pin(f())))
    }

    /// Run the action once.
    pub async fn run(&self) -> Result<(), ActionError> {
        (self.0)().await
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Action")
    }
}

/// One build action or a group of independent ones.
#[derive(Clone, Debug)]
pub enum Actions {
    One(Action),
    /// Run concurrently; the group fails if any member fails.
    Many(Vec<Action>),
}

impl Actions {
    async fn run(&self) -> Result<(), ActionError> {
        match self {
            Self::One(action) => action.run().await,
            Self::Many(actions) => try_join_all(actions.iter().map(Action::run))
                .await
                .map(|_| ()),
        }
    }
}

impl From<Action> for Actions {
    fn from(action: Action) -> Self {
        Self::One(action)
    }
}

impl From<Vec<Action>> for Actions {
    fn from(actions: Vec<Action>) -> Self {
        Self::Many(actions)
    }
}

struct Shared {
    handles: Mutex<Vec<WatchHandle>>,
    torn_down: Arc<AtomicBool>,
}

impl Shared {
    /// Close every watch. Returns `false` if already torn down.
    fn teardown(&self) -> bool {
        let mut handles = self.handles.lock().unwrap();
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        for handle in handles.drain(..) {
            handle.close();
        }
        true
    }

    fn register(&self, handle: WatchHandle) -> Result<(), WatchError> {
        let mut handles = self.handles.lock().unwrap();
        if self.torn_down.load(Ordering::SeqCst) {
            return Err(WatchError::TornDown);
        }
        handles.push(handle);
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), WatchError> {
        if self.torn_down.load(Ordering::SeqCst) {
            Err(WatchError::TornDown)
        } else {
            Ok(())
        }
    }
}

/// Arms and owns filesystem watches that drive rebuilds and restarts.
pub struct Orchestrator {
    watcher: Arc<dyn FileWatcher>,
    options: WatchOptions,
    debounce: Duration,
    on_restart: RestartCallback,
    shared: Arc<Shared>,
}

impl Orchestrator {
    /// Create an orchestrator that calls `on_restart` when a restart watch fires.
    pub fn new(watcher: Arc<dyn FileWatcher>, on_restart: RestartCallback) -> Self {
        Self {
            watcher,
            options: WatchOptions::default(),
            debounce: DEFAULT_DEBOUNCE,
            on_restart,
            shared: Arc::new(Shared {
                handles: Mutex::new(Vec::new()),
                torn_down: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Options passed to every watch this instance arms.
    #[must_use]
    pub fn with_options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the rebuild coalescing window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Run `actions` once. When `restart_glob` is given, also arm a restart
    /// watch on it, whether or not the build succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Action`] if any action failed, or a watch error
    /// if the restart watch could not be armed.
    pub async fn build_once(
        &self,
        actions: impl Into<Actions>,
        restart_glob: Option<&str>,
    ) -> Result<(), WatchError> {
        let result = actions.into().run().await;
        if let Some(glob) = restart_glob {
            self.restart_on(glob)?;
        }
        result.map_err(WatchError::Action)
    }

    /// Run `action` once, then again (debounced) on every change under `glob`.
    ///
    /// Failures of the action are logged and do not disarm the watch.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::TornDown`] after teardown, or a watch error if
    /// the pattern cannot be watched.
    pub async fn rebuild_on(&self, action: Action, glob: &str) -> Result<(), WatchError> {
        self.rebuild_on_any(action, &[glob]).await
    }

    /// Like [`rebuild_on`](Self::rebuild_on), with one debounced trigger
    /// shared by every glob in `globs`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::TornDown`] after teardown, or a watch error if
    /// a pattern cannot be watched.
    pub async fn rebuild_on_any(&self, action: Action, globs: &[&str]) -> Result<(), WatchError> {
        self.shared.ensure_active()?;

        if let Err(err) = action.run().await {
            tracing::error!(error = %err, "Initial build failed");
        }

        let debouncer = Arc::new(Debouncer::new(
            action,
            self.debounce,
            Arc::clone(&self.shared.torn_down),
        ));
        for glob in globs {
            let (mut rx, handle) = self.watcher.watch(glob, &self.options)?;
            self.shared.register(handle)?;

            let debouncer = Arc::clone(&debouncer);
            let pattern = (*glob).to_owned();
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    tracing::debug!(pattern = %pattern, path = %event.path.display(), kind = ?event.kind, "Change detected");
                    debouncer.trigger();
                }
            });
            tracing::info!(pattern = glob, "Rebuilding on change");
        }
        Ok(())
    }

    /// Tear everything down and call the restart callback on the first
    /// change under `glob`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::TornDown`] after teardown, or a watch error if
    /// the pattern cannot be watched.
    pub fn restart_on(&self, glob: &str) -> Result<(), WatchError> {
        self.shared.ensure_active()?;

        let (mut rx, handle) = self.watcher.watch(glob, &self.options)?;
        self.shared.register(handle)?;

        let shared = Arc::clone(&self.shared);
        let on_restart = Arc::clone(&self.on_restart);
        tokio::spawn(async move {
            if let Some(event) = rx.recv().await
                && shared.teardown()
            {
                tracing::info!(path = %event.path.display(), "Restarting");
                on_restart(&event.path);
            }
        });

        tracing::info!(pattern = glob, "Restarting on change");
        Ok(())
    }

    /// Close every watch without invoking the restart callback.
    pub fn teardown(&self) {
        self.shared.teardown();
    }

    /// Whether this instance has been torn down.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.shared.torn_down.load(Ordering::SeqCst)
    }

    /// Number of watches currently armed.
    #[must_use]
    pub fn active_watches(&self) -> usize {
        self.shared.handles.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::WatchEvent;
    use crate::mock::MockWatcher;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    fn counting_action() -> (Action, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let action = Action::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        (action, count)
    }

    fn failing_action() -> Action {
        Action::new(|| async { Err::<(), ActionError>("bundle exploded".into()) })
    }

    fn orchestrator(mock: &Arc<MockWatcher>) -> (Orchestrator, Arc<Mutex<Vec<PathBuf>>>) {
        let restarts = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&restarts);
        let on_restart: RestartCallback = Arc::new(move |path: &Path| {
            recorded.lock().unwrap().push(path.to_path_buf());
        });
        let mock: Arc<dyn FileWatcher> = Arc::clone(mock) as Arc<dyn FileWatcher>;
        (Orchestrator::new(mock, on_restart), restarts)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebuild_on_runs_immediately() {
        let mock = Arc::new(MockWatcher::new());
        let (orch, _) = orchestrator(&mock);
        let (action, count) = counting_action();

        orch.rebuild_on(action, "src/**/*").await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(mock.is_watching("src/**/*"));
        assert_eq!(orch.active_watches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_changes_trigger_one_rebuild() {
        let mock = Arc::new(MockWatcher::new());
        let (orch, _) = orchestrator(&mock);
        let (action, count) = counting_action();
        orch.rebuild_on(action, "src/**/*").await.unwrap();

        for _ in 0..5 {
            mock.emit("src/**/*", WatchEvent::change("src/main.js"));
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_globs_debounce_independently() {
        let mock = Arc::new(MockWatcher::new());
        let (orch, _) = orchestrator(&mock);
        let (js, js_count) = counting_action();
        let (css, css_count) = counting_action();
        orch.rebuild_on(js, "src/**/*.js").await.unwrap();
        orch.rebuild_on(css, "src/**/*.css").await.unwrap();

        mock.emit("src/**/*.js", WatchEvent::change("src/a.js"));
        mock.emit("src/**/*.css", WatchEvent::change("src/a.css"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(js_count.load(Ordering::SeqCst), 2);
        assert_eq!(css_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_trigger_across_globs() {
        let mock = Arc::new(MockWatcher::new());
        let (orch, _) = orchestrator(&mock);
        let (action, count) = counting_action();
        orch.rebuild_on_any(action, &["src/**/*.js", "src/**/*.css"])
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        mock.emit("src/**/*.js", WatchEvent::change("src/a.js"));
        mock.emit("src/**/*.css", WatchEvent::change("src/a.css"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(orch.active_watches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebuild_failure_keeps_watching() {
        let mock = Arc::new(MockWatcher::new());
        let (orch, _) = orchestrator(&mock);

        orch.rebuild_on(failing_action(), "src/**/*").await.unwrap();

        assert!(mock.is_watching("src/**/*"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_tears_down_every_watch() {
        let mock = Arc::new(MockWatcher::new());
        let (orch, restarts) = orchestrator(&mock);
        let (action, count) = counting_action();
        orch.rebuild_on(action, "src/**/*").await.unwrap();
        orch.restart_on("relive.toml").unwrap();
        assert_eq!(mock.open_count(), 2);

        mock.emit("relive.toml", WatchEvent::change("relive.toml"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(orch.is_torn_down());
        assert_eq!(mock.open_count(), 0);
        assert_eq!(orch.active_watches(), 0);
        assert_eq!(*restarts.lock().unwrap(), vec![PathBuf::from("relive.toml")]);

        assert_eq!(mock.emit("src/**/*", WatchEvent::change("src/main.js")), 0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_drops_pending_rebuild() {
        let mock = Arc::new(MockWatcher::new());
        let (orch, _) = orchestrator(&mock);
        let (action, count) = counting_action();
        orch.rebuild_on(action, "src/**/*").await.unwrap();
        orch.restart_on("relive.toml").unwrap();

        mock.emit("src/**/*", WatchEvent::change("src/main.js"));
        tokio::time::sleep(Duration::from_millis(1)).await;
        mock.emit("relive.toml", WatchEvent::change("relive.toml"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_fires_once() {
        let mock = Arc::new(MockWatcher::new());
        let (orch, restarts) = orchestrator(&mock);
        orch.restart_on("relive.toml").unwrap();
        orch.restart_on("package.json").unwrap();

        mock.emit("relive.toml", WatchEvent::change("relive.toml"));
        mock.emit("package.json", WatchEvent::change("package.json"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(restarts.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arming_after_teardown_fails() {
        let mock = Arc::new(MockWatcher::new());
        let (orch, _) = orchestrator(&mock);
        orch.teardown();

        let (action, count) = counting_action();
        let result = orch.rebuild_on(action, "src/**/*").await;
        assert!(matches!(result, Err(WatchError::TornDown)));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert!(matches!(
            orch.restart_on("relive.toml"),
            Err(WatchError::TornDown)
        ));
        assert_eq!(mock.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_once_runs_group_and_arms_restart() {
        let mock = Arc::new(MockWatcher::new());
        let (orch, _) = orchestrator(&mock);
        let (first, first_count) = counting_action();
        let (second, second_count) = counting_action();

        orch.build_once(vec![first, second], Some("relive.toml"))
            .await
            .unwrap();

        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
        assert!(mock.is_watching("relive.toml"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_once_group_fails_if_any_member_fails() {
        let mock = Arc::new(MockWatcher::new());
        let (orch, _) = orchestrator(&mock);
        let (ok, _) = counting_action();

        let result = orch
            .build_once(vec![ok, failing_action()], Some("relive.toml"))
            .await;

        assert!(matches!(result, Err(WatchError::Action(_))));
        assert!(mock.is_watching("relive.toml"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_once_single_without_glob() {
        let mock = Arc::new(MockWatcher::new());
        let (orch, _) = orchestrator(&mock);
        let (action, count) = counting_action();

        orch.build_once(action, None).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(mock.open_count(), 0);
    }
}
