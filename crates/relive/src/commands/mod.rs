//! CLI command implementations.

pub(crate) mod build;
pub(crate) mod serve;
pub(crate) mod watch;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use relive_build::{BuildClosure, BuildError, BuildOutcome, BuildSpec, CommandBundler, local_bin};
use relive_config::{CliSettings, Config};
use relive_server::Mode;
use relive_watch::{
    Action, ActionError, FileWatcher, NotifyWatcher, Orchestrator, RestartCallback, WatchError,
    WatchOptions,
};

use crate::error::CliError;
use crate::restart;

pub(crate) use build::BuildArgs;
pub(crate) use serve::ServeArgs;
pub(crate) use watch::WatchArgs;

/// Arguments shared by every command.
#[derive(Args)]
pub(crate) struct CommonArgs {
    /// Path to configuration file (default: auto-discover relive.toml).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Use production mode (overrides config and RELIVE_ENV).
    #[arg(long)]
    pub production: bool,

    /// Enable verbose output (show build timing and watch activity).
    #[arg(short, long)]
    pub verbose: bool,
}

impl CommonArgs {
    /// Load configuration, applying `settings` plus the shared flags.
    pub(crate) fn load(&self, mut settings: CliSettings) -> Result<Config, CliError> {
        if self.production {
            settings.production = Some(true);
        }
        Ok(Config::load(self.config.as_deref(), Some(&settings))?)
    }
}

/// Create the build closure for the `[build]` section.
///
/// Prefers an executable installed in the project's `node_modules`.
pub(crate) fn build_closure(config: &Config, production: bool) -> Result<BuildClosure, CliError> {
    let build = config.require_build()?;
    let spec = BuildSpec::from_config(build, production);

    let local = local_bin(&config.base_dir(), &build.command);
    let program = if local.is_file() {
        local.to_string_lossy().into_owned()
    } else {
        build.command.clone()
    };
    tracing::debug!(program = %program, "Using bundler");

    let bundler = Arc::new(CommandBundler::new(program, &spec.output));
    Ok(BuildClosure::timed(spec, bundler)?)
}

/// Whether the configuration resolves to production mode.
pub(crate) fn is_production(config: &Config) -> bool {
    Mode::resolve(config.live_resolved.production).is_production()
}

/// Wrap a build closure as a repeatable action.
///
/// Bundler failures are reported through the error marker. They only fail
/// the action when `fail_on_error` is set.
fn build_action(closure: Arc<BuildClosure>, fail_on_error: bool) -> Action {
    Action::new(move || {
        let closure = Arc::clone(&closure);
        async move {
            let outcome = closure.run().await?;
            if fail_on_error {
                check_outcome(outcome, &closure)?;
            }
            Ok::<(), ActionError>(())
        }
    })
}

/// Run the `[build]` section once through an orchestrator.
///
/// Returns the written output file.
pub(crate) async fn build_once(config: &Config) -> Result<PathBuf, CliError> {
    let closure = Arc::new(build_closure(config, is_production(config))?);

    let on_restart: RestartCallback = Arc::new(restart::reexec);
    let orchestrator = Orchestrator::new(Arc::new(NotifyWatcher::new()), on_restart);
    orchestrator
        .build_once(build_action(Arc::clone(&closure), true), None)
        .await
        .map_err(action_error)?;

    Ok(closure.output().file.clone())
}

/// Recover the CLI error carried by a failed action.
fn action_error(err: WatchError) -> CliError {
    match err {
        WatchError::Action(source) => match source.downcast::<CliError>() {
            Ok(err) => *err,
            Err(source) => match source.downcast::<BuildError>() {
                Ok(err) => CliError::Build(*err),
                Err(source) => CliError::Watch(WatchError::Action(source)),
            },
        },
        other => other.into(),
    }
}

/// Arm rebuild-on-change for `[build]` and restart-on-change for the
/// config file.
pub(crate) async fn arm_watches(
    config: &Config,
    watcher: Arc<dyn FileWatcher>,
) -> Result<Orchestrator, CliError> {
    let closure = Arc::new(build_closure(config, is_production(config))?);

    let mut options = WatchOptions::default().with_cwd(config.base_dir());
    options.use_polling = config.watch.use_polling;
    options.interval = Duration::from_millis(config.watch.interval_ms);

    let on_restart: RestartCallback = Arc::new(restart::reexec);
    let orchestrator = Orchestrator::new(watcher, on_restart)
        .with_options(options)
        .with_debounce(Duration::from_millis(config.watch.debounce_ms));

    let patterns: Vec<&str> = config.watch.patterns.iter().map(String::as_str).collect();
    orchestrator
        .rebuild_on_any(build_action(closure, false), &patterns)
        .await?;

    if let Some(name) = config
        .config_path
        .as_deref()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
    {
        orchestrator.restart_on(name)?;
    }

    Ok(orchestrator)
}

/// Report the outcome of a one-off build.
pub(crate) fn check_outcome(outcome: BuildOutcome, closure: &BuildClosure) -> Result<(), CliError> {
    match outcome {
        BuildOutcome::Built => Ok(()),
        BuildOutcome::Failed => Err(CliError::BuildFailed(closure.error_file().to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_config(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("relive.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_production_flag_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[live]\nproduction = false\n");
        let args = CommonArgs {
            config: Some(path),
            production: true,
            verbose: false,
        };

        let config = args.load(CliSettings::default()).unwrap();

        assert_eq!(config.live_resolved.production, Some(true));
        assert!(is_production(&config));
    }

    #[test]
    fn test_build_closure_requires_build_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[server]\nport = 9000\n");
        let config = Config::load(Some(&path), None).unwrap();

        let result = build_closure(&config, false);

        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn test_build_closure_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "[build]\nentry = \"src/main.js\"\nout_dir = \"public/build\"\n",
        );
        let config = Config::load(Some(&path), None).unwrap();

        let closure = build_closure(&config, true).unwrap();

        assert_eq!(
            closure.output().file,
            dir.path().join("public/build/main.min.js")
        );
        assert_eq!(
            closure.error_file(),
            dir.path().join("public/build/main.min.js.error")
        );
    }

    #[test]
    fn test_check_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[build]\nentry = \"src/main.js\"\n");
        let config = Config::load(Some(&path), None).unwrap();
        let closure = build_closure(&config, false).unwrap();

        assert!(check_outcome(BuildOutcome::Built, &closure).is_ok());
        assert!(matches!(
            check_outcome(BuildOutcome::Failed, &closure),
            Err(CliError::BuildFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_build_once_reports_failed_build() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "[build]\nentry = \"src/main.js\"\ncommand = \"relive-no-such-bundler\"\n",
        );
        let config = Config::load(Some(&path), None).unwrap();

        let err = build_once(&config).await.unwrap_err();

        let CliError::BuildFailed(error_file) = err else {
            panic!("expected a failed build, got {err:?}");
        };
        let diagnostic = std::fs::read_to_string(&error_file).unwrap();
        assert!(diagnostic.contains("relive-no-such-bundler"));
    }

    #[test]
    fn test_action_error_recovers_cli_error() {
        let source: ActionError = Box::new(CliError::BuildFailed(PathBuf::from("app.js.error")));

        let err = action_error(WatchError::Action(source));

        assert!(matches!(err, CliError::BuildFailed(p) if p == PathBuf::from("app.js.error")));
    }

    #[test]
    fn test_action_error_keeps_other_watch_errors() {
        assert!(matches!(
            action_error(WatchError::TornDown),
            CliError::Watch(WatchError::TornDown)
        ));
    }
}
