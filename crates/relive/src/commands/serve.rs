//! `relive serve` command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use relive_config::CliSettings;
use relive_server::{run_server, server_config_from_config};
use relive_watch::{FileWatcher, NotifyWatcher};

use super::{CommonArgs, arm_watches, is_production};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Directory to serve (overrides config).
    #[arg(short, long)]
    web_root: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let config = self.common.load(CliSettings {
            host: self.host,
            port: self.port,
            web_root: self.web_root,
            production: None,
        })?;

        std::fs::create_dir_all(&config.live_resolved.web_root)?;

        output.highlight(&format!(
            "Serving {} on http://{}:{}",
            config.live_resolved.web_root.display(),
            config.server.host,
            config.server.port
        ));
        let production = is_production(&config);
        match (&config.live_resolved.route, production) {
            (Some(route), false) => output.info(&format!("Live reload: {route}")),
            _ => output.info("Live reload: disabled"),
        }

        let watcher: Arc<dyn FileWatcher> = Arc::new(NotifyWatcher::new());

        // Kept alive for as long as the server runs
        let _orchestrator = if config.build_resolved.is_some() {
            output.info(&format!(
                "Rebuilding on: {}",
                config.watch.patterns.join(", ")
            ));
            Some(arm_watches(&config, Arc::clone(&watcher)).await?)
        } else {
            None
        };

        run_server(server_config_from_config(&config), watcher).await?;
        Ok(())
    }
}
