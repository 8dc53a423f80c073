//! `relive watch` command implementation.

use std::sync::Arc;

use clap::Args;
use relive_config::CliSettings;
use relive_watch::NotifyWatcher;

use super::{CommonArgs, arm_watches};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the watch command.
#[derive(Args)]
pub(crate) struct WatchArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl WatchArgs {
    /// Execute the watch command.
    ///
    /// Runs until Ctrl-C, or until a configuration change restarts the
    /// process.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or a watch cannot be armed.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let config = self.common.load(CliSettings::default())?;
        config.require_build()?;

        output.highlight(&format!(
            "Watching {}",
            config.watch.patterns.join(", ")
        ));
        let orchestrator = arm_watches(&config, Arc::new(NotifyWatcher::new())).await?;

        tokio::signal::ctrl_c().await?;
        orchestrator.teardown();
        tracing::info!("Shutdown signal received, stopping watches...");
        Ok(())
    }
}
