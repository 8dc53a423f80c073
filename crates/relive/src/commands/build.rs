//! `relive build` command implementation.

use clap::Args;
use relive_config::CliSettings;

use super::{CommonArgs, build_once};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the build command.
#[derive(Args)]
pub(crate) struct BuildArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl BuildArgs {
    /// Execute the build command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the build failed.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let config = self.common.load(CliSettings::default())?;
        let file = build_once(&config).await?;

        output.success(&format!("Built {}", file.display()));
        Ok(())
    }
}
