//! relive CLI - live reload development toolkit.
//!
//! Provides commands for:
//! - `serve`: Serve the web root with live reload, rebuilding on change
//! - `build`: Run the configured build once
//! - `watch`: Rebuild on change without serving

mod commands;
mod error;
mod output;
mod restart;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{BuildArgs, ServeArgs, WatchArgs};
use output::Output;

/// relive - live reload development toolkit.
#[derive(Parser)]
#[command(name = "relive", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the web root with live reload.
    Serve(ServeArgs),
    /// Build once and exit.
    Build(BuildArgs),
    /// Rebuild on change without serving.
    Watch(WatchArgs),
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Self::Serve(args) => args.common.verbose,
            Self::Build(args) => args.common.verbose,
            Self::Watch(args) => args.common.verbose,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.command.verbose() {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    let result = rt.block_on(async {
        match cli.command {
            Commands::Serve(args) => args.execute().await,
            Commands::Build(args) => args.execute().await,
            Commands::Watch(args) => args.execute().await,
        }
    });

    if let Err(err) = result {
        match &err {
            error::CliError::BuildFailed(error_file) => output.build_failure(error_file),
            _ => output.error(&format!("Error: {err}")),
        }
        #[allow(clippy::exit)]
        std::process::exit(1);
    }
}
