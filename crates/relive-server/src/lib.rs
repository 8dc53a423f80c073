//! Live reload server for relive.
//!
//! This crate provides the [`LiveRegistry`], which maps asset keys to their
//! currently built files by watching marker files, and an axum server that:
//! - streams registry changes to browsers over server-sent events
//! - serves files from the web root, rendering templates through
//!   [`LiveRegistry::replace_data_live`]
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use relive_server::{ServerConfig, run_server};
//! use relive_watch::NotifyWatcher;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     run_server(config, Arc::new(NotifyWatcher::new())).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum server (relive-server)
//!                        │
//!                        ├─► GET /__live__ ──► LiveStream (text/event-stream)
//!                        │                          ▲
//!                        │                          │ send_change
//!                        │                    LiveRegistry ◄── *.lnk / *.err* watches
//!                        │                          │
//!                        └─► Static files ──────────┘ replace_data_live
//! ```

mod app;
mod error;
pub mod live;
mod middleware;
mod state;
mod static_files;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::serve::ListenerExt;
use relive_watch::FileWatcher;

pub use error::ServerError;
pub use live::{LiveOptions, LivePayload, LiveRegistry, Mode, Targets};
use state::AppState;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory served and watched for marker files.
    pub web_root: PathBuf,
    /// Explicit production flag (`None` consults the environment).
    pub production: Option<bool>,
    /// Live channel path (`None` disables the endpoint).
    pub route: Option<String>,
    /// Template extension (`None` disables rendering).
    pub view: Option<String>,
    /// Poll the filesystem instead of using native notifications.
    pub use_polling: bool,
    /// Polling interval.
    pub interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8035,
            web_root: PathBuf::from("public"),
            production: None,
            route: Some(relive_config::DEFAULT_LIVE_ROUTE.to_owned()),
            view: Some(relive_config::DEFAULT_VIEW_EXTENSION.to_owned()),
            use_polling: false,
            interval: Duration::from_millis(100),
        }
    }
}

/// Run the server.
///
/// Initializes the live registry for `config.web_root` using `watcher`, then
/// serves until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the registry cannot start watching or the server
/// fails to bind.
pub async fn run_server(
    config: ServerConfig,
    watcher: Arc<dyn FileWatcher>,
) -> Result<(), ServerError> {
    let options = LiveOptions {
        production: config.production,
        use_polling: config.use_polling,
        interval: Some(config.interval),
    };
    let live = LiveRegistry::initialize(config.web_root.clone(), &options, watcher.as_ref())?;

    let state = Arc::new(AppState {
        live,
        web_root: config.web_root.clone(),
        view: config.view.clone(),
    });
    let app = app::create_router(state, config.route.as_deref());

    let addr = SocketAddr::from_str(&format!("{}:{}", config.host, config.port))?;
    tracing::info!(address = %addr, "Starting server");

    // Live frames are small; flush them without Nagle delay.
    let listener = tokio::net::TcpListener::bind(addr)
        .await?
        .tap_io(|tcp| {
            if let Err(err) = tcp.set_nodelay(true) {
                tracing::warn!(error = %err, "Failed to set TCP_NODELAY");
            }
        });
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from relive config.
#[must_use]
pub fn server_config_from_config(config: &relive_config::Config) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        web_root: config.live_resolved.web_root.clone(),
        production: config.live_resolved.production,
        route: config.live_resolved.route.clone(),
        view: config.live_resolved.view.clone(),
        use_polling: config.watch.use_polling,
        interval: Duration::from_millis(config.watch.interval_ms),
    }
}
