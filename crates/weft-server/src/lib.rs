//! Watch-and-serve mode for the weft build engine.
//!
//! Serves the display tree over HTTP while watching the project for source
//! changes. Settled changes are handed to a single worker thread that runs
//! incremental builds one at a time; a failing build is logged and the
//! server keeps running.
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum (ServeDir: display dir, fallback build dir)
//!
//! notify ──► EventDebouncer ──► rebuild worker ──► BuildSession::build(changed)
//! ```

mod app;
mod error;
mod watch;

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use weft_build::BuildSession;

pub use error::ServerError;
use watch::{ChangeFilter, SourceWatcher, spawn_worker};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Quiet period before a changed file triggers a rebuild.
    pub debounce: Duration,
}

impl ServerConfig {
    /// Server settings from the weft configuration.
    #[must_use]
    pub fn from_config(config: &weft_config::Config) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            debounce: config.watch.debounce(),
        }
    }
}

/// Serve the display tree of `session` and rebuild on source changes.
///
/// Runs until Ctrl-C. The caller performs the initial build.
///
/// # Errors
///
/// Returns an error if the address is invalid, the port cannot be bound or
/// the project cannot be watched.
pub async fn run_server(config: ServerConfig, session: BuildSession) -> Result<(), ServerError> {
    let address = format!("{}:{}", config.host, config.port);
    let addr = SocketAddr::from_str(&address).map_err(|source| ServerError::Address {
        address: address.clone(),
        source,
    })?;

    let root = session.root().to_path_buf();
    let paths = session.paths().clone();
    let filter = ChangeFilter::new(session.extension(), session.manifest_path(), &paths);

    let (rebuilds, _worker) = spawn_worker(move |changed| {
        tracing::info!(files = changed.len(), "rebuilding");
        match session.build(Some(&changed)) {
            Ok(report) if report.is_noop() => tracing::debug!("nothing to rebuild"),
            Ok(report) => tracing::info!(
                roots = ?report.roots,
                rendered = report.rendered.len(),
                assembled = report.assembled.len(),
                "rebuild finished"
            ),
            Err(e) => tracing::error!(error = %e, "rebuild failed"),
        }
    });
    let watcher = SourceWatcher::start(&root, filter, config.debounce, rebuilds)?;

    let app = app::create_router(&paths.display_dir, &paths.build_dir);
    tracing::info!(address = %addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    watcher.stop();
    Ok(())
}

/// Wait for Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}
