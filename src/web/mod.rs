//! HTTP surface: Prometheus exposition plus a small JSON API.

pub mod config;
pub mod handlers;
pub mod router;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;

use crate::config::AppConfig;
use crate::error::{Result, WatchError};
use crate::watch::data::Snapshot;
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub snapshots: watch::Receiver<Option<Arc<Snapshot>>>,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, snapshots: watch::Receiver<Option<Arc<Snapshot>>>) -> Self {
        Self {
            config,
            snapshots,
            prometheus: None,
        }
    }

    /// Serve `/metrics` from this recorder handle.
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

/// Serve the application until `shutdown` resolves.
pub async fn start_web_server<F>(config: WebConfig, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app(&config, state);

    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| WatchError::config_error(format!("Invalid bind address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WatchError::web_server_error(format!("Failed to bind to address: {}", e)))?;

    info!("Starting gaugewatch web server on http://{}", addr);
    info!("Metrics available at http://{}/metrics", addr);
    info!("API endpoint: http://{}/api/snapshot", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| WatchError::web_server_error(format!("Server error: {}", e)))?;

    info!("Web server stopped");
    Ok(())
}
