//! HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::info;

use crate::error::DaemonError;

use super::metrics::RequestMetrics;
use super::routes::router;
use super::state::AppState;

/// HTTP server with the digest guard installed.
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
    metrics: Arc<RequestMetrics>,
}

impl HttpServer {
    /// Bind `addr` and build the router around `state`.
    pub async fn bind(
        addr: SocketAddr,
        state: AppState,
        max_concurrent_requests: usize,
    ) -> Result<Self, DaemonError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| DaemonError::Server {
            message: format!("Failed to bind to {}: {}", addr, e),
        })?;

        info!(
            max_concurrent = max_concurrent_requests,
            timeout_secs = state.request_timeout.as_secs(),
            "Request limits enabled"
        );

        let metrics = Arc::clone(&state.metrics);
        let router = router(state, max_concurrent_requests);

        info!(addr = %listener.local_addr()?, "HTTP listener bound");

        Ok(Self {
            listener,
            router,
            metrics,
        })
    }

    /// The bound address; useful when binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, DaemonError> {
        Ok(self.listener.local_addr()?)
    }

    /// Get request metrics.
    pub fn metrics(&self) -> Arc<RequestMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Serve until `shutdown` is notified.
    ///
    /// Stops accepting new connections on shutdown and returns once the
    /// connections already open have finished.
    pub async fn run(self, shutdown: Arc<Notify>) -> Result<(), DaemonError> {
        info!("HTTP listener running, waiting for connections...");

        let service = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(self.listener, service)
            .with_graceful_shutdown(async move {
                shutdown.notified().await;
                info!("Shutdown signal received, stopping listener");
            })
            .await
            .map_err(|e| DaemonError::Server {
                message: format!("HTTP server failed: {}", e),
            })
    }
}
