//! API server: REST routes for banner rotation plus the Prometheus listener.

use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use rotator_core::config::AppConfig;
use rotator_engine::{AssociationManager, SelectionEngine};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the REST router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Rotation endpoints
        .route("/slot/banner", get(rest::banner_for_slot))
        .route("/slot/banner/add", post(rest::add_banner_to_slot))
        .route("/slot/banner/remove", post(rest::remove_banner_from_slot))
        .route("/slot/banner/click", post(rest::click_banner))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ApiServer {
    config: AppConfig,
    selection: Arc<SelectionEngine>,
    associations: Arc<AssociationManager>,
}

impl ApiServer {
    pub fn new(
        config: AppConfig,
        selection: Arc<SelectionEngine>,
        associations: Arc<AssociationManager>,
    ) -> Self {
        Self {
            config,
            selection,
            associations,
        }
    }

    /// Serve HTTP until `shutdown` is cancelled, then drain in-flight requests.
    pub async fn start_http(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = router(AppState {
            selection: self.selection.clone(),
            associations: self.associations.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        });

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Start the metrics listener on a separate port.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
