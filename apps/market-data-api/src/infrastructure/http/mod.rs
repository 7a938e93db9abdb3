//! HTTP Adapter
//!
//! axum routes for the query, export and live-feed endpoints, merged with
//! the health and metrics routes.
//!
//! # Endpoints
//!
//! - `GET /get-data` - range query, JSON array
//! - `GET /get-latest-orderbook` - latest-N query with price rounding
//! - `GET /export-data` - unfiltered range export, CSV attachment
//! - `GET /ws` - WebSocket live feed
//! - `GET /health`, `/healthz`, `/readyz`, `/metrics`

mod error;
mod handlers;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::application::services::{ExportService, QueryService};
use crate::domain::subscription::ClientId;
use crate::infrastructure::broadcast::SharedBroadcaster;
use crate::infrastructure::health::{self, HealthState};

pub use error::ErrorBody;

/// Shared state for request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    queries: QueryService,
    exports: ExportService,
    broadcaster: SharedBroadcaster,
    next_client: Arc<AtomicU64>,
}

impl AppState {
    /// Create handler state.
    #[must_use]
    pub fn new(queries: QueryService, exports: ExportService, broadcaster: SharedBroadcaster) -> Self {
        Self {
            queries,
            exports,
            broadcaster,
            next_client: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Live-feed broadcaster.
    #[must_use]
    pub const fn broadcaster(&self) -> &SharedBroadcaster {
        &self.broadcaster
    }

    fn next_client_id(&self) -> ClientId {
        self.next_client.fetch_add(1, Ordering::Relaxed)
    }
}

/// Build the full application router.
pub fn create_router(state: AppState) -> Router {
    let health_state = Arc::new(HealthState::new(
        env!("CARGO_PKG_VERSION"),
        state.queries.clone(),
        Arc::clone(state.broadcaster.registry()),
    ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/get-data", get(handlers::get_data))
        .route("/get-latest-orderbook", get(handlers::get_latest))
        .route("/export-data", get(handlers::export_data))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .merge(health::router(health_state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// HTTP server for the API router.
#[derive(Debug)]
pub struct ApiServer {
    port: u16,
    state: AppState,
    cancel: CancellationToken,
}

impl ApiServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: AppState, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the HTTP server encounters
    /// a fatal error while running.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = create_router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

/// API server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
