//! Health Check and Metrics Endpoint
//!
//! HTTP endpoints for health checks, store reachability, and Prometheus
//! metrics. Used by container orchestrators, load balancers, and monitoring
//! systems. Served on the API port next to the query routes.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (pings the store)
//! - `GET /metrics` - Prometheus metrics in text format

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::services::QueryService;
use crate::domain::subscription::{RegistryStats, SubscriptionRegistry};
use crate::infrastructure::metrics::get_metrics_handle;

const PING_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Record store reachability.
    pub store: StoreStatus,
    /// Live-feed subscription statistics.
    pub subscriptions: RegistryStats,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// Serving, but new subscriptions are being refused.
    Degraded,
    /// The record store is unreachable.
    Unhealthy,
}

/// Record store status.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    /// Whether a ping succeeded.
    pub reachable: bool,
    /// Ping failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// =============================================================================
// Health State
// =============================================================================

/// Shared state for the health endpoints.
#[derive(Debug)]
pub struct HealthState {
    version: String,
    started_at: Instant,
    queries: QueryService,
    registry: Arc<SubscriptionRegistry>,
}

impl HealthState {
    /// Create new health state.
    #[must_use]
    pub fn new(
        version: impl Into<String>,
        queries: QueryService,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            version: version.into(),
            started_at: Instant::now(),
            queries,
            registry,
        }
    }

    async fn store_status(&self) -> StoreStatus {
        match tokio::time::timeout(PING_TIMEOUT, self.queries.ping()).await {
            Ok(Ok(())) => StoreStatus {
                reachable: true,
                error: None,
            },
            Ok(Err(e)) => StoreStatus {
                reachable: false,
                error: Some(e.to_string()),
            },
            Err(_) => StoreStatus {
                reachable: false,
                error: Some("ping timed out".to_string()),
            },
        }
    }
}

/// Health, readiness and metrics routes.
pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let response = build_health_response(&state).await;
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    if state.store_status().await.reachable {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

async fn build_health_response(state: &HealthState) -> HealthResponse {
    let store = state.store_status().await;
    let subscriptions = state.registry.stats();

    HealthResponse {
        status: determine_health_status(&store, &subscriptions),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        store,
        subscriptions,
    }
}

fn determine_health_status(store: &StoreStatus, subscriptions: &RegistryStats) -> HealthStatus {
    if !store.reachable {
        HealthStatus::Unhealthy
    } else if subscriptions.active_subscriptions >= subscriptions.limit {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

// =============================================================================
// Tests
// =============================================================================
