//! Market Data API Binary
//!
//! Starts the order book and trade query service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-data-api
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL`: MySQL connection URL
//!
//! ## Optional
//! - `MARKET_API_HTTP_PORT`: HTTP port (default: 5003)
//! - `MARKET_API_DB_MAX_CONNECTIONS`: Pool size (default: 50)
//! - `MARKET_API_DB_ACQUIRE_TIMEOUT_SECS`: Pool wait (default: 30)
//! - `MARKET_API_DB_MAX_LIFETIME_SECS`: Connection recycle age (default: 1800)
//! - `MARKET_API_BROADCAST_INTERVAL_MS`: Live-feed period (default: 1000)
//! - `MARKET_API_BROADCAST_DEPTH`: Records per live push (default: 100)
//! - `MARKET_API_MAX_SUBSCRIPTIONS`: Live-feed cap (default: 1024)
//! - `MARKET_API_EXPORT_DIR`: Directory for temporary CSV files
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: market-data-api)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use market_data_api::application::ports::SharedRecordStore;
use market_data_api::application::services::{ExportService, QueryService};
use market_data_api::domain::subscription::SubscriptionRegistry;
use market_data_api::infrastructure::broadcast::{FeedConfig, SubscriptionBroadcaster};
use market_data_api::infrastructure::http::{ApiServer, AppState};
use market_data_api::infrastructure::persistence::MySqlRecordStore;
use market_data_api::infrastructure::telemetry;
use market_data_api::{ApiConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Market Data API");

    let _metrics_handle = init_metrics()?;

    let config = ApiConfig::from_env()?;
    log_config(&config);

    let store = Arc::new(MySqlRecordStore::connect(&config.database).await?);
    let shared_store: SharedRecordStore = store.clone();

    let queries = QueryService::new(Arc::clone(&shared_store));
    let exports = match &config.export.dir {
        Some(dir) => ExportService::new(shared_store).with_export_dir(dir),
        None => ExportService::new(shared_store),
    };

    let registry = Arc::new(SubscriptionRegistry::new(
        config.broadcast.max_subscriptions,
    ));
    let broadcaster = Arc::new(SubscriptionBroadcaster::new(
        queries.clone(),
        registry,
        FeedConfig::from(&config.broadcast),
    ));

    let shutdown_token = CancellationToken::new();
    let server = ApiServer::new(
        config.server.http_port,
        AppState::new(queries, exports, Arc::clone(&broadcaster)),
        shutdown_token.clone(),
    );
    let mut server_task = tokio::spawn(server.run());

    tracing::info!("Market Data API ready");

    tokio::select! {
        result = &mut server_task => {
            broadcaster.shutdown();
            store.close().await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(e.into()),
            };
        }
        () = await_shutdown(shutdown_token) => {}
    }

    let stopped = broadcaster.shutdown();
    tracing::info!(subscriptions = stopped, "Live feeds cancelled");

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, server_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "API server error"),
        Ok(Err(e)) => tracing::error!(error = %e, "API server task failed"),
        Err(_) => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "API server did not stop in time"
        ),
    }

    store.close().await;
    tracing::info!("Market Data API stopped");
    Ok(())
}

/// Load .env from the current directory, else the nearest ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ApiConfig) {
    tracing::info!(
        http_port = config.server.http_port,
        max_connections = config.database.max_connections,
        broadcast_interval_ms = config.broadcast.interval.as_millis(),
        broadcast_depth = config.broadcast.depth,
        max_subscriptions = config.broadcast.max_subscriptions,
        export_dir = ?config.export.dir,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT), then cancel `shutdown_token`.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
