#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::unreadable_literal,
        clippy::items_after_statements
    )
)]

//! Market Data API - Order Book & Trade Query Service
//!
//! Serves order-book snapshots and executed trades from a MySQL store:
//! time-windowed range queries, latest-N snapshots with price rounding,
//! unfiltered CSV export, and a per-subscriber live feed over WebSocket.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Record types and business rules
//!   - `records`: Order-book and trade records, output shaping, rounding
//!   - `validity`: Price and quantity plausibility bounds
//!   - `subscription`: Cancellable subscription registry
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Record store interface
//!   - `services`: Range, latest-N and export services
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `persistence`: MySQL and in-memory record stores
//!   - `broadcast`: Live-feed tasks and feed messages
//!   - `http`: REST and WebSocket routes
//!   - `config`: Environment configuration
//!   - `health`: Health check and metrics endpoints
//!
//! # Data Flow
//!
//! ```text
//!                  ┌──────────────┐     ┌─────────────┐     ┌──────────┐
//! GET /get-data ──►│              │     │             │     │          │
//! GET /get-latest ►│ QueryService ├────►│ RecordStore ├────►│  MySQL   │
//! GET /export ────►│ ExportService│     │   (port)    │     │          │
//!                  └──────▲───────┘     └─────────────┘     └──────────┘
//!                         │
//! WS /ws ──► Broadcaster ─┘  (one task per subscription, every interval)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Record types and business rules.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::records::{DataKind, OrderBookEntry, RecordSet, ShapedRecord, TradeEntry};
pub use domain::subscription::{ClientId, SubscriptionKey, SubscriptionRegistry};

// Application
pub use application::error::ServiceError;
pub use application::ports::{RecordStore, SharedRecordStore, StoreError};
pub use application::services::{ExportService, QueryService};

// Infrastructure config
pub use infrastructure::config::{ApiConfig, ConfigError};

// Live feed
pub use infrastructure::broadcast::{
    ClientMessage, FeedConfig, ServerMessage, SharedBroadcaster, SubscriptionBroadcaster,
};

// HTTP surface
pub use infrastructure::http::{ApiServer, AppState, ServerError, create_router};

// Record stores
pub use infrastructure::persistence::{InMemoryRecordStore, MySqlRecordStore};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
