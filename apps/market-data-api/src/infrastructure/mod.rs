//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the HTTP surface.

/// Live-feed task management and feed messages.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Health check and metrics endpoints.
pub mod health;

/// axum routes and server.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Record store adapters (MySQL, in-memory).
pub mod persistence;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
