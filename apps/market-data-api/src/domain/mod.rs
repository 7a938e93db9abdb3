//! Domain Layer - Market record types and business rules.
//!
//! This layer holds the record shapes served by the API, the validity
//! bounds applied before output, and the live-feed subscription registry.
//! Nothing here touches the network or the database.

/// Order-book and trade records, output shaping, price rounding.
pub mod records;

/// Subscription tracking and cancellation.
pub mod subscription;

/// Price and quantity plausibility bounds.
pub mod validity;
