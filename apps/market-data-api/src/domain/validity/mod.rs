//! Validity Filter
//!
//! Fixed plausibility bounds applied to every record before it reaches a
//! JSON response or a live push. Export does not apply them.

use super::records::MarketRecord;

/// Exclusive lower price bound.
pub const MIN_PRICE: f64 = 1_000.0;
/// Exclusive upper price bound.
pub const MAX_PRICE: f64 = 100_000.0;
/// Exclusive lower quantity bound.
pub const MIN_QUANTITY: f64 = 0.0;
/// Exclusive upper quantity bound.
pub const MAX_QUANTITY: f64 = 10_000.0;

/// Whether a price/quantity pair lies strictly inside the bounds.
#[must_use]
pub fn is_valid(price: f64, quantity: f64) -> bool {
    MIN_PRICE < price && price < MAX_PRICE && MIN_QUANTITY < quantity && quantity < MAX_QUANTITY
}

/// Keep only valid records, preserving input order.
#[must_use]
pub fn retain_valid<R: MarketRecord>(mut records: Vec<R>) -> Vec<R> {
    records.retain(|r| is_valid(r.price(), r.quantity()));
    records
}
