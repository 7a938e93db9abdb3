//! Market Record Types
//!
//! Read-only domain types for the two record kinds held in the store:
//! order-book entries and executed trades. Both shape into the same
//! output record for JSON responses and live pushes.
//!
//! # Timestamps
//!
//! Stored datetimes are naive UTC. Output timestamps use ISO-8601 without
//! an offset, with microseconds only when non-zero:
//!
//! ```text
//! 2024-05-01T12:30:00
//! 2024-05-01T12:30:00.250000
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Timelike, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Request-side timestamp format (minute precision, no offset).
pub const REQUEST_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Server-side liquidity floor: live and range queries only return rows with
/// `quantity` strictly above this value. Export does not apply it.
pub const LIQUIDITY_FLOOR: f64 = 0.5;

// =============================================================================
// Data Kind
// =============================================================================

/// Which record kind a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    /// Order-book snapshot rows.
    #[serde(rename = "orderbook")]
    OrderBook,
    /// Executed trades.
    Trades,
}

impl DataKind {
    /// Wire name, also used as the export file stem.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OrderBook => "orderbook",
            Self::Trades => "trades",
        }
    }

    /// Backing table name.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::OrderBook => "order_book",
            Self::Trades => "trade",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a `data_type` value is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid data_type")]
pub struct InvalidDataKind;

impl FromStr for DataKind {
    type Err = InvalidDataKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orderbook" => Ok(Self::OrderBook),
            "trades" => Ok(Self::Trades),
            _ => Err(InvalidDataKind),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// A single resting bid/ask row.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookEntry {
    /// Instrument symbol, e.g. `BTCUSDT`.
    pub symbol: String,
    /// Price level.
    pub price: f64,
    /// Resting quantity.
    pub quantity: f64,
    /// Snapshot time. Nullable in storage.
    pub timestamp: Option<NaiveDateTime>,
    /// Optional side marker.
    pub order_type: Option<String>,
    /// Venue category, e.g. `spot` or `futures`.
    pub market_type: String,
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEntry {
    /// Instrument symbol.
    pub symbol: String,
    /// Execution price.
    pub price: f64,
    /// Executed quantity.
    pub quantity: f64,
    /// Side code: `B` (buy) or `S` (sell).
    pub order_type: String,
    /// Venue category.
    pub market_type: String,
    /// Execution time.
    pub timestamp: NaiveDateTime,
}

impl TradeEntry {
    /// Create a trade stamped with the current UTC time.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        price: f64,
        quantity: f64,
        order_type: impl Into<String>,
        market_type: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            quantity,
            order_type: order_type.into(),
            market_type: market_type.into(),
            timestamp: Utc::now().naive_utc(),
        }
    }

    /// Replace the execution time.
    #[must_use]
    pub const fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Common read access over both record kinds.
pub trait MarketRecord {
    /// Record price.
    fn price(&self) -> f64;
    /// Record quantity.
    fn quantity(&self) -> f64;
    /// Record time, if present.
    fn timestamp(&self) -> Option<NaiveDateTime>;
    /// Shape into the output representation.
    fn shape(&self) -> ShapedRecord;
}

impl MarketRecord for OrderBookEntry {
    fn price(&self) -> f64 {
        self.price
    }

    fn quantity(&self) -> f64 {
        self.quantity
    }

    fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }

    fn shape(&self) -> ShapedRecord {
        ShapedRecord {
            symbol: self.symbol.clone(),
            price: self.price,
            quantity: self.quantity,
            order_type: self.order_type.clone(),
            timestamp: self.timestamp.map(|ts| isoformat(&ts)),
            market_type: self.market_type.clone(),
        }
    }
}

impl MarketRecord for TradeEntry {
    fn price(&self) -> f64 {
        self.price
    }

    fn quantity(&self) -> f64 {
        self.quantity
    }

    fn timestamp(&self) -> Option<NaiveDateTime> {
        Some(self.timestamp)
    }

    fn shape(&self) -> ShapedRecord {
        ShapedRecord {
            symbol: self.symbol.clone(),
            price: self.price,
            quantity: self.quantity,
            order_type: Some(self.order_type.clone()),
            timestamp: Some(isoformat(&self.timestamp)),
            market_type: self.market_type.clone(),
        }
    }
}

// =============================================================================
// Record Set
// =============================================================================

/// A homogeneous batch of records as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordSet {
    /// Order-book rows.
    OrderBook(Vec<OrderBookEntry>),
    /// Trade rows.
    Trades(Vec<TradeEntry>),
}

impl RecordSet {
    /// Empty set of the given kind.
    #[must_use]
    pub const fn empty(kind: DataKind) -> Self {
        match kind {
            DataKind::OrderBook => Self::OrderBook(Vec::new()),
            DataKind::Trades => Self::Trades(Vec::new()),
        }
    }

    /// Kind of records held.
    #[must_use]
    pub const fn kind(&self) -> DataKind {
        match self {
            Self::OrderBook(_) => DataKind::OrderBook,
            Self::Trades(_) => DataKind::Trades,
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::OrderBook(rows) => rows.len(),
            Self::Trades(rows) => rows.len(),
        }
    }

    /// Whether the set holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop records outside the validity bounds, keeping order.
    #[must_use]
    pub fn retain_valid(self) -> Self {
        match self {
            Self::OrderBook(rows) => Self::OrderBook(crate::domain::validity::retain_valid(rows)),
            Self::Trades(rows) => Self::Trades(crate::domain::validity::retain_valid(rows)),
        }
    }

    /// Shape every record for output.
    #[must_use]
    pub fn shape(&self) -> Vec<ShapedRecord> {
        match self {
            Self::OrderBook(rows) => rows.iter().map(MarketRecord::shape).collect(),
            Self::Trades(rows) => rows.iter().map(MarketRecord::shape).collect(),
        }
    }

    /// Shape every record, rounding prices to `places` decimal places.
    #[must_use]
    pub fn shape_rounded(&self, places: i32) -> Vec<ShapedRecord> {
        self.shape()
            .into_iter()
            .map(|mut record| {
                record.price = round_price(record.price, places);
                record
            })
            .collect()
    }
}

// =============================================================================
// Shaped Output
// =============================================================================

/// Output shape shared by JSON responses and live pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapedRecord {
    /// Instrument symbol.
    pub symbol: String,
    /// Price (possibly rounded).
    pub price: f64,
    /// Quantity.
    pub quantity: f64,
    /// Side code or marker.
    pub order_type: Option<String>,
    /// ISO-8601 timestamp.
    pub timestamp: Option<String>,
    /// Venue category.
    pub market_type: String,
}

// =============================================================================
// Helpers
// =============================================================================

/// Parse a request timestamp (`YYYY-MM-DDTHH:MM`).
///
/// # Errors
///
/// Returns the chrono parse error if the input does not match the format.
pub fn parse_request_timestamp(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, REQUEST_TIMESTAMP_FORMAT)
}

/// ISO-8601 rendering with microseconds only when non-zero.
#[must_use]
pub fn isoformat(ts: &NaiveDateTime) -> String {
    format_with_separator(ts, 'T')
}

/// CSV rendering: space separator, microseconds only when non-zero.
#[must_use]
pub fn csv_timestamp(ts: &NaiveDateTime) -> String {
    format_with_separator(ts, ' ')
}

fn format_with_separator(ts: &NaiveDateTime, sep: char) -> String {
    let micros = ts.nanosecond() / 1_000;
    let base = ts.format(&format!("%Y-%m-%d{sep}%H:%M:%S")).to_string();
    if micros == 0 {
        base
    } else {
        format!("{base}.{micros:06}")
    }
}

/// Round a price to `places` decimal places, half-to-even on the exact
/// binary value. Negative `places` rounds to tens, hundreds, and so on.
///
/// Prices that cannot be represented as a decimal are returned unchanged.
#[must_use]
pub fn round_price(price: f64, places: i32) -> f64 {
    let Some(exact) = Decimal::from_f64_retain(price) else {
        return price;
    };

    let rounded = if places >= 0 {
        let places = places.unsigned_abs();
        if places >= exact.scale() {
            return price;
        }
        exact.round_dp_with_strategy(places, RoundingStrategy::MidpointNearestEven)
    } else {
        let Some(factor) = Decimal::from_i128(10_i128.saturating_pow(places.unsigned_abs()))
        else {
            return 0.0;
        };
        let Some(scaled) = exact.checked_div(factor) else {
            return 0.0;
        };
        let Some(value) = scaled
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .checked_mul(factor)
        else {
            return price;
        };
        value
    };

    rounded.to_f64().unwrap_or(price)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use test_case::test_case;

    use super::*;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test_case("orderbook" => Ok(DataKind::OrderBook))]
    #[test_case("trades" => Ok(DataKind::Trades))]
    #[test_case("foo" => Err(InvalidDataKind))]
    #[test_case("Trades" => Err(InvalidDataKind); "case sensitive")]
    #[test_case("" => Err(InvalidDataKind); "empty")]
    fn data_kind_parsing(input: &str) -> Result<DataKind, InvalidDataKind> {
        input.parse()
    }

    #[test]
    fn data_kind_error_message() {
        assert_eq!(InvalidDataKind.to_string(), "Invalid data_type");
    }

    #[test]
    fn data_kind_tables() {
        assert_eq!(DataKind::OrderBook.table(), "order_book");
        assert_eq!(DataKind::Trades.table(), "trade");
        assert_eq!(DataKind::OrderBook.to_string(), "orderbook");
    }

    #[test]
    fn request_timestamp_parses_minute_precision() {
        let parsed = parse_request_timestamp("2024-05-01T12:30").unwrap();
        assert_eq!(parsed, ts(12, 30, 0));
    }

    #[test_case("2024-05-01 12:30"; "space separator")]
    #[test_case("2024-05-01T12:30:15"; "seconds")]
    #[test_case("2024-13-01T12:30"; "bad month")]
    #[test_case(""; "empty")]
    fn request_timestamp_rejects(input: &str) {
        assert!(parse_request_timestamp(input).is_err());
    }

    #[test]
    fn isoformat_omits_zero_micros() {
        assert_eq!(isoformat(&ts(9, 5, 7)), "2024-05-01T09:05:07");
    }

    #[test]
    fn isoformat_includes_micros() {
        let t = ts(9, 5, 7) + chrono::Duration::microseconds(250_000);
        assert_eq!(isoformat(&t), "2024-05-01T09:05:07.250000");
        assert_eq!(csv_timestamp(&t), "2024-05-01 09:05:07.250000");
    }

    #[test_case(50123.46, 1, 50123.5)]
    #[test_case(50000.04, 1, 50000.0)]
    #[test_case(50000.5, 0, 50000.0; "half to even down")]
    #[test_case(50001.5, 0, 50002.0; "half to even up")]
    #[test_case(2.675, 2, 2.67; "binary value below midpoint")]
    #[test_case(12345.678, 5, 12345.678; "more places than digits")]
    #[test_case(12345.678, -2, 12300.0; "negative places")]
    fn round_price_cases(price: f64, places: i32, expected: f64) {
        let rounded = round_price(price, places);
        assert!(
            (rounded - expected).abs() < 1e-9,
            "round_price({price}, {places}) = {rounded}, expected {expected}"
        );
    }

    #[test]
    fn round_price_non_finite_passthrough() {
        assert!(round_price(f64::NAN, 2).is_nan());
        assert!(round_price(f64::INFINITY, 2).is_infinite());
    }

    #[test]
    fn trade_shape_fills_optional_fields() {
        let trade = TradeEntry::new("BTCUSDT", 50000.0, 1.5, "B", "spot").at(ts(1, 2, 3));
        let shaped = trade.shape();
        assert_eq!(shaped.order_type.as_deref(), Some("B"));
        assert_eq!(shaped.timestamp.as_deref(), Some("2024-05-01T01:02:03"));
    }

    #[test]
    fn order_book_shape_keeps_nulls() {
        let entry = OrderBookEntry {
            symbol: "BTCUSDT".to_string(),
            price: 50000.0,
            quantity: 2.0,
            timestamp: None,
            order_type: None,
            market_type: "futures".to_string(),
        };
        let json = serde_json::to_value(entry.shape()).unwrap();
        assert!(json["timestamp"].is_null());
        assert!(json["order_type"].is_null());
        assert_eq!(json["market_type"], "futures");
    }

    #[test]
    fn shape_rounded_only_touches_price() {
        let set = RecordSet::Trades(vec![
            TradeEntry::new("BTCUSDT", 50123.46, 1.234, "S", "spot").at(ts(0, 0, 3)),
        ]);
        let shaped = set.shape_rounded(1);
        assert!((shaped[0].price - 50123.5).abs() < f64::EPSILON);
        assert!((shaped[0].quantity - 1.234).abs() < f64::EPSILON);
    }

    #[test]
    fn record_set_kind_and_len() {
        let set = RecordSet::empty(DataKind::OrderBook);
        assert_eq!(set.kind(), DataKind::OrderBook);
        assert!(set.is_empty());
    }
}
