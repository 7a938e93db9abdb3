//! Record Store Port (Driven Port)
//!
//! Read-only access to stored order-book and trade records. Every call
//! borrows one pooled connection for one query and returns it before the
//! future resolves.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::domain::records::{DataKind, RecordSet};

/// Records of one kind whose timestamp lies in a closed interval.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    /// Record kind (selects the table).
    pub kind: DataKind,
    /// Exact symbol match.
    pub symbol: String,
    /// Exact market type match.
    pub market_type: String,
    /// Inclusive lower bound.
    pub start: NaiveDateTime,
    /// Inclusive upper bound.
    pub end: NaiveDateTime,
    /// Keep only rows with `quantity` strictly above this value.
    pub min_quantity: Option<f64>,
}

/// The most recent records of one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestQuery {
    /// Record kind (selects the table).
    pub kind: DataKind,
    /// Exact symbol match.
    pub symbol: String,
    /// Exact market type match.
    pub market_type: String,
    /// Keep only rows with `quantity` strictly above this value.
    pub min_quantity: Option<f64>,
    /// Maximum rows, newest first.
    pub limit: u32,
}

/// Record store errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Could not obtain a connection.
    #[error("store connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// The query itself failed.
    #[error("store query failed: {message}")]
    Query {
        /// Error details.
        message: String,
    },

    /// A row could not be decoded into a record.
    #[error("failed to decode {table} row: {message}")]
    Decode {
        /// Source table.
        table: &'static str,
        /// Error details.
        message: String,
    },
}

/// Read access to the record store.
///
/// `fetch_range` returns rows in storage order. `fetch_latest` returns rows
/// ordered by timestamp descending, truncated to `limit`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch records whose timestamp falls within `[start, end]`.
    async fn fetch_range(&self, query: &RangeQuery) -> Result<RecordSet, StoreError>;

    /// Fetch the newest `limit` records.
    async fn fetch_latest(&self, query: &LatestQuery) -> Result<RecordSet, StoreError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Store handle shared by services and spawned subscription tasks.
pub type SharedRecordStore = Arc<dyn RecordStore>;
