//! In-memory record store for testing and development.
//!
//! Mirrors the MySQL adapter's ordering: range results in insertion order,
//! latest results by timestamp descending with later inserts first on ties.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::RwLock;

use crate::application::ports::{LatestQuery, RangeQuery, RecordStore, StoreError};
use crate::domain::records::{DataKind, MarketRecord, OrderBookEntry, RecordSet, TradeEntry};

/// In-memory implementation of `RecordStore`.
///
/// Suitable for testing and development. Not for production use.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    order_book: RwLock<Vec<OrderBookEntry>>,
    trades: RwLock<Vec<TradeEntry>>,
    queries: AtomicUsize,
    failures_pending: AtomicUsize,
    unreachable: AtomicBool,
}

impl InMemoryRecordStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an order-book row.
    pub fn insert_order_book(&self, entry: OrderBookEntry) {
        self.order_book.write().push(entry);
    }

    /// Append a trade row.
    pub fn insert_trade(&self, entry: TradeEntry) {
        self.trades.write().push(entry);
    }

    /// Append several trade rows.
    pub fn extend_trades(&self, entries: impl IntoIterator<Item = TradeEntry>) {
        self.trades.write().extend(entries);
    }

    /// Number of stored rows of `kind`.
    #[must_use]
    pub fn len(&self, kind: DataKind) -> usize {
        match kind {
            DataKind::OrderBook => self.order_book.read().len(),
            DataKind::Trades => self.trades.read().len(),
        }
    }

    /// Whether no rows of either kind are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order_book.read().is_empty() && self.trades.read().is_empty()
    }

    /// Number of fetch calls served or failed so far.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Fail the next `n` fetch calls with a query error.
    pub fn fail_next(&self, n: usize) {
        self.failures_pending.store(n, Ordering::SeqCst);
    }

    /// Make `ping` fail until reset.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn begin_query(&self) -> Result<(), StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Query {
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

fn in_window(ts: Option<NaiveDateTime>, start: NaiveDateTime, end: NaiveDateTime) -> bool {
    ts.is_some_and(|ts| start <= ts && ts <= end)
}

fn above(quantity: f64, min_quantity: Option<f64>) -> bool {
    min_quantity.is_none_or(|min| quantity > min)
}

fn select_range<R>(rows: &[R], query: &RangeQuery, keys: impl Fn(&R) -> (&str, &str)) -> Vec<R>
where
    R: MarketRecord + Clone,
{
    rows.iter()
        .filter(|r| keys(*r) == (query.symbol.as_str(), query.market_type.as_str()))
        .filter(|r| in_window(r.timestamp(), query.start, query.end))
        .filter(|r| above(r.quantity(), query.min_quantity))
        .cloned()
        .collect()
}

fn select_latest<R>(rows: &[R], query: &LatestQuery, keys: impl Fn(&R) -> (&str, &str)) -> Vec<R>
where
    R: MarketRecord + Clone,
{
    let mut matching: Vec<(usize, &R)> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| keys(*r) == (query.symbol.as_str(), query.market_type.as_str()))
        .filter(|(_, r)| above(r.quantity(), query.min_quantity))
        .collect();

    matching.sort_by(|(ia, a), (ib, b)| b.timestamp().cmp(&a.timestamp()).then(ib.cmp(ia)));

    let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
    matching
        .into_iter()
        .take(limit)
        .map(|(_, r)| r.clone())
        .collect()
}

fn order_book_keys(entry: &OrderBookEntry) -> (&str, &str) {
    (entry.symbol.as_str(), entry.market_type.as_str())
}

fn trade_keys(entry: &TradeEntry) -> (&str, &str) {
    (entry.symbol.as_str(), entry.market_type.as_str())
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn fetch_range(&self, query: &RangeQuery) -> Result<RecordSet, StoreError> {
        self.begin_query()?;
        Ok(match query.kind {
            DataKind::OrderBook => {
                RecordSet::OrderBook(select_range(&self.order_book.read(), query, order_book_keys))
            }
            DataKind::Trades => {
                RecordSet::Trades(select_range(&self.trades.read(), query, trade_keys))
            }
        })
    }

    async fn fetch_latest(&self, query: &LatestQuery) -> Result<RecordSet, StoreError> {
        self.begin_query()?;
        Ok(match query.kind {
            DataKind::OrderBook => RecordSet::OrderBook(select_latest(
                &self.order_book.read(),
                query,
                order_book_keys,
            )),
            DataKind::Trades => {
                RecordSet::Trades(select_latest(&self.trades.read(), query, trade_keys))
            }
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection {
                message: "store unreachable".to_string(),
            });
        }
        Ok(())
    }
}
