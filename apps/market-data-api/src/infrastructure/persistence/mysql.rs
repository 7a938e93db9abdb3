//! MySQL record store.
//!
//! Each call runs exactly one statement with `fetch_all` on the pool, so a
//! connection is borrowed only for the duration of that statement.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};
use tracing::{debug, info};

use crate::application::ports::{LatestQuery, RangeQuery, RecordStore, StoreError};
use crate::domain::records::{DataKind, OrderBookEntry, RecordSet, TradeEntry};
use crate::infrastructure::config::DatabaseSettings;

const COLUMNS: &str = "SELECT symbol, price, quantity, order_type, market_type, timestamp FROM ";

/// Record store backed by a MySQL connection pool.
#[derive(Debug, Clone)]
pub struct MySqlRecordStore {
    pool: MySqlPool,
}

impl MySqlRecordStore {
    /// Connect a pool sized and timed by `settings`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connection` if the initial connection fails.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .max_lifetime(Duration::from_secs(settings.max_lifetime_secs))
            .connect(&settings.url)
            .await
            .map_err(|e| StoreError::Connection {
                message: e.to_string(),
            })?;

        info!(
            max_connections = settings.max_connections,
            acquire_timeout_secs = settings.acquire_timeout_secs,
            max_lifetime_secs = settings.max_lifetime_secs,
            "Connected to record store"
        );

        Ok(Self { pool })
    }

    /// Close the pool, waiting for borrowed connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch(
        &self,
        kind: DataKind,
        mut builder: QueryBuilder<'_, MySql>,
    ) -> Result<RecordSet, StoreError> {
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        debug!(table = kind.table(), rows = rows.len(), "Fetched rows");
        decode_rows(kind, &rows)
    }
}

fn base_query<'a>(kind: DataKind, symbol: &str, market_type: &str) -> QueryBuilder<'a, MySql> {
    let mut builder = QueryBuilder::new(COLUMNS);
    builder.push(kind.table());
    builder.push(" WHERE symbol = ").push_bind(symbol.to_string());
    builder
        .push(" AND market_type = ")
        .push_bind(market_type.to_string());
    builder
}

fn push_min_quantity(builder: &mut QueryBuilder<'_, MySql>, min_quantity: Option<f64>) {
    if let Some(min) = min_quantity {
        builder.push(" AND quantity > ").push_bind(min);
    }
}

#[async_trait]
impl RecordStore for MySqlRecordStore {
    async fn fetch_range(&self, query: &RangeQuery) -> Result<RecordSet, StoreError> {
        let mut builder = base_query(query.kind, &query.symbol, &query.market_type);
        builder
            .push(" AND timestamp BETWEEN ")
            .push_bind(query.start)
            .push(" AND ")
            .push_bind(query.end);
        push_min_quantity(&mut builder, query.min_quantity);
        builder.push(" ORDER BY id");

        self.fetch(query.kind, builder).await
    }

    async fn fetch_latest(&self, query: &LatestQuery) -> Result<RecordSet, StoreError> {
        let mut builder = base_query(query.kind, &query.symbol, &query.market_type);
        push_min_quantity(&mut builder, query.min_quantity);
        builder
            .push(" ORDER BY timestamp DESC, id DESC LIMIT ")
            .push_bind(query.limit);

        self.fetch(query.kind, builder).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Connection {
                message: err.to_string(),
            }
        }
        other => StoreError::Query {
            message: other.to_string(),
        },
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

fn decode_rows(kind: DataKind, rows: &[MySqlRow]) -> Result<RecordSet, StoreError> {
    match kind {
        DataKind::OrderBook => rows
            .iter()
            .map(decode_order_book)
            .collect::<Result<_, _>>()
            .map(RecordSet::OrderBook),
        DataKind::Trades => rows
            .iter()
            .map(decode_trade)
            .collect::<Result<_, _>>()
            .map(RecordSet::Trades),
    }
}

fn decode_order_book(row: &MySqlRow) -> Result<OrderBookEntry, StoreError> {
    let table = DataKind::OrderBook.table();
    Ok(OrderBookEntry {
        symbol: column(row, table, "symbol")?,
        price: float_column(row, table, "price")?,
        quantity: float_column(row, table, "quantity")?,
        timestamp: column::<Option<NaiveDateTime>>(row, table, "timestamp")?,
        order_type: column::<Option<String>>(row, table, "order_type")?,
        market_type: column(row, table, "market_type")?,
    })
}

fn decode_trade(row: &MySqlRow) -> Result<TradeEntry, StoreError> {
    let table = DataKind::Trades.table();
    Ok(TradeEntry {
        symbol: column(row, table, "symbol")?,
        price: float_column(row, table, "price")?,
        quantity: float_column(row, table, "quantity")?,
        order_type: column(row, table, "order_type")?,
        market_type: column(row, table, "market_type")?,
        timestamp: column(row, table, "timestamp")?,
    })
}

fn column<T>(row: &MySqlRow, table: &'static str, name: &str) -> Result<T, StoreError>
where
    T: for<'r> sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get::<T, _>(name).map_err(|e| StoreError::Decode {
        table,
        message: format!("{name}: {e}"),
    })
}

// FLOAT columns decode as f32 only.
fn float_column(row: &MySqlRow, table: &'static str, name: &str) -> Result<f64, StoreError> {
    row.try_get::<f64, _>(name)
        .or_else(|_| row.try_get::<f32, _>(name).map(f64::from))
        .map_err(|e| StoreError::Decode {
            table,
            message: format!("{name}: {e}"),
        })
}
