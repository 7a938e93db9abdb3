//! Range and latest-N query use cases.

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::application::error::{INVALID_DEPTH, ServiceError};
use crate::application::ports::{LatestQuery, RangeQuery, SharedRecordStore};
use crate::domain::records::{
    DataKind, LIQUIDITY_FLOOR, ShapedRecord, parse_request_timestamp,
};

/// Default number of records for latest-N queries.
pub const DEFAULT_DEPTH: u32 = 100;

/// Default decimal places for latest-N price rounding.
pub const DEFAULT_MERGE_DEPTH: i32 = 0;

// =============================================================================
// Request Parameters
// =============================================================================

/// Raw range parameters as received from a query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RangeParams {
    /// Window start, `YYYY-MM-DDTHH:MM`.
    pub start_time: Option<String>,
    /// Window end, `YYYY-MM-DDTHH:MM`.
    pub end_time: Option<String>,
    /// Instrument symbol.
    pub symbol: Option<String>,
    /// Venue category.
    pub market_type: Option<String>,
    /// `orderbook` or `trades`.
    pub data_type: Option<String>,
}

/// Validated range request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    /// Record kind.
    pub kind: DataKind,
    /// Instrument symbol.
    pub symbol: String,
    /// Venue category.
    pub market_type: String,
    /// Inclusive start.
    pub start: NaiveDateTime,
    /// Inclusive end.
    pub end: NaiveDateTime,
}

impl RangeParams {
    /// Validate the parameters.
    ///
    /// `data_type` is checked first so an unknown kind is always reported as
    /// `Invalid data_type`, whatever else is wrong with the request.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::InvalidArgument` for an unknown `data_type` or
    /// a missing or malformed timestamp.
    pub fn validate(&self) -> Result<RangeRequest, ServiceError> {
        let kind: DataKind = self.data_type.as_deref().unwrap_or_default().parse()?;
        let start = parse_bound("start_time", self.start_time.as_deref())?;
        let end = parse_bound("end_time", self.end_time.as_deref())?;

        Ok(RangeRequest {
            kind,
            symbol: self.symbol.clone().unwrap_or_default(),
            market_type: self.market_type.clone().unwrap_or_default(),
            start,
            end,
        })
    }
}

impl RangeRequest {
    /// Store query for this request.
    #[must_use]
    pub fn to_query(&self, min_quantity: Option<f64>) -> RangeQuery {
        RangeQuery {
            kind: self.kind,
            symbol: self.symbol.clone(),
            market_type: self.market_type.clone(),
            start: self.start,
            end: self.end,
            min_quantity,
        }
    }
}

fn parse_bound(name: &str, value: Option<&str>) -> Result<NaiveDateTime, ServiceError> {
    let value = value.ok_or_else(|| ServiceError::invalid(format!("Missing {name}")))?;
    parse_request_timestamp(value).map_err(|_| ServiceError::invalid(format!("Invalid {name}")))
}

/// Raw latest-N parameters as received from a query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatestParams {
    /// Maximum records (default 100).
    pub depth: Option<String>,
    /// Decimal places for price rounding (default 0).
    pub merge_depth: Option<String>,
    /// Venue category.
    pub market_type: Option<String>,
    /// `orderbook` or `trades`.
    pub data_type: Option<String>,
    /// Instrument symbol.
    pub symbol: Option<String>,
}

/// Validated latest-N request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestRequest {
    /// Record kind.
    pub kind: DataKind,
    /// Instrument symbol.
    pub symbol: String,
    /// Venue category.
    pub market_type: String,
    /// Maximum records returned.
    pub depth: u32,
    /// Decimal places for price rounding. Negative rounds left of the point.
    pub merge_depth: i32,
}

impl LatestRequest {
    /// Request with the default depth and rounding.
    #[must_use]
    pub fn new(kind: DataKind, symbol: impl Into<String>, market_type: impl Into<String>) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
            market_type: market_type.into(),
            depth: DEFAULT_DEPTH,
            merge_depth: DEFAULT_MERGE_DEPTH,
        }
    }

    /// Override the depth.
    #[must_use]
    pub const fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Override the rounding.
    #[must_use]
    pub const fn with_merge_depth(mut self, merge_depth: i32) -> Self {
        self.merge_depth = merge_depth;
        self
    }
}

impl LatestParams {
    /// Validate the parameters.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::InvalidArgument` for an unknown `data_type` or
    /// a non-integer or negative `depth`, or a non-integer `merge_depth`.
    pub fn validate(&self) -> Result<LatestRequest, ServiceError> {
        let kind: DataKind = self.data_type.as_deref().unwrap_or_default().parse()?;

        let depth = match self.depth.as_deref() {
            None => DEFAULT_DEPTH,
            Some(raw) => {
                let depth: i64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ServiceError::invalid(INVALID_DEPTH))?;
                if depth < 0 {
                    return Err(ServiceError::invalid(INVALID_DEPTH));
                }
                u32::try_from(depth).unwrap_or(u32::MAX)
            }
        };

        let merge_depth = match self.merge_depth.as_deref() {
            None => DEFAULT_MERGE_DEPTH,
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ServiceError::invalid(INVALID_DEPTH))?,
        };

        Ok(LatestRequest {
            kind,
            symbol: self.symbol.clone().unwrap_or_default(),
            market_type: self.market_type.clone().unwrap_or_default(),
            depth,
            merge_depth,
        })
    }
}

// =============================================================================
// Query Service
// =============================================================================

/// Range and latest-N queries over the record store.
///
/// Both operations apply the liquidity floor in the store query and the
/// validity filter to the result.
#[derive(Clone)]
pub struct QueryService {
    store: SharedRecordStore,
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService").finish_non_exhaustive()
    }
}

impl QueryService {
    /// Create a query service over `store`.
    #[must_use]
    pub fn new(store: SharedRecordStore) -> Self {
        Self { store }
    }

    /// Records in `[start, end]`, in storage order.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for bad parameters, `StoreFailure` if the store fails.
    pub async fn query_range(&self, params: &RangeParams) -> Result<Vec<ShapedRecord>, ServiceError> {
        let request = params.validate()?;
        self.range(&request).await
    }

    /// Records in `[start, end]` for an already validated request.
    ///
    /// # Errors
    ///
    /// `StoreFailure` if the store fails.
    pub async fn range(&self, request: &RangeRequest) -> Result<Vec<ShapedRecord>, ServiceError> {
        let records = self
            .store
            .fetch_range(&request.to_query(Some(LIQUIDITY_FLOOR)))
            .await?;
        let fetched = records.len();
        let records = records.retain_valid();

        tracing::debug!(
            data_type = %request.kind,
            symbol = %request.symbol,
            market_type = %request.market_type,
            fetched,
            valid = records.len(),
            "Range query"
        );

        Ok(records.shape())
    }

    /// Newest records, prices rounded to `merge_depth` places.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for bad parameters, `StoreFailure` if the store fails.
    pub async fn query_latest(
        &self,
        params: &LatestParams,
    ) -> Result<Vec<ShapedRecord>, ServiceError> {
        let request = params.validate()?;
        self.latest(&request).await
    }

    /// Newest records for an already validated request.
    ///
    /// # Errors
    ///
    /// `StoreFailure` if the store fails.
    pub async fn latest(&self, request: &LatestRequest) -> Result<Vec<ShapedRecord>, ServiceError> {
        let query = LatestQuery {
            kind: request.kind,
            symbol: request.symbol.clone(),
            market_type: request.market_type.clone(),
            min_quantity: Some(LIQUIDITY_FLOOR),
            limit: request.depth,
        };
        let records = self.store.fetch_latest(&query).await?;
        let fetched = records.len();
        let records = records.retain_valid();

        tracing::debug!(
            data_type = %request.kind,
            symbol = %request.symbol,
            market_type = %request.market_type,
            depth = request.depth,
            merge_depth = request.merge_depth,
            fetched,
            valid = records.len(),
            "Latest query"
        );

        Ok(records.shape_rounded(request.merge_depth))
    }

    /// Check that the store is reachable.
    ///
    /// # Errors
    ///
    /// `StoreFailure` if the ping fails.
    pub async fn ping(&self) -> Result<(), ServiceError> {
        self.store.ping().await.map_err(ServiceError::from)
    }
}

// =============================================================================
// Tests
// =============================================================================
