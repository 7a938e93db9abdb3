//! Query and export handlers.

use std::future::Future;
use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use super::AppState;
use crate::application::error::ServiceError;
use crate::application::services::{CSV_CONTENT_TYPE, LatestParams, RangeParams};
use crate::domain::records::{DataKind, ShapedRecord};
use crate::infrastructure::metrics::{self, Endpoint, Outcome};

/// `GET /get-data`
pub async fn get_data(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<ShapedRecord>>, ServiceError> {
    let kind = params.data_type.as_deref().and_then(|v| v.parse().ok());
    let records = observe(Endpoint::Range, kind, state.queries.query_range(&params)).await?;
    metrics::record_rows_returned(Endpoint::Range, records.len());
    Ok(Json(records))
}

/// `GET /get-latest-orderbook`
pub async fn get_latest(
    State(state): State<AppState>,
    Query(params): Query<LatestParams>,
) -> Result<Json<Vec<ShapedRecord>>, ServiceError> {
    let kind = params.data_type.as_deref().and_then(|v| v.parse().ok());
    let records = observe(Endpoint::Latest, kind, state.queries.query_latest(&params)).await?;
    metrics::record_rows_returned(Endpoint::Latest, records.len());
    Ok(Json(records))
}

/// `GET /export-data`
pub async fn export_data(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Result<Response, ServiceError> {
    let kind = params.data_type.as_deref().and_then(|v| v.parse().ok());
    let artifact = observe(Endpoint::Export, kind, state.exports.export(&params)).await?;
    metrics::record_export_rows(artifact.kind, artifact.rows);

    let disposition = format!("attachment; filename={}", artifact.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}

async fn observe<T>(
    endpoint: Endpoint,
    kind: Option<DataKind>,
    operation: impl Future<Output = Result<T, ServiceError>>,
) -> Result<T, ServiceError> {
    let started = Instant::now();
    let result = operation.await;

    let outcome = match &result {
        Ok(_) => Outcome::Ok,
        Err(e) if e.is_client_error() => Outcome::Invalid,
        Err(_) => Outcome::Failed,
    };
    metrics::record_query(endpoint, kind, outcome);
    if outcome != Outcome::Invalid {
        metrics::record_query_duration(endpoint, started.elapsed());
    }
    result
}
