//! HTTP API Integration Tests
//!
//! Drives the full router against the in-memory record store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use market_data_api::{
    AppState, ExportService, FeedConfig, InMemoryRecordStore, OrderBookEntry, QueryService,
    SharedRecordStore, SubscriptionBroadcaster, SubscriptionRegistry, TradeEntry, create_router,
};

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn trade(price: f64, quantity: f64, ts: NaiveDateTime) -> TradeEntry {
    TradeEntry::new("BTCUSDT", price, quantity, "B", "spot").at(ts)
}

struct TestApp {
    router: Router,
    store: Arc<InMemoryRecordStore>,
    export_dir: tempfile::TempDir,
}

fn setup() -> TestApp {
    let store = Arc::new(InMemoryRecordStore::new());
    let shared: SharedRecordStore = store.clone();
    let export_dir = tempfile::tempdir().unwrap();

    let queries = QueryService::new(Arc::clone(&shared));
    let exports = ExportService::new(shared).with_export_dir(export_dir.path());
    let broadcaster = Arc::new(SubscriptionBroadcaster::new(
        queries.clone(),
        Arc::new(SubscriptionRegistry::new(8)),
        FeedConfig::default(),
    ));

    TestApp {
        router: create_router(AppState::new(queries, exports, broadcaster)),
        store,
        export_dir,
    }
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    use tower::ServiceExt;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn get_json(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

// =============================================================================
// Range Query
// =============================================================================

#[tokio::test]
async fn get_data_filters_window_liquidity_and_validity() {
    let app = setup();
    app.store.extend_trades([
        trade(50_000.0, 1.0, at(10, 0)),
        trade(50_100.0, 0.4, at(10, 5)),
        trade(500.0, 2.0, at(10, 10)),
        trade(50_200.0, 3.0, at(10, 15)),
        trade(50_300.0, 1.0, at(11, 30)),
    ]);

    let (status, body) = get_json(
        &app,
        "/get-data?start_time=2024-05-01T10:00&end_time=2024-05-01T11:00\
         &symbol=BTCUSDT&market_type=spot&data_type=trades",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["price"], 50_000.0);
    assert_eq!(rows[0]["timestamp"], "2024-05-01T10:00:00");
    assert_eq!(rows[1]["price"], 50_200.0);
    assert_eq!(rows[1]["order_type"], "B");
}

#[tokio::test]
async fn get_data_empty_window_returns_empty_array() {
    let app = setup();
    app.store.insert_trade(trade(50_000.0, 1.0, at(9, 0)));

    let (status, body) = get_json(
        &app,
        "/get-data?start_time=2024-05-01T10:00&end_time=2024-05-01T11:00\
         &symbol=BTCUSDT&market_type=spot&data_type=trades",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));
}

#[tokio::test]
async fn get_data_order_book_null_timestamp_skipped() {
    let app = setup();
    app.store.insert_order_book(OrderBookEntry {
        symbol: "BTCUSDT".to_string(),
        price: 50_000.0,
        quantity: 1.0,
        timestamp: None,
        order_type: None,
        market_type: "spot".to_string(),
    });
    app.store.insert_order_book(OrderBookEntry {
        symbol: "BTCUSDT".to_string(),
        price: 50_001.0,
        quantity: 1.0,
        timestamp: Some(at(10, 30)),
        order_type: Some("bid".to_string()),
        market_type: "spot".to_string(),
    });

    let (status, body) = get_json(
        &app,
        "/get-data?start_time=2024-05-01T10:00&end_time=2024-05-01T11:00\
         &symbol=BTCUSDT&market_type=spot&data_type=orderbook",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["order_type"], "bid");
}

#[tokio::test]
async fn get_data_bad_timestamp_is_client_error() {
    let app = setup();

    let (status, body) = get_json(
        &app,
        "/get-data?start_time=yesterday&end_time=2024-05-01T11:00&data_type=trades",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid start_time");
}

// =============================================================================
// Latest-N Query
// =============================================================================

#[tokio::test]
async fn get_latest_rounds_prices_newest_first() {
    let app = setup();
    app.store.extend_trades([
        trade(50_123.46, 1.0, at(10, 3)),
        trade(50_000.04, 2.0, at(10, 2)),
        trade(1.0, 1.0, at(10, 1)),
    ]);

    let (status, body) = get_json(
        &app,
        "/get-latest-orderbook?depth=2&merge_depth=1&market_type=spot\
         &data_type=trades&symbol=BTCUSDT",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["price"], 50_123.5);
    assert_eq!(rows[0]["timestamp"], "2024-05-01T10:03:00");
    assert_eq!(rows[1]["price"], 50_000.0);
    assert_eq!(rows[1]["timestamp"], "2024-05-01T10:02:00");
}

#[tokio::test]
async fn get_latest_defaults_round_to_whole_numbers() {
    let app = setup();
    app.store.insert_trade(trade(50_000.6, 1.0, at(10, 0)));

    let (status, body) = get_json(
        &app,
        "/get-latest-orderbook?market_type=spot&data_type=trades&symbol=BTCUSDT",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["price"], 50_001.0);
}

#[tokio::test]
async fn get_latest_depth_zero_is_empty() {
    let app = setup();
    app.store.insert_trade(trade(50_000.0, 1.0, at(10, 0)));

    let (status, body) = get_json(
        &app,
        "/get-latest-orderbook?depth=0&market_type=spot&data_type=trades&symbol=BTCUSDT",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));
}

#[tokio::test]
async fn get_latest_non_numeric_depth_is_client_error() {
    let app = setup();

    let (status, body) = get_json(
        &app,
        "/get-latest-orderbook?depth=lots&data_type=trades",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid depth or merge_depth");
}

#[tokio::test]
async fn store_failure_is_server_error() {
    let app = setup();
    app.store.fail_next(1);

    let (status, body) = get_json(
        &app,
        "/get-latest-orderbook?market_type=spot&data_type=trades&symbol=BTCUSDT",
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
}

// =============================================================================
// Invalid data_type
// =============================================================================

#[tokio::test]
async fn invalid_data_type_rejected_on_every_endpoint() {
    let app = setup();
    let uris = [
        "/get-data?start_time=2024-05-01T10:00&end_time=2024-05-01T11:00&data_type=foo",
        "/get-latest-orderbook?depth=5&data_type=foo",
        "/export-data?start_time=2024-05-01T10:00&end_time=2024-05-01T11:00&data_type=foo",
    ];

    for uri in uris {
        let (status, body) = get_json(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body, serde_json::json!({"error": "Invalid data_type"}), "{uri}");
    }
    assert_eq!(app.store.query_count(), 0);
}

// =============================================================================
// Export
// =============================================================================

#[tokio::test]
async fn export_is_unfiltered_csv_attachment() {
    let app = setup();
    app.store.extend_trades([
        trade(50_000.0, 1.0, at(10, 0)),
        trade(500.0, 0.1, at(10, 30)),
    ]);

    let (status, headers, body) = get(
        &app,
        "/export-data?start_time=2024-05-01T10:00&end_time=2024-05-01T11:00\
         &symbol=BTCUSDT&market_type=spot&data_type=trades",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/csv");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=trades.csv"
    );

    let text = String::from_utf8(body).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "symbol,price,quantity,order_type,timestamp,market_type");
    assert!(lines[1].starts_with("BTCUSDT,50000.0,1.0,B,2024-05-01 10:00:00"));
    assert!(lines[2].starts_with("BTCUSDT,500.0,0.1,B,"));

    assert_eq!(
        std::fs::read_dir(app.export_dir.path()).unwrap().count(),
        0,
        "temporary export file must be removed"
    );
}

#[tokio::test]
async fn export_empty_range_is_header_only() {
    let app = setup();

    let (status, _, body) = get(
        &app,
        "/export-data?start_time=2024-05-01T10:00&end_time=2024-05-01T11:00\
         &symbol=BTCUSDT&market_type=spot&data_type=orderbook",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert_eq!(text.lines().count(), 1);
}

#[tokio::test]
async fn export_store_failure_leaves_no_file() {
    let app = setup();
    app.store.fail_next(1);

    let (status, _, _) = get(
        &app,
        "/export-data?start_time=2024-05-01T10:00&end_time=2024-05-01T11:00&data_type=trades",
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(std::fs::read_dir(app.export_dir.path()).unwrap().count(), 0);
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn liveness_and_readiness() {
    let app = setup();

    let (status, _, body) = get(&app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    let (status, _, _) = get(&app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    app.store.set_unreachable(true);
    let (status, _, body) = get(&app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, b"NOT READY");
}

#[tokio::test]
async fn health_reports_store_and_subscriptions() {
    let app = setup();

    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"]["reachable"], true);
    assert_eq!(body["subscriptions"]["limit"], 8);

    app.store.set_unreachable(true);
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}
