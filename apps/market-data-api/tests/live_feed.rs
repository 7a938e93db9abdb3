//! Live Feed Integration Tests
//!
//! Exercises subscription tasks against the in-memory record store with
//! paused time, so each interval elapses instantly.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio::time::timeout;

use market_data_api::infrastructure::broadcast::{FeedRequest, SubscribeError, SubscribeOutcome};
use market_data_api::{
    DataKind, FeedConfig, InMemoryRecordStore, QueryService, ServerMessage, SharedRecordStore,
    SubscriptionBroadcaster, SubscriptionKey, SubscriptionRegistry, TradeEntry,
};

const INTERVAL: Duration = Duration::from_secs(1);

struct Harness {
    broadcaster: SubscriptionBroadcaster,
    registry: Arc<SubscriptionRegistry>,
    store: Arc<InMemoryRecordStore>,
}

fn setup(limit: usize) -> Harness {
    let store = Arc::new(InMemoryRecordStore::new());
    let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    store.extend_trades([
        TradeEntry::new("BTCUSDT", 50_000.4, 1.0, "B", "spot").at(ts),
        TradeEntry::new("BTCUSDT", 50_010.0, 0.2, "S", "spot").at(ts),
    ]);

    let shared: SharedRecordStore = store.clone();
    let registry = Arc::new(SubscriptionRegistry::new(limit));
    let broadcaster = SubscriptionBroadcaster::new(
        QueryService::new(shared),
        Arc::clone(&registry),
        FeedConfig {
            interval: INTERVAL,
            depth: 10,
        },
    );

    Harness {
        broadcaster,
        registry,
        store,
    }
}

fn trades_request() -> FeedRequest {
    FeedRequest {
        symbol: "BTCUSDT".to_string(),
        market_type: "spot".to_string(),
        data_type: "trades".to_string(),
    }
}

fn trades_key() -> SubscriptionKey {
    SubscriptionKey::new("BTCUSDT", "spot", DataKind::Trades)
}

async fn next(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
    timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("timed out waiting for feed message")
        .expect("feed channel closed")
}

#[tokio::test(start_paused = true)]
async fn ack_precedes_periodic_pushes() {
    let h = setup(8);
    let (tx, mut rx) = mpsc::channel(16);

    let outcome = h.broadcaster.subscribe(1, &trades_request(), tx).await.unwrap();
    assert_eq!(outcome, SubscribeOutcome::Started(trades_key()));

    assert_eq!(
        next(&mut rx).await,
        ServerMessage::Subscribed { key: trades_key() }
    );

    for _ in 0..3 {
        let ServerMessage::Data { key, data } = next(&mut rx).await else {
            panic!("expected data push");
        };
        assert_eq!(key, trades_key());
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].price, 50_000.0);
    }
    assert!(h.store.query_count() >= 3);
}

#[tokio::test(start_paused = true)]
async fn one_push_per_elapsed_interval() {
    const INTERVALS: u32 = 5;

    let h = setup(8);
    let (tx, mut rx) = mpsc::channel(32);
    h.broadcaster.subscribe(1, &trades_request(), tx).await.unwrap();
    assert!(matches!(
        next(&mut rx).await,
        ServerMessage::Subscribed { .. }
    ));

    // Pushes land at 0s, 1s, ..., 5s; stop halfway to the next tick.
    tokio::time::sleep(INTERVAL * INTERVALS + INTERVAL / 2).await;

    let mut pushes = 0;
    while let Ok(message) = rx.try_recv() {
        assert!(matches!(message, ServerMessage::Data { .. }));
        pushes += 1;
    }
    assert_eq!(pushes, INTERVALS as usize + 1);
    assert_eq!(h.store.query_count(), pushes);
    assert_eq!(h.registry.active_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn first_push_is_immediate_then_periodic() {
    let h = setup(8);
    let (tx, mut rx) = mpsc::channel(16);
    let subscribed_at = tokio::time::Instant::now();
    h.broadcaster.subscribe(1, &trades_request(), tx).await.unwrap();

    next(&mut rx).await;
    next(&mut rx).await;
    assert_eq!(subscribed_at.elapsed(), Duration::ZERO);

    next(&mut rx).await;
    assert_eq!(subscribed_at.elapsed(), INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn closed_sink_is_rejected_without_task() {
    let h = setup(8);
    let (tx, rx) = mpsc::channel(16);
    drop(rx);

    let err = h.broadcaster.subscribe(1, &trades_request(), tx).await.unwrap_err();
    assert_eq!(err, SubscribeError::ChannelClosed);
    assert_eq!(h.registry.active_count(), 0);

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(h.store.query_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_iteration_keeps_subscription_alive() {
    let h = setup(8);
    h.store.fail_next(1);
    let (tx, mut rx) = mpsc::channel(16);
    h.broadcaster.subscribe(1, &trades_request(), tx).await.unwrap();

    assert!(matches!(
        next(&mut rx).await,
        ServerMessage::Subscribed { .. }
    ));
    assert!(matches!(next(&mut rx).await, ServerMessage::Data { .. }));
    assert!(h.store.query_count() >= 2);
    assert_eq!(h.registry.active_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_receiver_stops_task() {
    let h = setup(8);
    let (tx, mut rx) = mpsc::channel(16);
    h.broadcaster.subscribe(1, &trades_request(), tx).await.unwrap();
    next(&mut rx).await;
    next(&mut rx).await;
    drop(rx);

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(h.registry.active_count(), 0);

    let queries = h.store.query_count();
    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(h.store.query_count(), queries);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_client_feeds() {
    let h = setup(8);
    let (tx, mut rx) = mpsc::channel(16);
    h.broadcaster.subscribe(7, &trades_request(), tx.clone()).await.unwrap();
    h.broadcaster
        .subscribe(
            7,
            &FeedRequest {
                data_type: "orderbook".to_string(),
                ..trades_request()
            },
            tx,
        )
        .await
        .unwrap();
    assert_eq!(h.registry.active_count(), 2);

    assert_eq!(h.broadcaster.disconnect(7), 2);
    assert_eq!(h.registry.active_count(), 0);

    // Both tasks drop their sinks on exit, closing the channel.
    let drained = timeout(Duration::from_secs(30), async {
        while rx.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok());
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_stops_only_that_feed() {
    let h = setup(8);
    let (tx, _rx) = mpsc::channel(16);
    h.broadcaster.subscribe(3, &trades_request(), tx.clone()).await.unwrap();
    h.broadcaster
        .subscribe(
            3,
            &FeedRequest {
                symbol: "ETHUSDT".to_string(),
                ..trades_request()
            },
            tx,
        )
        .await
        .unwrap();

    let (key, stopped) = h.broadcaster.unsubscribe(3, &trades_request()).unwrap();
    assert_eq!(key, trades_key());
    assert!(stopped);
    assert_eq!(
        h.registry.client_subscriptions(3),
        vec![SubscriptionKey::new("ETHUSDT", "spot", DataKind::Trades)]
    );

    let (_, stopped_again) = h.broadcaster.unsubscribe(3, &trades_request()).unwrap();
    assert!(!stopped_again);
}

#[tokio::test(start_paused = true)]
async fn invalid_data_type_spawns_nothing() {
    let h = setup(8);
    let (tx, mut rx) = mpsc::channel(16);
    let request = FeedRequest {
        data_type: "foo".to_string(),
        ..trades_request()
    };

    let err = h.broadcaster.subscribe(1, &request, tx).await.unwrap_err();
    assert!(matches!(err, SubscribeError::InvalidDataKind(_)));
    assert_eq!(err.to_string(), "Invalid data_type");

    assert!(rx.recv().await.is_none());
    assert_eq!(h.registry.active_count(), 0);
    assert_eq!(h.store.query_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn subscription_cap_is_enforced() {
    let h = setup(1);
    let (tx, _rx) = mpsc::channel(16);
    h.broadcaster.subscribe(1, &trades_request(), tx.clone()).await.unwrap();

    let err = h
        .broadcaster
        .subscribe(2, &trades_request(), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, SubscribeError::LimitReached(_)));
    assert_eq!(h.registry.active_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_subscribe_is_idempotent() {
    let h = setup(8);
    let (tx, mut rx) = mpsc::channel(16);
    h.broadcaster.subscribe(1, &trades_request(), tx.clone()).await.unwrap();
    let again = h.broadcaster.subscribe(1, &trades_request(), tx).await.unwrap();

    assert_eq!(again, SubscribeOutcome::AlreadyActive(trades_key()));
    assert_eq!(h.registry.active_count(), 1);

    let mut acks = 0;
    for _ in 0..4 {
        if matches!(next(&mut rx).await, ServerMessage::Subscribed { .. }) {
            acks += 1;
        }
    }
    assert_eq!(acks, 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_everything() {
    let h = setup(8);
    let (tx, _rx) = mpsc::channel(16);
    for client in 1..=3 {
        h.broadcaster
            .subscribe(client, &trades_request(), tx.clone())
            .await
            .unwrap();
    }

    assert_eq!(h.broadcaster.shutdown(), 3);
    assert_eq!(h.registry.active_count(), 0);
}
