//! Live Feed Broadcaster
//!
//! Runs one recurring task per subscription. Each task re-runs the latest-N
//! query and pushes the shaped records to its client's outbound channel
//! until the subscription is cancelled.
//!
//! # Architecture
//!
//! ```text
//! subscribe ──► SubscriptionRegistry ──► spawn feed task
//!                                           │
//!                 ┌─────────────────────────┘
//!                 ▼
//!        loop { tick(interval) ─► latest query ─► push }
//!                 │                                │
//!                 └── cancelled ◄──────── closed ──┘
//! ```
//!
//! A task stops when its token is cancelled (client disconnect through the
//! registry) or when a push finds the client channel closed. A failed query
//! is logged and counted; the loop waits for the next tick as usual.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::application::services::{LatestRequest, QueryService};
use crate::domain::records::{DataKind, InvalidDataKind, ShapedRecord};
use crate::domain::subscription::{
    ClientId, Registration, RegistryError, SubscriptionKey, SubscriptionRegistry,
    SubscriptionState, SubscriptionTicket,
};
use crate::infrastructure::config::{BroadcastSettings, MIN_BROADCAST_INTERVAL};
use crate::infrastructure::metrics::{self, Endpoint, Outcome};

// =============================================================================
// Feed Messages
// =============================================================================

/// Messages a feed client sends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Start a live feed.
    Subscribe(FeedRequest),
    /// Stop a live feed.
    Unsubscribe(FeedRequest),
}

/// Raw feed selector as sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FeedRequest {
    /// Instrument symbol.
    #[serde(default)]
    pub symbol: String,
    /// Venue category.
    #[serde(default)]
    pub market_type: String,
    /// `orderbook` or `trades`.
    #[serde(default)]
    pub data_type: String,
}

impl FeedRequest {
    /// Validate into a subscription key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDataKind` for an unrecognized `data_type`.
    pub fn to_key(&self) -> Result<SubscriptionKey, InvalidDataKind> {
        let kind: DataKind = self.data_type.parse()?;
        Ok(SubscriptionKey::new(
            self.symbol.clone(),
            self.market_type.clone(),
            kind,
        ))
    }
}

/// Messages pushed to a feed client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Subscription accepted (also sent for a repeated subscribe).
    Subscribed {
        /// Subscribed stream.
        #[serde(flatten)]
        key: SubscriptionKey,
    },
    /// Subscription stopped.
    Unsubscribed {
        /// Stopped stream.
        #[serde(flatten)]
        key: SubscriptionKey,
    },
    /// One periodic push.
    Data {
        /// Stream this push belongs to.
        #[serde(flatten)]
        key: SubscriptionKey,
        /// Shaped records, newest first.
        data: Vec<ShapedRecord>,
    },
    /// A rejected request.
    Error {
        /// Human-readable reason.
        error: String,
    },
}

impl ServerMessage {
    /// Build an error message.
    #[must_use]
    pub fn error(message: impl ToString) -> Self {
        Self::Error {
            error: message.to_string(),
        }
    }
}

/// Subscribe failures reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    /// Unknown `data_type`.
    #[error(transparent)]
    InvalidDataKind(#[from] InvalidDataKind),

    /// Too many concurrent subscriptions.
    #[error(transparent)]
    LimitReached(#[from] RegistryError),

    /// The client's outbound channel is gone.
    #[error("client channel closed")]
    ChannelClosed,
}

/// Successful subscribe outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// A new feed task was started.
    Started(SubscriptionKey),
    /// The feed was already running for this client.
    AlreadyActive(SubscriptionKey),
}

impl SubscribeOutcome {
    /// Key of the subscription.
    #[must_use]
    pub const fn key(&self) -> &SubscriptionKey {
        match self {
            Self::Started(key) | Self::AlreadyActive(key) => key,
        }
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Per-feed loop parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedConfig {
    /// Push period. Raised to `MIN_BROADCAST_INTERVAL` when shorter.
    pub interval: Duration,
    /// Records per push.
    pub depth: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::from(&BroadcastSettings::default())
    }
}

impl From<&BroadcastSettings> for FeedConfig {
    fn from(settings: &BroadcastSettings) -> Self {
        Self {
            interval: settings.interval,
            depth: settings.depth,
        }
    }
}

/// Starts and stops live feed tasks.
#[derive(Debug, Clone)]
pub struct SubscriptionBroadcaster {
    queries: QueryService,
    registry: Arc<SubscriptionRegistry>,
    config: FeedConfig,
}

/// Shared broadcaster handle.
pub type SharedBroadcaster = Arc<SubscriptionBroadcaster>;

impl SubscriptionBroadcaster {
    /// Create a broadcaster.
    #[must_use]
    pub const fn new(
        queries: QueryService,
        registry: Arc<SubscriptionRegistry>,
        config: FeedConfig,
    ) -> Self {
        Self {
            queries,
            registry,
            config,
        }
    }

    /// Subscription registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Start a feed for `client`, pushing to `sink`.
    ///
    /// The `subscribed` acknowledgement is queued on `sink` before the first
    /// data push. A repeated subscribe for the same stream is acknowledged
    /// again but leaves the running task alone.
    ///
    /// # Errors
    ///
    /// `SubscribeError` for an unknown `data_type`, when the subscription
    /// cap is reached, or when `sink` is already closed. No task is spawned
    /// in any of these cases.
    pub async fn subscribe(
        &self,
        client: ClientId,
        request: &FeedRequest,
        sink: mpsc::Sender<ServerMessage>,
    ) -> Result<SubscribeOutcome, SubscribeError> {
        let key = request.to_key()?;
        let registration = self.registry.register(client, key.clone())?;
        let ack = ServerMessage::Subscribed { key: key.clone() };

        match registration {
            Registration::AlreadyActive => {
                tracing::debug!(
                    client,
                    symbol = %key.symbol,
                    market_type = %key.market_type,
                    data_type = %key.kind,
                    "Subscription already active"
                );
                let _ = sink.send(ack).await;
                Ok(SubscribeOutcome::AlreadyActive(key))
            }
            Registration::Created(ticket) => {
                if sink.send(ack).await.is_err() {
                    self.registry.release(&ticket);
                    return Err(SubscribeError::ChannelClosed);
                }

                tracing::info!(
                    client,
                    subscription_id = ticket.id,
                    symbol = %key.symbol,
                    market_type = %key.market_type,
                    data_type = %key.kind,
                    "Subscription started"
                );
                metrics::set_active_subscriptions(self.registry.active_count());

                tokio::spawn(run_feed(
                    ticket,
                    self.queries.clone(),
                    Arc::clone(&self.registry),
                    self.config,
                    sink,
                ));
                Ok(SubscribeOutcome::Started(key))
            }
        }
    }

    /// Stop one feed. Returns whether it was running.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDataKind` for an unrecognized `data_type`.
    pub fn unsubscribe(
        &self,
        client: ClientId,
        request: &FeedRequest,
    ) -> Result<(SubscriptionKey, bool), InvalidDataKind> {
        let key = request.to_key()?;
        let stopped = self.registry.cancel(client, &key);
        metrics::set_active_subscriptions(self.registry.active_count());
        Ok((key, stopped))
    }

    /// Stop every feed owned by `client`. Returns how many were stopped.
    pub fn disconnect(&self, client: ClientId) -> usize {
        let stopped = self.registry.cancel_client(client);
        if stopped > 0 {
            tracing::info!(client, stopped, "Client disconnected, subscriptions cancelled");
        }
        metrics::set_active_subscriptions(self.registry.active_count());
        stopped
    }

    /// Stop every feed (shutdown).
    pub fn shutdown(&self) -> usize {
        let stopped = self.registry.cancel_all();
        metrics::set_active_subscriptions(0);
        stopped
    }
}

async fn run_feed(
    ticket: SubscriptionTicket,
    queries: QueryService,
    registry: Arc<SubscriptionRegistry>,
    config: FeedConfig,
    sink: mpsc::Sender<ServerMessage>,
) {
    let key = ticket.key.clone();
    let request = LatestRequest::new(key.kind, key.symbol.clone(), key.market_type.clone())
        .with_depth(config.depth);
    let token = ticket.token.clone();

    // Fixed period: the first tick fires immediately, a slow query delays
    // the following ticks instead of bunching them.
    let mut ticker = tokio::time::interval(config.interval.max(MIN_BROADCAST_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            () = token.cancelled() => break,
            result = queries.latest(&request) => result,
        };
        metrics::record_query(
            Endpoint::Feed,
            Some(key.kind),
            if result.is_ok() { Outcome::Ok } else { Outcome::Failed },
        );
        metrics::record_query_duration(Endpoint::Feed, started.elapsed());

        match result {
            Ok(data) => {
                let message = ServerMessage::Data {
                    key: key.clone(),
                    data,
                };
                let delivered = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    sent = sink.send(message) => sent.is_ok(),
                };
                if !delivered {
                    tracing::debug!(
                        client = ticket.client,
                        subscription_id = ticket.id,
                        "Client channel closed"
                    );
                    break;
                }
                metrics::record_push(key.kind);
            }
            Err(e) => {
                tracing::warn!(
                    client = ticket.client,
                    subscription_id = ticket.id,
                    symbol = %key.symbol,
                    data_type = %key.kind,
                    error = %e,
                    "Feed iteration failed"
                );
                metrics::record_iteration_failure(key.kind);
            }
        }
    }

    let reason = match ticket.state() {
        SubscriptionState::Cancelled => "cancelled",
        SubscriptionState::Active => "client gone",
    };
    registry.release(&ticket);
    metrics::set_active_subscriptions(registry.active_count());
    tracing::info!(
        client = ticket.client,
        subscription_id = ticket.id,
        symbol = %key.symbol,
        data_type = %key.kind,
        reason,
        "Subscription stopped"
    );
}

// =============================================================================
// Tests
// =============================================================================
