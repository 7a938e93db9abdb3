//! Subscription Registry
//!
//! Tracks live-feed subscriptions per client so that a disconnect can stop
//! every feed loop owned by that client instead of waiting for the next
//! failed push.
//!
//! # Design
//!
//! Each subscription is identified by `(client, symbol, market_type, kind)`
//! and owns a `CancellationToken`. The registry:
//! - Caps the number of concurrently active subscriptions
//! - Treats a repeated subscribe for the same key as a no-op
//! - Cancels and forgets all of a client's subscriptions on disconnect
//!
//! Lifecycle of one subscription: `Active → Cancelled`. There is no way back;
//! a fresh subscribe after cancellation creates a new entry with a new id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::records::DataKind;

// =============================================================================
// Types
// =============================================================================

/// Identifier of a connected feed client (one per WebSocket connection).
pub type ClientId = u64;

/// What a subscription streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionKey {
    /// Instrument symbol.
    pub symbol: String,
    /// Venue category.
    pub market_type: String,
    /// Record kind.
    #[serde(rename = "data_type")]
    pub kind: DataKind,
}

impl SubscriptionKey {
    /// Create a subscription key.
    #[must_use]
    pub fn new(symbol: impl Into<String>, market_type: impl Into<String>, kind: DataKind) -> Self {
        Self {
            symbol: symbol.into(),
            market_type: market_type.into(),
            kind,
        }
    }
}

/// Subscription lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Feed loop is running.
    Active,
    /// Terminal: the loop has stopped or is stopping.
    Cancelled,
}

/// Handle given to the feed loop that owns a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionTicket {
    /// Unique id of this registration.
    pub id: u64,
    /// Owning client.
    pub client: ClientId,
    /// Subscribed stream.
    pub key: SubscriptionKey,
    /// Fires when the subscription is cancelled.
    pub token: CancellationToken,
}

impl SubscriptionTicket {
    /// Current state as seen by the loop.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        if self.token.is_cancelled() {
            SubscriptionState::Cancelled
        } else {
            SubscriptionState::Active
        }
    }
}

/// Outcome of a registration attempt.
#[derive(Debug)]
pub enum Registration {
    /// A new subscription was created; the caller must start its loop.
    Created(SubscriptionTicket),
    /// The client already has an active subscription for this key.
    AlreadyActive,
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The concurrent subscription cap has been reached.
    #[error("subscription limit reached ({limit} active)")]
    LimitReached {
        /// Configured cap.
        limit: usize,
    },
}

#[derive(Debug)]
struct Entry {
    id: u64,
    token: CancellationToken,
}

// =============================================================================
// Registry
// =============================================================================

/// Thread-safe registry of live subscriptions keyed by client.
///
/// # Example
///
/// ```rust
/// use market_data_api::domain::records::DataKind;
/// use market_data_api::domain::subscription::{
///     Registration, SubscriptionKey, SubscriptionRegistry,
/// };
///
/// let registry = SubscriptionRegistry::new(16);
/// let key = SubscriptionKey::new("BTCUSDT", "spot", DataKind::Trades);
///
/// let Registration::Created(ticket) = registry.register(1, key.clone()).unwrap() else {
///     unreachable!()
/// };
/// assert!(matches!(
///     registry.register(1, key).unwrap(),
///     Registration::AlreadyActive
/// ));
///
/// assert_eq!(registry.cancel_client(1), 1);
/// assert!(ticket.token.is_cancelled());
/// ```
#[derive(Debug)]
pub struct SubscriptionRegistry {
    limit: usize,
    next_id: AtomicU64,
    clients: RwLock<HashMap<ClientId, HashMap<SubscriptionKey, Entry>>>,
}

impl SubscriptionRegistry {
    /// Create a registry allowing at most `limit` concurrent subscriptions.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            next_id: AtomicU64::new(1),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Configured subscription cap.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Register a subscription for `client`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::LimitReached` if the cap is already in use.
    pub fn register(
        &self,
        client: ClientId,
        key: SubscriptionKey,
    ) -> Result<Registration, RegistryError> {
        let mut clients = self.clients.write();

        if clients
            .get(&client)
            .is_some_and(|subs| subs.contains_key(&key))
        {
            return Ok(Registration::AlreadyActive);
        }

        let active: usize = clients.values().map(HashMap::len).sum();
        if active >= self.limit {
            return Err(RegistryError::LimitReached { limit: self.limit });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        clients.entry(client).or_default().insert(
            key.clone(),
            Entry {
                id,
                token: token.clone(),
            },
        );

        Ok(Registration::Created(SubscriptionTicket {
            id,
            client,
            key,
            token,
        }))
    }

    /// Cancel one subscription. Returns whether it existed.
    pub fn cancel(&self, client: ClientId, key: &SubscriptionKey) -> bool {
        let mut clients = self.clients.write();
        let Some(subs) = clients.get_mut(&client) else {
            return false;
        };
        let removed = subs.remove(key);
        if subs.is_empty() {
            clients.remove(&client);
        }
        removed.is_some_and(|entry| {
            entry.token.cancel();
            true
        })
    }

    /// Cancel every subscription owned by `client`. Returns how many.
    pub fn cancel_client(&self, client: ClientId) -> usize {
        let removed = self.clients.write().remove(&client);
        removed.map_or(0, |subs| {
            for entry in subs.values() {
                entry.token.cancel();
            }
            subs.len()
        })
    }

    /// Cancel everything (shutdown).
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.clients.write().drain().collect();
        drained
            .iter()
            .flat_map(|(_, subs)| subs.values())
            .map(|entry| entry.token.cancel())
            .count()
    }

    /// Forget a subscription whose loop has exited.
    ///
    /// Only removes the entry if it still belongs to `ticket`, so a loop that
    /// exits late never removes a newer registration for the same key.
    pub fn release(&self, ticket: &SubscriptionTicket) {
        ticket.token.cancel();
        let mut clients = self.clients.write();
        if let Some(subs) = clients.get_mut(&ticket.client) {
            if subs.get(&ticket.key).is_some_and(|e| e.id == ticket.id) {
                subs.remove(&ticket.key);
            }
            if subs.is_empty() {
                clients.remove(&ticket.client);
            }
        }
    }

    /// Keys a client is subscribed to.
    #[must_use]
    pub fn client_subscriptions(&self, client: ClientId) -> Vec<SubscriptionKey> {
        self.clients
            .read()
            .get(&client)
            .map(|subs| subs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of active subscriptions across all clients.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.clients.read().values().map(HashMap::len).sum()
    }

    /// Snapshot statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let clients = self.clients.read();
        RegistryStats {
            active_subscriptions: clients.values().map(HashMap::len).sum(),
            clients: clients.len(),
            limit: self.limit,
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Active subscriptions.
    pub active_subscriptions: usize,
    /// Clients with at least one subscription.
    pub clients: usize,
    /// Configured cap.
    pub limit: usize,
}

// =============================================================================
// Tests
// =============================================================================
