//! Connection Registry
//!
//! Tracks the live push connections of every user and owns the offline
//! replay queue.
//!
//! A user is online exactly when their connection set is non-empty; the set is
//! removed together with its last connection. Payloads for users without a
//! connection land in `offline:<userId>` and are replayed, paced and oldest
//! first, to the next connection the user opens.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::connection::Connection;
use crate::config::DeliverySettings;
use crate::domain::{push_bounded, CachedReason, Envelope, QueuedEvent};
use crate::infrastructure::cache::{keys, TtlCache};
use crate::infrastructure::metrics;

/// Result of [`ConnectionRegistry::send_or_queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Pushed to at least one live connection
    Delivered,
    /// Stored in the offline queue
    Queued,
}

/// How a paced replay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Every queued payload was sent and the queue cleared
    Completed { sent: usize },
    /// The connection closed first; unsent payloads stay queued
    Interrupted { sent: usize, remaining: usize },
}

pub struct ConnectionRegistry {
    /// user_id -> live connections
    connections: DashMap<String, Vec<Connection>>,
    /// user_id -> conversation currently open
    active_conversations: DashMap<String, String>,
    /// user_id -> connection receiving the replay in progress
    replays: DashMap<String, Connection>,
    cache: Arc<TtlCache>,
    settings: DeliverySettings,
}

impl ConnectionRegistry {
    pub fn new(cache: Arc<TtlCache>, settings: DeliverySettings) -> Self {
        Self {
            connections: DashMap::new(),
            active_conversations: DashMap::new(),
            replays: DashMap::new(),
            cache,
            settings,
        }
    }

    /// Register a connection. Returns `true` if it is the user's first.
    ///
    /// Starts a paced replay of the user's offline queue onto the new
    /// connection when one is pending.
    pub fn add_connection(self: &Arc<Self>, connection: Connection) -> bool {
        let user_id = connection.user_id().to_string();
        let first = {
            let mut conns = self.connections.entry(user_id.clone()).or_default();
            let first = conns.is_empty();
            conns.push(connection.clone());
            first
        };
        metrics::set_active_connections(self.connection_count());

        tracing::info!(
            user_id = %user_id,
            connection_id = %connection.id(),
            first_connection = first,
            "Connection registered"
        );

        if self.cache.contains(&keys::offline(&user_id)) {
            self.replay_offline_queue(connection);
        }

        first
    }

    /// Remove a connection. Returns `true` if it was the user's last one.
    ///
    /// Dropping the last connection also forgets the user's active conversation.
    pub fn remove_connection(&self, user_id: &str, connection_id: &str) -> bool {
        let (removed, now_empty) = match self.connections.get_mut(user_id) {
            Some(mut conns) => {
                let before = conns.len();
                conns.retain(|c| c.id() != connection_id);
                (conns.len() < before, conns.is_empty())
            }
            None => (false, false),
        };

        if now_empty {
            self.connections.remove_if(user_id, |_, conns| conns.is_empty());
            self.active_conversations.remove(user_id);
        }
        metrics::set_active_connections(self.connection_count());

        if removed {
            tracing::info!(
                user_id = %user_id,
                connection_id = %connection_id,
                last_connection = now_empty,
                "Connection unregistered"
            );
        }

        removed && now_empty
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.connections
            .get(user_id)
            .map(|conns| !conns.is_empty())
            .unwrap_or(false)
    }

    pub fn get_connections(&self, user_id: &str) -> Vec<Connection> {
        self.connections
            .get(user_id)
            .map(|conns| conns.clone())
            .unwrap_or_default()
    }

    /// Total live connections across all users
    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|entry| entry.len()).sum()
    }

    pub fn online_users(&self) -> Vec<String> {
        self.connections.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn set_active_conversation(&self, user_id: &str, conversation_id: &str) {
        self.active_conversations
            .insert(user_id.to_string(), conversation_id.to_string());
    }

    pub fn clear_active_conversation(&self, user_id: &str) {
        self.active_conversations.remove(user_id);
    }

    pub fn active_conversation(&self, user_id: &str) -> Option<String> {
        self.active_conversations.get(user_id).map(|c| c.clone())
    }

    /// Push to every live connection of `user_id`. Returns how many accepted it.
    pub fn send_to_user(&self, user_id: &str, envelope: &Envelope) -> usize {
        self.get_connections(user_id)
            .iter()
            .filter(|conn| conn.send(envelope.clone()))
            .count()
    }

    /// Push to every connected user except `exclude`.
    pub fn broadcast(&self, envelope: &Envelope, exclude: Option<&str>) -> usize {
        let targets: Vec<String> = self
            .online_users()
            .into_iter()
            .filter(|user_id| Some(user_id.as_str()) != exclude)
            .collect();

        targets
            .iter()
            .map(|user_id| self.send_to_user(user_id, envelope))
            .sum()
    }

    /// Push to users whose active conversation is `conversation_id`.
    pub fn broadcast_to_conversation(
        &self,
        conversation_id: &str,
        envelope: &Envelope,
        exclude: Option<&str>,
    ) -> usize {
        let targets: Vec<String> = self
            .active_conversations
            .iter()
            .filter(|entry| entry.value() == conversation_id)
            .map(|entry| entry.key().clone())
            .filter(|user_id| Some(user_id.as_str()) != exclude)
            .collect();

        targets
            .iter()
            .map(|user_id| self.send_to_user(user_id, envelope))
            .sum()
    }

    /// Append to `offline:<userId>`. Returns the queue length afterwards.
    pub fn queue_offline(&self, user_id: &str, envelope: Envelope, reason: CachedReason) -> usize {
        let event_type = envelope.event_type();
        let max_len = self.settings.max_offline_messages;
        let len = self
            .cache
            .update_as(
                &keys::offline(user_id),
                Some(self.settings.offline_queue_ttl()),
                |queue: &mut Vec<QueuedEvent>| {
                    push_bounded(queue, QueuedEvent::new(envelope, reason), max_len);
                    queue.len()
                },
            )
            .unwrap_or(0);

        tracing::debug!(
            user_id = %user_id,
            event_type = event_type,
            queue_len = len,
            "Payload queued for offline replay"
        );
        len
    }

    /// Push live when possible, otherwise queue for replay.
    pub fn send_or_queue(&self, user_id: &str, envelope: Envelope, reason: CachedReason) -> DeliveryOutcome {
        if self.send_to_user(user_id, &envelope) > 0 {
            DeliveryOutcome::Delivered
        } else {
            self.queue_offline(user_id, envelope, reason);
            DeliveryOutcome::Queued
        }
    }

    pub fn offline_queue(&self, user_id: &str) -> Vec<QueuedEvent> {
        self.cache
            .get_as(&keys::offline(user_id))
            .unwrap_or_default()
    }

    pub fn clear_offline_queue(&self, user_id: &str) -> bool {
        self.cache.delete(&keys::offline(user_id))
    }

    /// Whether the payload `event_id` is still waiting in the offline queue.
    pub fn is_queued(&self, user_id: &str, event_id: &str) -> bool {
        self.offline_queue(user_id).iter().any(|e| e.id() == event_id)
    }

    /// Drop payloads from the offline queue. Returns how many were removed.
    pub fn remove_queued(&self, user_id: &str, event_ids: &[&str]) -> usize {
        let key = keys::offline(user_id);
        if !self.cache.contains(&key) {
            return 0;
        }
        let (removed, remaining) = self
            .cache
            .update_as(
                &key,
                Some(self.settings.offline_queue_ttl()),
                |queue: &mut Vec<QueuedEvent>| {
                    let before = queue.len();
                    queue.retain(|e| !event_ids.contains(&e.id()));
                    (before - queue.len(), queue.len())
                },
            )
            .unwrap_or((0, 0));
        if remaining == 0 {
            self.cache.delete(&key);
        }
        removed
    }

    /// A live connection of `user_id` is receiving a replay right now.
    pub fn replay_in_progress(&self, user_id: &str) -> bool {
        self.replays
            .get(user_id)
            .map(|running| running.is_live())
            .unwrap_or(false)
    }

    /// Start a paced replay of the offline queue onto `connection`.
    ///
    /// Returns `None` when another live connection of the user is already
    /// receiving a replay.
    pub fn replay_offline_queue(self: &Arc<Self>, connection: Connection) -> Option<JoinHandle<ReplayOutcome>> {
        let user_id = connection.user_id().to_string();
        match self.replays.entry(user_id.clone()) {
            Entry::Occupied(mut running) => {
                if running.get().is_live() {
                    tracing::debug!(user_id = %user_id, "Offline replay already in progress");
                    return None;
                }
                running.insert(connection.clone());
            }
            Entry::Vacant(slot) => {
                slot.insert(connection.clone());
            }
        }

        let registry = Arc::clone(self);
        Some(tokio::spawn(async move {
            let outcome = registry.run_replay(&connection).await;
            registry
                .replays
                .remove_if(&user_id, |_, running| running.id() == connection.id());
            outcome
        }))
    }

    async fn run_replay(&self, connection: &Connection) -> ReplayOutcome {
        let user_id = connection.user_id();
        let mut queue = self.offline_queue(user_id);
        queue.sort_by_key(QueuedEvent::timestamp);
        let total = queue.len();

        let mut ticker = interval(self.settings.replay_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut replayed = HashSet::with_capacity(total);
        for event in queue {
            ticker.tick().await;
            let event_id = event.id().to_string();
            if !connection.send(event.payload) {
                let outcome = ReplayOutcome::Interrupted {
                    sent: replayed.len(),
                    remaining: total - replayed.len(),
                };
                tracing::info!(
                    user_id = %user_id,
                    connection_id = %connection.id(),
                    ?outcome,
                    "Offline replay stopped, connection closed"
                );
                metrics::record_replay("interrupted");
                return outcome;
            }
            replayed.insert(event_id);
        }

        // Payloads queued while replaying stay for the next replay.
        let key = keys::offline(user_id);
        let remaining = self
            .cache
            .update_as(
                &key,
                Some(self.settings.offline_queue_ttl()),
                |queue: &mut Vec<QueuedEvent>| {
                    queue.retain(|e| !replayed.contains(e.id()));
                    queue.len()
                },
            )
            .unwrap_or(0);
        if remaining == 0 {
            self.cache.delete(&key);
        }

        tracing::info!(
            user_id = %user_id,
            connection_id = %connection.id(),
            sent = total,
            "Offline replay completed"
        );
        metrics::record_replay("completed");
        ReplayOutcome::Completed { sent: total }
    }
}
