//! Presence Service
//!
//! Derives online/offline/lastSeen from the connection registry and the cache,
//! debounces short disconnects and fans status changes out to authorized
//! subscribers.
//!
//! Observers may only see users they share a conversation with. Membership is
//! read through [`ConversationStore`] and cached per requester; a failed
//! lookup authorizes nobody.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::config::PresenceSettings;
use crate::domain::{
    shared_participants, ConversationMembership, ConversationStore, Envelope,
    PresenceOfflineEvent, PresenceOnlineEvent, PresenceSnapshotEvent, PresenceState,
    PresenceStatus, ServerEvent,
};
use crate::infrastructure::cache::{keys, TtlCache};
use crate::presentation::websocket::{Connection, ConnectionRegistry};

/// Presence targets one connection listens to.
struct Subscription {
    connection: Connection,
    targets: HashSet<String>,
}

pub struct PresenceService {
    cache: Arc<TtlCache>,
    registry: Arc<ConnectionRegistry>,
    conversations: Arc<dyn ConversationStore>,
    settings: PresenceSettings,
    /// connection_id -> subscription
    subscriptions: DashMap<String, Subscription>,
    /// user_id -> generation of the disconnect whose grace timer is pending
    disconnects: DashMap<String, u64>,
    generations: AtomicU64,
}

impl PresenceService {
    pub fn new(
        cache: Arc<TtlCache>,
        registry: Arc<ConnectionRegistry>,
        conversations: Arc<dyn ConversationStore>,
        settings: PresenceSettings,
    ) -> Self {
        Self {
            cache,
            registry,
            conversations,
            settings,
            subscriptions: DashMap::new(),
            disconnects: DashMap::new(),
            generations: AtomicU64::new(0),
        }
    }

    /// A connection of `user_id` was registered.
    ///
    /// Broadcasts `presence:online` only when the user was not already marked
    /// online, so a reconnect inside the grace period stays silent.
    pub fn handle_connect(&self, user_id: &str) {
        let online_key = keys::presence_online(user_id);
        let already_online = self.cache.contains(&online_key);
        self.cache.delete(&keys::presence_last_seen(user_id));
        self.touch(user_id);

        if already_online {
            tracing::debug!(user_id = %user_id, "Reconnected while marked online, no broadcast");
            return;
        }

        let online_since = Utc::now();
        self.cache
            .set_as(&online_key, &online_since, Some(self.settings.online_ttl()));
        tracing::info!(user_id = %user_id, "User online");

        self.broadcast_status(
            user_id,
            ServerEvent::PresenceOnline(PresenceOnlineEvent {
                user_id: user_id.to_string(),
                online_since,
            }),
        );
    }

    /// The last connection of `user_id` went away.
    ///
    /// After the grace period the user is marked offline unless they have
    /// reconnected or disconnected again meanwhile. The task resolves to
    /// whether the offline transition happened.
    pub fn handle_disconnect(self: &Arc<Self>, user_id: &str) -> JoinHandle<bool> {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        self.disconnects.insert(user_id.to_string(), generation);

        let service = Arc::clone(self);
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(service.settings.grace_period()).await;

            // A newer disconnect owns the entry and its own timer.
            if service
                .disconnects
                .remove_if(&user_id, |_, g| *g == generation)
                .is_none()
            {
                return false;
            }

            if service.registry.is_online(&user_id) {
                tracing::debug!(user_id = %user_id, "Reconnected within grace period");
                return false;
            }
            service.mark_offline(&user_id);
            true
        })
    }

    fn mark_offline(&self, user_id: &str) {
        self.cache.delete(&keys::presence_online(user_id));
        let last_seen = Utc::now();
        self.cache.set_as(
            &keys::presence_last_seen(user_id),
            &last_seen,
            Some(self.settings.last_seen_ttl()),
        );
        let last_active_at: Option<DateTime<Utc>> =
            self.cache.get_as(&keys::presence_last_active(user_id));

        tracing::info!(user_id = %user_id, "User offline");
        self.broadcast_status(
            user_id,
            ServerEvent::PresenceOffline(PresenceOfflineEvent {
                user_id: user_id.to_string(),
                last_seen,
                last_active_at,
            }),
        );
    }

    /// Note activity of `user_id` (any inbound frame).
    pub fn record_activity(&self, user_id: &str) {
        self.touch(user_id);
        if self.registry.is_online(user_id) {
            if let Some(online_since) = self
                .cache
                .get_as::<DateTime<Utc>>(&keys::presence_online(user_id))
            {
                self.cache.set_as(
                    &keys::presence_online(user_id),
                    &online_since,
                    Some(self.settings.online_ttl()),
                );
            }
        }
    }

    fn touch(&self, user_id: &str) {
        self.cache.set_as(
            &keys::presence_last_active(user_id),
            &Utc::now(),
            Some(self.settings.last_seen_ttl()),
        );
    }

    /// Current presence of `user_id`.
    pub fn status(&self, user_id: &str) -> PresenceStatus {
        let last_active_at = self.cache.get_as(&keys::presence_last_active(user_id));
        if self.registry.is_online(user_id) {
            PresenceStatus {
                user_id: user_id.to_string(),
                status: PresenceState::Online,
                online_since: self.cache.get_as(&keys::presence_online(user_id)),
                last_seen: None,
                last_active_at,
            }
        } else {
            PresenceStatus {
                user_id: user_id.to_string(),
                status: PresenceState::Offline,
                online_since: None,
                last_seen: self.cache.get_as(&keys::presence_last_seen(user_id)),
                last_active_at,
            }
        }
    }

    /// The subset of `targets` that `requester` may observe, in request order.
    pub async fn authorized_targets(&self, requester: &str, targets: &[String]) -> Vec<String> {
        let Some(allowed) = self.shared_participants(requester).await else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        targets
            .iter()
            .filter(|target| allowed.contains(target.as_str()))
            .filter(|target| seen.insert((*target).clone()))
            .cloned()
            .collect()
    }

    async fn shared_participants(&self, requester: &str) -> Option<HashSet<String>> {
        let key = keys::user_conversations(requester);
        if let Some(conversations) = self.cache.get_as::<Vec<ConversationMembership>>(&key) {
            return Some(shared_participants(requester, &conversations));
        }

        match self.conversations.find_by_participant(requester).await {
            Ok(conversations) => {
                self.cache
                    .set_as(&key, &conversations, Some(self.settings.authorization_ttl()));
                Some(shared_participants(requester, &conversations))
            }
            Err(e) => {
                tracing::warn!(
                    requester = %requester,
                    error = %e,
                    "Conversation lookup failed, presence authorization denied"
                );
                None
            }
        }
    }

    /// Subscribe `connection` to the authorized subset of `targets`.
    ///
    /// Sends a `presence:snapshot` of the accepted targets to the connection
    /// and returns it.
    pub async fn subscribe(&self, connection: &Connection, targets: &[String]) -> Vec<PresenceStatus> {
        let authorized = self.authorized_targets(connection.user_id(), targets).await;
        if authorized.len() < targets.len() {
            tracing::debug!(
                user_id = %connection.user_id(),
                requested = targets.len(),
                authorized = authorized.len(),
                "Presence subscription filtered"
            );
        }

        self.subscriptions
            .entry(connection.id().to_string())
            .or_insert_with(|| Subscription {
                connection: connection.clone(),
                targets: HashSet::new(),
            })
            .targets
            .extend(authorized.iter().cloned());

        let statuses: Vec<PresenceStatus> = authorized.iter().map(|u| self.status(u)).collect();
        connection.send(Envelope::new(ServerEvent::PresenceSnapshot(PresenceSnapshotEvent {
            statuses: statuses.clone(),
        })));
        statuses
    }

    pub fn unsubscribe(&self, connection_id: &str, targets: &[String]) {
        let now_empty = match self.subscriptions.get_mut(connection_id) {
            Some(mut subscription) => {
                for target in targets {
                    subscription.targets.remove(target);
                }
                subscription.targets.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.subscriptions
                .remove_if(connection_id, |_, s| s.targets.is_empty());
        }
    }

    /// Drop every subscription held by a closed connection.
    pub fn unsubscribe_connection(&self, connection_id: &str) {
        self.subscriptions.remove(connection_id);
    }

    /// Presence of the authorized subset of `targets`, without subscribing.
    pub async fn query(&self, requester: &str, targets: &[String]) -> Vec<PresenceStatus> {
        self.authorized_targets(requester, targets)
            .await
            .iter()
            .map(|u| self.status(u))
            .collect()
    }

    /// Forget cached membership of `user_id`.
    pub fn invalidate_authorization(&self, user_id: &str) -> bool {
        self.cache.delete(&keys::user_conversations(user_id))
    }

    /// Users whose grace period is still running
    pub fn pending_grace_periods(&self) -> usize {
        self.disconnects.len()
    }

    /// Number of connections subscribed to `user_id`
    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.subscriptions
            .iter()
            .filter(|s| s.targets.contains(user_id))
            .count()
    }

    fn broadcast_status(&self, user_id: &str, event: ServerEvent) {
        let subscribers: Vec<Connection> = self
            .subscriptions
            .iter()
            .filter(|s| s.targets.contains(user_id))
            .map(|s| s.connection.clone())
            .collect();
        if subscribers.is_empty() {
            return;
        }

        let envelope = Envelope::new(event);
        let delivered = subscribers
            .iter()
            .filter(|conn| conn.send(envelope.clone()))
            .count();
        tracing::debug!(
            user_id = %user_id,
            event_type = envelope.event_type(),
            delivered,
            "Presence change broadcast"
        );
    }
}
