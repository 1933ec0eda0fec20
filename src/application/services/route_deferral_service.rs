//! Route Deferral Service
//!
//! Holds conversation events back for online users who are not looking at a
//! conversation view, and flushes them once the user navigates back.
//!
//! Every conversation event takes exactly one path:
//!
//! ```text
//! offline                 -> offline queue  (replayed on reconnect)
//! online, in context      -> pushed live
//! online, out of context  -> conversation_updates:<userId>  (flushed on route change)
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::RouteSettings;
use crate::domain::{
    push_bounded, CachedReason, ConversationEvent, QueuedEvent, RouteClassifier, RouteStatus,
    RouteStatusView,
};
use crate::infrastructure::cache::{keys, TtlCache};
use crate::infrastructure::metrics;
use crate::presentation::websocket::ConnectionRegistry;

/// Result of [`RouteDeferralService::defer_or_deliver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferralDecision {
    /// The user sees conversation events live; the caller delivers.
    NoActionNeeded,
    /// Stored in the user's deferred queue under this event id.
    Queued { event_id: String },
}

/// Path taken by [`RouteDeferralService::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    QueuedOffline,
    Deferred,
}

/// Record of a flushed event awaiting client acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryConfirmation {
    pub event_id: String,
    pub user_id: String,
    pub event_type: String,
    pub delivered_at: DateTime<Utc>,
}

pub struct RouteDeferralService {
    cache: Arc<TtlCache>,
    registry: Arc<ConnectionRegistry>,
    classifier: RouteClassifier,
    settings: RouteSettings,
    /// user_id -> last reported route
    routes: DashMap<String, RouteStatus>,
}

impl RouteDeferralService {
    pub fn new(cache: Arc<TtlCache>, registry: Arc<ConnectionRegistry>, settings: RouteSettings) -> Self {
        Self {
            cache,
            registry,
            classifier: RouteClassifier::new(settings.relevant_prefixes.iter().cloned()),
            settings,
            routes: DashMap::new(),
        }
    }

    /// Record the route `user_id` is showing.
    ///
    /// Entering a relevant route flushes the deferred queue to the user's
    /// connections; the events that reached one are returned. Events no live
    /// connection accepted move to the offline queue.
    pub fn set_route(&self, user_id: &str, route: &str) -> Vec<QueuedEvent> {
        let in_context = self.classifier.is_relevant(route);
        self.routes
            .insert(user_id.to_string(), RouteStatus::new(route, in_context));
        tracing::debug!(user_id = %user_id, route = %route, in_context, "Route updated");

        if !in_context || !self.registry.is_online(user_id) {
            return Vec::new();
        }

        let (flushed, undelivered): (Vec<_>, Vec<_>) = self
            .flush(user_id)
            .into_iter()
            .partition(|event| self.registry.send_to_user(user_id, &event.payload) > 0);

        for event in &undelivered {
            self.cache.delete(&keys::delivery_confirmation(event.id()));
            self.registry
                .queue_offline(user_id, event.payload.clone(), CachedReason::UserOffline);
        }
        if !undelivered.is_empty() {
            tracing::warn!(
                user_id = %user_id,
                count = undelivered.len(),
                "Flush found no live connection, events queued offline"
            );
        }
        if !flushed.is_empty() {
            tracing::info!(
                user_id = %user_id,
                count = flushed.len(),
                "Deferred conversation events flushed"
            );
        }
        flushed
    }

    /// Forget the route of a user who went away.
    pub fn clear_route(&self, user_id: &str) {
        self.routes.remove(user_id);
    }

    /// In a relevant route reported within the freshness window.
    pub fn is_in_context(&self, user_id: &str) -> bool {
        self.routes
            .get(user_id)
            .map(|status| status.is_in_context(self.settings.freshness_window()))
            .unwrap_or(false)
    }

    pub fn route_status(&self, user_id: &str) -> Option<RouteStatusView> {
        self.routes
            .get(user_id)
            .map(|status| status.snapshot(self.settings.freshness_window()))
    }

    /// Queue `event` for `user_id` unless they currently see conversations.
    pub fn defer_or_deliver(&self, user_id: &str, event: &ConversationEvent) -> DeferralDecision {
        if self.is_in_context(user_id) {
            return DeferralDecision::NoActionNeeded;
        }

        let queued = QueuedEvent::new(event.clone().into_envelope(), CachedReason::OutOfContext);
        let event_id = queued.id().to_string();
        let event_type = queued.event_type();
        let max_len = self.settings.max_deferred_events;
        self.cache.update_as(
            &keys::conversation_updates(user_id),
            Some(self.settings.deferred_ttl()),
            |queue: &mut Vec<QueuedEvent>| push_bounded(queue, queued, max_len),
        );
        metrics::record_deferred_event(event_type);

        tracing::debug!(
            user_id = %user_id,
            event_id = %event_id,
            event_type = event_type,
            conversation_id = %event.conversation_id(),
            "Conversation event deferred"
        );
        DeferralDecision::Queued { event_id }
    }

    /// Route a conversation event to exactly one delivery path.
    pub fn dispatch(&self, user_id: &str, event: ConversationEvent) -> DispatchOutcome {
        if !self.registry.is_online(user_id) {
            self.registry
                .queue_offline(user_id, event.into_envelope(), CachedReason::UserOffline);
            return DispatchOutcome::QueuedOffline;
        }

        match self.defer_or_deliver(user_id, &event) {
            DeferralDecision::Queued { .. } => DispatchOutcome::Deferred,
            DeferralDecision::NoActionNeeded => {
                let envelope = event.into_envelope();
                if self.registry.send_to_user(user_id, &envelope) > 0 {
                    DispatchOutcome::Delivered
                } else {
                    self.registry
                        .queue_offline(user_id, envelope, CachedReason::UserOffline);
                    DispatchOutcome::QueuedOffline
                }
            }
        }
    }

    /// Take every deferred event of `user_id`, marked delivered.
    ///
    /// A delivery confirmation is kept per event until acknowledged or expired.
    pub fn flush(&self, user_id: &str) -> Vec<QueuedEvent> {
        let key = keys::conversation_updates(user_id);
        let mut events: Vec<QueuedEvent> = self.cache.get_as(&key).unwrap_or_default();
        self.cache.delete(&key);

        let delivered_at = Utc::now();
        for event in &mut events {
            event.delivered = true;
            let confirmation = DeliveryConfirmation {
                event_id: event.id().to_string(),
                user_id: user_id.to_string(),
                event_type: event.event_type().to_string(),
                delivered_at,
            };
            self.cache.set_as(
                &keys::delivery_confirmation(event.id()),
                &confirmation,
                Some(self.settings.confirmation_ttl()),
            );
        }
        events
    }

    /// Deferred events not yet flushed
    pub fn pending(&self, user_id: &str) -> Vec<QueuedEvent> {
        self.cache
            .get_as(&keys::conversation_updates(user_id))
            .unwrap_or_default()
    }

    /// Client acknowledged a flushed event. Only the recipient may acknowledge.
    pub fn acknowledge(&self, user_id: &str, event_id: &str) -> bool {
        let key = keys::delivery_confirmation(event_id);
        match self.cache.get_as::<DeliveryConfirmation>(&key) {
            Some(confirmation) if confirmation.user_id == user_id => self.cache.delete(&key),
            _ => false,
        }
    }

    pub fn confirmation(&self, event_id: &str) -> Option<DeliveryConfirmation> {
        self.cache.get_as(&keys::delivery_confirmation(event_id))
    }

    /// Drop deferred events of `conversation_id` from `user_id`'s queue.
    pub fn discard_conversation(&self, user_id: &str, conversation_id: &str) -> usize {
        let key = keys::conversation_updates(user_id);
        if !self.cache.contains(&key) {
            return 0;
        }
        self.cache
            .update_as(
                &key,
                Some(self.settings.deferred_ttl()),
                |queue: &mut Vec<QueuedEvent>| {
                    let before = queue.len();
                    queue.retain(|e| e.payload.event.conversation_id() != Some(conversation_id));
                    before - queue.len()
                },
            )
            .unwrap_or(0)
    }
}
