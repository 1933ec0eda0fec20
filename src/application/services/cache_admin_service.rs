//! Cache Admin Service
//!
//! Operator-level inspection and invalidation of the shared cache.

use std::sync::Arc;

use serde::Serialize;

use super::route_deferral_service::RouteDeferralService;
use crate::infrastructure::cache::{keys, CacheStats, TtlCache};

/// What a conversation invalidation removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationReport {
    pub conversation_entries: usize,
    pub authorization_entries: usize,
    pub deferred_events: usize,
}

pub struct CacheAdminService {
    cache: Arc<TtlCache>,
    deferral: Arc<RouteDeferralService>,
}

impl CacheAdminService {
    pub fn new(cache: Arc<TtlCache>, deferral: Arc<RouteDeferralService>) -> Self {
        Self { cache, deferral }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cache entry. Returns how many were removed.
    pub fn clear_all(&self) -> usize {
        let removed = self.cache.clear();
        tracing::warn!(removed, "Cache cleared by operator");
        removed
    }

    /// Drop every user-scoped entry of `user_id`.
    pub fn clear_user(&self, user_id: &str) -> usize {
        let removed = self
            .cache
            .delete_where(|key| keys::belongs_to_user(key, user_id));
        tracing::info!(user_id = %user_id, removed, "User cache cleared");
        removed
    }

    /// Forget conversation state and everything derived from its membership.
    ///
    /// `participants` lose their cached presence authorization and any
    /// deferred events of the conversation.
    pub fn invalidate_conversation(&self, conversation_id: &str, participants: &[String]) -> InvalidationReport {
        let mut report = InvalidationReport {
            conversation_entries: self
                .cache
                .delete_where(|key| keys::belongs_to_conversation(key, conversation_id)),
            ..InvalidationReport::default()
        };

        for participant in participants {
            if self.cache.delete(&keys::user_conversations(participant)) {
                report.authorization_entries += 1;
            }
            report.deferred_events += self.deferral.discard_conversation(participant, conversation_id);
        }

        tracing::info!(
            conversation_id = %conversation_id,
            participants = participants.len(),
            ?report,
            "Conversation cache invalidated"
        );
        report
    }
}
