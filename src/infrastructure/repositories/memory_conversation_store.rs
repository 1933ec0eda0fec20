//! In-memory ConversationStore.
//!
//! Used by tests and local development without a database. Can be switched
//! to an unavailable state to exercise fail-closed authorization.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::{ConversationMembership, ConversationStore};
use crate::shared::error::AppError;

#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<Vec<ConversationMembership>>,
    unavailable: AtomicBool,
    lookups: AtomicUsize,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversations(conversations: Vec<ConversationMembership>) -> Self {
        Self {
            conversations: RwLock::new(conversations),
            ..Self::default()
        }
    }

    pub fn add(&self, conversation: ConversationMembership) {
        self.conversations.write().push(conversation);
    }

    /// Make every lookup fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `find_by_participant` calls served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn find_by_participant(&self, user_id: &str) -> Result<Vec<ConversationMembership>, AppError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Internal("conversation store unavailable".into()));
        }

        Ok(self
            .conversations
            .read()
            .iter()
            .filter(|c| c.participant_ids.iter().any(|p| p == user_id))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Internal("conversation store unavailable".into()));
        }
        Ok(())
    }
}
