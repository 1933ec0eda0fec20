//! Conversation membership and the store it is read from.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Participants of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMembership {
    pub conversation_id: String,
    pub participant_ids: Vec<String>,
}

impl ConversationMembership {
    pub fn new(conversation_id: impl Into<String>, participants: &[&str]) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            participant_ids: participants.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Every user sharing at least one conversation with `user_id` (excluding themselves).
pub fn shared_participants(user_id: &str, conversations: &[ConversationMembership]) -> HashSet<String> {
    conversations
        .iter()
        .filter(|c| c.participant_ids.iter().any(|p| p == user_id))
        .flat_map(|c| c.participant_ids.iter())
        .filter(|p| p.as_str() != user_id)
        .cloned()
        .collect()
}

/// Read access to conversation membership.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// All conversations `user_id` participates in.
    async fn find_by_participant(&self, user_id: &str) -> Result<Vec<ConversationMembership>, AppError>;

    /// Cheap connectivity probe used by readiness checks.
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
