//! Conversation Repository Implementation
//!
//! PostgreSQL implementation of the ConversationStore trait.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{ConversationMembership, ConversationStore};
use crate::shared::error::AppError;

/// Database row representation of the conversation_participants join.
#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    conversation_id: String,
    participant_ids: Vec<String>,
}

impl From<MembershipRow> for ConversationMembership {
    fn from(row: MembershipRow) -> Self {
        Self {
            conversation_id: row.conversation_id,
            participant_ids: row.participant_ids,
        }
    }
}

/// PostgreSQL conversation membership store.
#[derive(Clone)]
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    /// Create a new PgConversationStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn find_by_participant(&self, user_id: &str) -> Result<Vec<ConversationMembership>, AppError> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT cp.conversation_id, array_agg(cp.user_id) AS participant_ids
            FROM conversation_participants cp
            WHERE cp.conversation_id IN (
                SELECT conversation_id FROM conversation_participants WHERE user_id = $1
            )
            GROUP BY cp.conversation_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ConversationMembership::from).collect())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
