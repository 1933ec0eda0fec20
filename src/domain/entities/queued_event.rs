//! Queued event entity.
//!
//! Shared by the offline queue (`offline:<userId>`) and the deferred
//! conversation-update queue (`conversation_updates:<userId>`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::envelope::Envelope;

/// Why an event was held back instead of pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachedReason {
    UserOffline,
    OutOfContext,
}

/// Payload held back for later delivery.
///
/// `payload` is replayed exactly as originally constructed; its `id` and
/// `timestamp` double as the queue entry's identity and ordering key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub payload: Envelope,
    pub delivered: bool,
    pub cached_reason: CachedReason,
    pub queued_at: DateTime<Utc>,
}

impl QueuedEvent {
    pub fn new(payload: Envelope, cached_reason: CachedReason) -> Self {
        Self {
            payload,
            delivered: false,
            cached_reason,
            queued_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.payload.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.payload.timestamp
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

/// Append `event` to `queue`, dropping the oldest entries beyond `max_len`.
pub fn push_bounded(queue: &mut Vec<QueuedEvent>, event: QueuedEvent, max_len: usize) {
    queue.push(event);
    if queue.len() > max_len {
        let overflow = queue.len() - max_len;
        queue.drain(..overflow);
    }
}
