//! Outbound wire envelope and event payloads.
//!
//! Every message pushed over a connection is an [`Envelope`]:
//!
//! ```json
//! { "type": "presence:online", "id": "…", "timestamp": "…", "data": { … } }
//! ```
//!
//! `type` and `data` come from the adjacently tagged [`ServerEvent`]; one
//! concrete payload struct exists per event type. The envelope goes through
//! [`RawEnvelope`] on the wire so queued envelopes decode back unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::notification::Notification;
use super::presence::PresenceStatus;

/// Envelope wrapping a single outbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope", into = "RawEnvelope")]
pub struct Envelope {
    pub event: ServerEvent,
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// Flat wire form of [`Envelope`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = serde_json::Error;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        let event = serde_json::from_value(json!({ "type": raw.event_type, "data": raw.data }))?;
        Ok(Self {
            event,
            id: raw.id,
            timestamp: raw.timestamp,
        })
    }
}

impl From<Envelope> for RawEnvelope {
    fn from(envelope: Envelope) -> Self {
        let data = serde_json::to_value(&envelope.event)
            .ok()
            .and_then(|mut tagged| tagged.get_mut("data").map(Value::take))
            .unwrap_or(Value::Null);

        Self {
            event_type: envelope.event.event_type().to_string(),
            id: envelope.id,
            timestamp: envelope.timestamp,
            data,
        }
    }
}

impl Envelope {
    /// Wrap an event with a fresh id and the current time.
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event,
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}

/// Outbound event types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "presence:online")]
    PresenceOnline(PresenceOnlineEvent),
    #[serde(rename = "presence:offline")]
    PresenceOffline(PresenceOfflineEvent),
    #[serde(rename = "presence:snapshot")]
    PresenceSnapshot(PresenceSnapshotEvent),

    #[serde(rename = "notification:new")]
    NotificationNew(NotificationNewEvent),
    #[serde(rename = "notification:unread_count")]
    UnreadCount(UnreadCountEvent),

    #[serde(rename = "new_message")]
    NewMessage(NewMessageEvent),
    #[serde(rename = "conversation_status_update")]
    ConversationStatus(ConversationStatusEvent),
    #[serde(rename = "proposal_status_update")]
    ProposalStatus(ProposalStatusEvent),
}

impl ServerEvent {
    /// Get the wire name of the event
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::PresenceOnline(_) => "presence:online",
            ServerEvent::PresenceOffline(_) => "presence:offline",
            ServerEvent::PresenceSnapshot(_) => "presence:snapshot",
            ServerEvent::NotificationNew(_) => "notification:new",
            ServerEvent::UnreadCount(_) => "notification:unread_count",
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::ConversationStatus(_) => "conversation_status_update",
            ServerEvent::ProposalStatus(_) => "proposal_status_update",
        }
    }

    /// Conversation the event refers to, if any
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ServerEvent::NewMessage(e) => Some(&e.conversation_id),
            ServerEvent::ConversationStatus(e) => Some(&e.conversation_id),
            ServerEvent::ProposalStatus(e) => Some(&e.conversation_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceOnlineEvent {
    pub user_id: String,
    pub online_since: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceOfflineEvent {
    pub user_id: String,
    pub last_seen: DateTime<Utc>,
    pub last_active_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceSnapshotEvent {
    pub statuses: Vec<PresenceStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationNewEvent {
    pub notification: Notification,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnreadCountEvent {
    pub count: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageEvent {
    pub conversation_id: String,
    pub message_id: String,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStatusEvent {
    pub conversation_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalStatusEvent {
    pub conversation_id: String,
    pub proposal_id: String,
    pub status: String,
}

/// Conversation events subject to route-aware deferral.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    NewMessage(NewMessageEvent),
    StatusChanged(ConversationStatusEvent),
    ProposalChanged(ProposalStatusEvent),
}

impl ConversationEvent {
    pub fn conversation_id(&self) -> &str {
        match self {
            ConversationEvent::NewMessage(e) => &e.conversation_id,
            ConversationEvent::StatusChanged(e) => &e.conversation_id,
            ConversationEvent::ProposalChanged(e) => &e.conversation_id,
        }
    }

    pub fn into_envelope(self) -> Envelope {
        let event = match self {
            ConversationEvent::NewMessage(e) => ServerEvent::NewMessage(e),
            ConversationEvent::StatusChanged(e) => ServerEvent::ConversationStatus(e),
            ConversationEvent::ProposalChanged(e) => ServerEvent::ProposalStatus(e),
        };
        Envelope::new(event)
    }
}
