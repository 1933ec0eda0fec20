//! Inbound frame types.
//!
//! Clients send `{ "type": ..., "data": ... }`; outbound frames are
//! [`crate::domain::Envelope`]s.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "route:update")]
    RouteUpdate(RoutePayload),
    #[serde(rename = "presence:subscribe")]
    PresenceSubscribe(UserIdsPayload),
    #[serde(rename = "presence:unsubscribe")]
    PresenceUnsubscribe(UserIdsPayload),
    #[serde(rename = "presence:query")]
    PresenceQuery(UserIdsPayload),
    #[serde(rename = "conversation:join")]
    ConversationJoin(ConversationPayload),
    #[serde(rename = "conversation:leave")]
    ConversationLeave,
    #[serde(rename = "notification:mark_read")]
    MarkRead(MarkReadPayload),
    #[serde(rename = "event:ack")]
    EventAck(EventAckPayload),
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Heartbeat => "heartbeat",
            ClientMessage::RouteUpdate(_) => "route:update",
            ClientMessage::PresenceSubscribe(_) => "presence:subscribe",
            ClientMessage::PresenceUnsubscribe(_) => "presence:unsubscribe",
            ClientMessage::PresenceQuery(_) => "presence:query",
            ClientMessage::ConversationJoin(_) => "conversation:join",
            ClientMessage::ConversationLeave => "conversation:leave",
            ClientMessage::MarkRead(_) => "notification:mark_read",
            ClientMessage::EventAck(_) => "event:ack",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoutePayload {
    pub route: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdsPayload {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPayload {
    pub conversation_id: String,
}

/// `ids: None` marks every notification read.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MarkReadPayload {
    #[serde(default)]
    pub ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAckPayload {
    pub event_id: String,
}
