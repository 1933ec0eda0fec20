//! # Domain Entities
//!
//! Core objects of the delivery and presence subsystem.
//!
//! - **Envelope**: outbound `{type, id, timestamp, data}` wire message
//! - **Notification**: enriched notification kept in a user's history
//! - **QueuedEvent**: payload held back while a user is offline or out of context
//! - **PresenceStatus**: derived online/offline/lastSeen record
//! - **ConversationMembership**: participant set used to authorize presence
//!
//! `ConversationStore` is the data access contract for memberships; it is
//! implemented in the infrastructure layer.

mod conversation;
mod envelope;
mod notification;
mod presence;
mod queued_event;

pub use conversation::{shared_participants, ConversationMembership, ConversationStore};
pub use envelope::{
    ConversationEvent, ConversationStatusEvent, Envelope, NewMessageEvent, NotificationNewEvent,
    PresenceOfflineEvent, PresenceOnlineEvent, PresenceSnapshotEvent, ProposalStatusEvent,
    ServerEvent, UnreadCountEvent,
};
pub use notification::{NewNotification, Notification, NotificationKind, NotificationPriority};
pub use presence::{PresenceState, PresenceStatus};
pub use queued_event::{push_bounded, CachedReason, QueuedEvent};
