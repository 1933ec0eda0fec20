//! Cache Module
//!
//! Process-wide in-memory TTL cache and the key conventions every
//! component uses on top of it.
//!
//! # Architecture
//!
//! ```text
//! +---------------------------+
//! | Registry / Presence /     |
//! | Deferral / Notifications  |
//! +---------------------------+
//!              |
//!              v
//! +---------------------------+
//! |  keys::*  (namespacing)   |
//! +---------------------------+
//!              |
//!              v
//! +---------------------------+
//! |  TtlCache (Arc, shared)   |  <-- lazy expiry + sweep + bulk eviction
//! +---------------------------+
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use marketplace_realtime::infrastructure::cache::{keys, TtlCache};
//!
//! let cache = Arc::new(TtlCache::new(&settings.cache));
//! cache.spawn_sweeper(settings.cache.sweep_interval());
//!
//! cache.set_as(&keys::unread_count(user_id), &3u64, Some(ttl));
//! let count: Option<u64> = cache.get_as(&keys::unread_count(user_id));
//! ```

mod ttl_cache;

pub use ttl_cache::{CacheStats, TtlCache};

/// Cache key prefixes for the delivery subsystem.
///
/// Callers own key naming; the cache itself is namespace-agnostic.
pub mod keys {
    /// Offline replay queue (e.g., "offline:user_id")
    pub const OFFLINE: &str = "offline:";

    /// Online marker holding `onlineSince` (e.g., "presence:online:user_id")
    pub const PRESENCE_ONLINE: &str = "presence:online:";

    /// Time of the last online -> offline transition
    pub const PRESENCE_LAST_SEEN: &str = "presence:last_seen:";

    /// Time of the last observed activity
    pub const PRESENCE_LAST_ACTIVE: &str = "presence:last_active:";

    /// Deferred conversation events (e.g., "conversation_updates:user_id")
    pub const CONVERSATION_UPDATES: &str = "conversation_updates:";

    /// Delivery confirmation awaiting acknowledgment (keyed by event id)
    pub const DELIVERY_CONFIRMATION: &str = "delivery_confirmation:";

    /// Notification history, newest first
    pub const NOTIFICATIONS: &str = "notifications:";

    /// Cached unread notification count
    pub const UNREAD_COUNT: &str = "unread_count:";

    /// Conversation participant sets of a requester, used for presence authorization
    pub const USER_CONVERSATIONS: &str = "user_conversations:";

    /// Conversation-scoped state (e.g., "conversation:conversation_id")
    pub const CONVERSATION: &str = "conversation:";

    /// Prefixes whose keys end with a user id.
    const USER_SCOPED: [&str; 8] = [
        OFFLINE,
        PRESENCE_ONLINE,
        PRESENCE_LAST_SEEN,
        PRESENCE_LAST_ACTIVE,
        CONVERSATION_UPDATES,
        NOTIFICATIONS,
        UNREAD_COUNT,
        USER_CONVERSATIONS,
    ];

    #[inline]
    pub fn offline(user_id: impl std::fmt::Display) -> String {
        format!("{}{}", OFFLINE, user_id)
    }

    #[inline]
    pub fn presence_online(user_id: impl std::fmt::Display) -> String {
        format!("{}{}", PRESENCE_ONLINE, user_id)
    }

    #[inline]
    pub fn presence_last_seen(user_id: impl std::fmt::Display) -> String {
        format!("{}{}", PRESENCE_LAST_SEEN, user_id)
    }

    #[inline]
    pub fn presence_last_active(user_id: impl std::fmt::Display) -> String {
        format!("{}{}", PRESENCE_LAST_ACTIVE, user_id)
    }

    #[inline]
    pub fn conversation_updates(user_id: impl std::fmt::Display) -> String {
        format!("{}{}", CONVERSATION_UPDATES, user_id)
    }

    #[inline]
    pub fn delivery_confirmation(event_id: impl std::fmt::Display) -> String {
        format!("{}{}", DELIVERY_CONFIRMATION, event_id)
    }

    #[inline]
    pub fn notifications(user_id: impl std::fmt::Display) -> String {
        format!("{}{}", NOTIFICATIONS, user_id)
    }

    #[inline]
    pub fn unread_count(user_id: impl std::fmt::Display) -> String {
        format!("{}{}", UNREAD_COUNT, user_id)
    }

    #[inline]
    pub fn user_conversations(user_id: impl std::fmt::Display) -> String {
        format!("{}{}", USER_CONVERSATIONS, user_id)
    }

    #[inline]
    pub fn conversation(conversation_id: impl std::fmt::Display) -> String {
        format!("{}{}", CONVERSATION, conversation_id)
    }

    /// Whether `key` is one of the user-scoped keys of `user_id`.
    pub fn belongs_to_user(key: &str, user_id: &str) -> bool {
        USER_SCOPED
            .iter()
            .any(|prefix| key.strip_prefix(prefix) == Some(user_id))
    }

    /// Whether `key` holds state of `conversation_id` (the bare key or a `:`-suffixed child).
    pub fn belongs_to_conversation(key: &str, conversation_id: &str) -> bool {
        key.strip_prefix(CONVERSATION)
            .and_then(|rest| rest.strip_prefix(conversation_id))
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
    }

}
