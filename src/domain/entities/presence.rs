//! Presence record.
//!
//! Derived on read: `online` comes from the connection registry, the
//! timestamps from the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Offline,
}

/// Presence of one user as reported to an authorized observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceStatus {
    pub user_id: String,
    pub status: PresenceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub online_since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<DateTime<Utc>>,
}

impl PresenceStatus {
    pub fn is_online(&self) -> bool {
        self.status == PresenceState::Online
    }
}
