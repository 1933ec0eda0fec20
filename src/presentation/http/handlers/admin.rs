//! Operator Handlers
//!
//! Cache inspection and invalidation. Routed behind the admin key guard.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::application::services::InvalidationReport;
use crate::domain::{PresenceStatus, RouteStatusView};
use crate::infrastructure::cache::CacheStats;
use crate::shared::error::AppError;
use crate::startup::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearedResponse {
    pub removed: usize,
}

#[derive(Debug, Deserialize)]
pub struct InvalidateConversationRequest {
    pub participants: Vec<String>,
}

/// Operator view of a user's presence and delivery backlog
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceReport {
    #[serde(flatten)]
    pub status: PresenceStatus,
    pub connections: usize,
    pub active_conversation: Option<String>,
    pub route: Option<RouteStatusView>,
    pub offline_queue: usize,
    pub deferred_events: usize,
    pub unread_notifications: u64,
}

/// GET /admin/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache_admin.stats())
}

/// DELETE /admin/cache
pub async fn clear_cache(State(state): State<AppState>) -> Json<ClearedResponse> {
    Json(ClearedResponse {
        removed: state.cache_admin.clear_all(),
    })
}

/// DELETE /admin/cache/users/{user_id}
pub async fn clear_user_cache(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<ClearedResponse> {
    Json(ClearedResponse {
        removed: state.cache_admin.clear_user(&user_id),
    })
}

/// POST /admin/conversations/{conversation_id}/invalidate
pub async fn invalidate_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(body): Json<InvalidateConversationRequest>,
) -> Result<Json<InvalidationReport>, AppError> {
    if conversation_id.trim().is_empty() {
        return Err(AppError::BadRequest("conversation_id must not be empty".into()));
    }
    Ok(Json(
        state
            .cache_admin
            .invalidate_conversation(&conversation_id, &body.participants),
    ))
}

/// GET /admin/presence/{user_id}
pub async fn presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<PresenceReport> {
    Json(PresenceReport {
        status: state.presence.status(&user_id),
        connections: state.registry.get_connections(&user_id).len(),
        active_conversation: state.registry.active_conversation(&user_id),
        route: state.deferral.route_status(&user_id),
        offline_queue: state.registry.offline_queue(&user_id).len(),
        deferred_events: state.deferral.pending(&user_id).len(),
        unread_notifications: state.notifications.unread_count(&user_id),
    })
}
