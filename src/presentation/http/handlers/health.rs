//! Health Check Handlers
//!
//! # Endpoints
//! - `GET /health` - Detailed health (conversation store, connections, cache)
//! - `GET /health/live` - Liveness probe (is the server running?)

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::time::Instant;

use crate::startup::AppState;

/// Server start time for uptime calculation
static SERVER_START: Lazy<Instant> = Lazy::new(Instant::now);
static SERVER_START_TIME: Lazy<DateTime<Utc>> = Lazy::new(Utc::now);

/// Initialize the server start time (call during startup)
pub fn init_server_start() {
    Lazy::force(&SERVER_START);
    Lazy::force(&SERVER_START_TIME);
}

/// Detailed health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub started_at: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub conversation_store: ServiceHealth,
    pub connections: ConnectionHealth,
    pub cache: CacheHealth,
}

/// Health status for individual services
#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionHealth {
    pub online_users: usize,
    pub active_connections: usize,
}

#[derive(Debug, Serialize)]
pub struct CacheHealth {
    pub entries: usize,
    pub max_entries: usize,
}

/// Overall health status
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Simple liveness response
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

/// Liveness probe - checks if the server is running
pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "alive" })
}

/// Detailed health. Delivery keeps working without the conversation store
/// (presence authorization fails closed), so its loss only degrades.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = check_conversation_store(&state).await;
    let cache = state.cache.stats();

    let response = HealthResponse {
        status: determine_overall_status(&store),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: SERVER_START.elapsed().as_secs(),
        started_at: SERVER_START_TIME.to_rfc3339(),
        checks: HealthChecks {
            conversation_store: store,
            connections: ConnectionHealth {
                online_users: state.registry.online_users().len(),
                active_connections: state.registry.connection_count(),
            },
            cache: CacheHealth {
                entries: cache.entries,
                max_entries: cache.max_entries,
            },
        },
    };

    (StatusCode::OK, Json(response))
}

/// Check conversation store connectivity and latency
async fn check_conversation_store(state: &AppState) -> ServiceHealth {
    let start = Instant::now();
    match state.conversations.ping().await {
        Ok(()) => {
            let latency = start.elapsed().as_millis() as u64;
            ServiceHealth {
                status: if latency < 100 {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Degraded
                },
                latency_ms: Some(latency),
                message: None,
            }
        }
        Err(e) => ServiceHealth {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(format!("Conversation store unavailable: {}", e)),
        },
    }
}

fn determine_overall_status(store: &ServiceHealth) -> HealthStatus {
    match store.status {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded | HealthStatus::Unhealthy => HealthStatus::Degraded,
    }
}
