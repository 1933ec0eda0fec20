//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

use marketplace_realtime::config::{
    AdminSettings, CacheSettings, CorsSettings, DatabaseSettings, DeliverySettings, JwtSettings,
    PresenceSettings, RouteSettings, ServerSettings, Settings,
};
use marketplace_realtime::domain::{ConversationMembership, Envelope};
use marketplace_realtime::infrastructure::repositories::InMemoryConversationStore;
use marketplace_realtime::presentation::http::routes;
use marketplace_realtime::presentation::websocket::{lifecycle, Connection};
use marketplace_realtime::startup::AppState;

pub const JWT_SECRET: &str = "integration-test-secret-at-least-32-chars";
pub const ADMIN_KEY: &str = "integration-admin-key";

pub fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseSettings {
            url: "postgres://localhost/unused".into(),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout: 1,
        },
        jwt: JwtSettings {
            secret: JWT_SECRET.into(),
        },
        admin: AdminSettings {
            api_key: ADMIN_KEY.into(),
        },
        cors: CorsSettings {
            allowed_origins: vec![],
        },
        cache: CacheSettings::default(),
        presence: PresenceSettings::default(),
        delivery: DeliverySettings::default(),
        routes: RouteSettings::default(),
        environment: "test".into(),
    }
}

/// Test application over an in-memory conversation store.
///
/// Default memberships: `C1 = {A, B}`, `C2 = {A, C}`. `D` shares nothing.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryConversationStore>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_conversations(vec![
            ConversationMembership::new("C1", &["A", "B"]),
            ConversationMembership::new("C2", &["A", "C"]),
        ])
    }

    pub fn with_conversations(conversations: Vec<ConversationMembership>) -> Self {
        Self::with_settings(test_settings(), conversations)
    }

    pub fn with_settings(settings: Settings, conversations: Vec<ConversationMembership>) -> Self {
        let store = Arc::new(InMemoryConversationStore::with_conversations(conversations));
        let state = AppState::new(settings, store.clone());
        let router = routes::create_router(state.clone());
        Self {
            state,
            store,
            router,
        }
    }

    /// Open a connection for `user_id` through the regular lifecycle.
    pub fn connect(&self, user_id: &str) -> (Connection, UnboundedReceiver<Envelope>) {
        let (connection, rx) = Connection::new(user_id);
        lifecycle::connect(&self.state, &connection);
        (connection, rx)
    }

    /// Send a request and decode the JSON body (`Value::Null` when empty).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        admin_key: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = admin_key {
            builder = builder.header("X-Admin-Key", key);
        }
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn admin_get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(ADMIN_KEY), None).await
    }
}

/// Wait for the next frame of `event_type`, skipping others.
pub async fn recv_type(rx: &mut UnboundedReceiver<Envelope>, event_type: &str) -> Envelope {
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let envelope = rx.recv().await.expect("connection channel closed");
            if envelope.event_type() == event_type {
                return envelope;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {} frame received", event_type))
}

/// Frames received so far, without waiting.
pub fn drain(rx: &mut UnboundedReceiver<Envelope>) -> Vec<Envelope> {
    let mut frames = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        frames.push(envelope);
    }
    frames
}

pub fn count_type(frames: &[Envelope], event_type: &str) -> usize {
    frames
        .iter()
        .filter(|f| f.event_type() == event_type)
        .count()
}
