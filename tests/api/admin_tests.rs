//! Operator API Tests

use axum::http::{Method, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::json;

use marketplace_realtime::domain::{ConversationEvent, NewMessageEvent};
use marketplace_realtime::infrastructure::cache::keys;

use crate::common::{test_settings, TestApp, ADMIN_KEY};

#[tokio::test]
async fn test_admin_routes_require_key() {
    let app = TestApp::new();

    let (status, body) = app
        .request(Method::GET, "/admin/cache/stats", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 10003);

    let (status, _) = app
        .request(Method::GET, "/admin/cache/stats", Some("wrong-key"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_empty_admin_key_disables_routes() {
    let mut settings = test_settings();
    settings.admin.api_key.clear();
    let app = TestApp::with_settings(settings, vec![]);

    let (status, _) = app
        .request(Method::GET, "/admin/cache/stats", Some(""), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cache_stats() {
    let app = TestApp::new();
    app.state.cache.set("k", json!(1), None);
    app.state.cache.get("k");
    app.state.cache.get("missing");

    let (status, body) = app.admin_get("/admin/cache/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"], 1);
    assert_eq!(body["hits"], 1);
    assert_eq!(body["misses"], 1);
    assert_eq!(body["max_entries"], 10_000);
}

#[tokio::test]
async fn test_clear_user_cache_is_scoped() {
    let app = TestApp::new();
    app.state
        .cache
        .set(&keys::unread_count("B"), json!(3), None);
    app.state
        .cache
        .set(&keys::offline("B"), json!([]), None);
    app.state
        .cache
        .set(&keys::unread_count("B2"), json!(1), None);

    let (status, body) = app
        .request(Method::DELETE, "/admin/cache/users/B", Some(ADMIN_KEY), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 2);
    assert!(app.state.cache.contains(&keys::unread_count("B2")));
}

#[tokio::test]
async fn test_clear_whole_cache() {
    let app = TestApp::new();
    app.state.cache.set("a", json!(1), None);
    app.state.cache.set("b", json!(2), None);

    let (status, body) = app
        .request(Method::DELETE, "/admin/cache", Some(ADMIN_KEY), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 2);
    assert!(app.state.cache.is_empty());
}

#[tokio::test]
async fn test_invalidate_conversation() {
    let app = TestApp::new();
    // Cache A's memberships through a presence query.
    app.state.presence.query("A", &["B".to_string()]).await;
    assert!(app.state.cache.contains(&keys::user_conversations("A")));

    app.state.deferral.defer_or_deliver(
        "B",
        &ConversationEvent::NewMessage(NewMessageEvent {
            conversation_id: "C1".into(),
            message_id: "m1".into(),
            sender_id: "A".into(),
            preview: None,
        }),
    );
    app.state
        .cache
        .set(&keys::conversation("C1"), json!({"status": "active"}), None);

    let (status, body) = app
        .request(
            Method::POST,
            "/admin/conversations/C1/invalidate",
            Some(ADMIN_KEY),
            Some(json!({ "participants": ["A", "B"] })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "conversationEntries": 1,
            "authorizationEntries": 1,
            "deferredEvents": 1,
        })
    );
    assert!(!app.state.cache.contains(&keys::user_conversations("A")));
    assert!(app.state.deferral.pending("B").is_empty());
}

#[tokio::test]
async fn test_presence_report() {
    let app = TestApp::new();
    let (_conn, _rx) = app.connect("B");
    app.state.registry.set_active_conversation("B", "C1");

    let (status, body) = app.admin_get("/admin/presence/B").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], "B");
    assert_eq!(body["status"], "online");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["activeConversation"], "C1");
    assert_eq!(body["offlineQueue"], 0);

    let (_, body) = app.admin_get("/admin/presence/nobody").await;
    assert_eq!(body["status"], "offline");
    assert_eq!(body["connections"], 0);
}
