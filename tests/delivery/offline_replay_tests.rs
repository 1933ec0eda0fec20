//! Offline queue and paced replay scenarios.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use marketplace_realtime::application::services::DispatchOutcome;
use marketplace_realtime::domain::{
    CachedReason, ConversationEvent, Envelope, NewMessageEvent, ServerEvent,
};
use marketplace_realtime::presentation::websocket::lifecycle;

use crate::common::{count_type, drain, recv_type, TestApp};

fn message(conversation_id: &str, message_id: &str) -> NewMessageEvent {
    NewMessageEvent {
        conversation_id: conversation_id.into(),
        message_id: message_id.into(),
        sender_id: "A".into(),
        preview: Some("is the account still available?".into()),
    }
}

#[tokio::test(start_paused = true)]
async fn test_message_to_offline_user_is_replayed_once() {
    let app = TestApp::new();

    let outcome = app
        .state
        .deferral
        .dispatch("B", ConversationEvent::NewMessage(message("C1", "m1")));
    assert_eq!(outcome, DispatchOutcome::QueuedOffline);

    let queue = app.state.registry.offline_queue("B");
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].event_type(), "new_message");
    assert_eq!(queue[0].cached_reason, CachedReason::UserOffline);

    let (_conn, mut rx) = app.connect("B");
    let replayed = recv_type(&mut rx, "new_message").await;
    assert_eq!(replayed.event.conversation_id(), Some("C1"));
    assert_eq!(replayed, queue[0].payload);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(count_type(&drain(&mut rx), "new_message"), 0);
    assert!(app.state.registry.offline_queue("B").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_replay_preserves_chronological_order() {
    let app = TestApp::new();
    let now = Utc::now();

    // Queued out of order on purpose.
    for (message_id, age_secs) in [("t2", 20), ("t3", 10), ("t1", 30)] {
        let mut envelope = Envelope::new(ServerEvent::NewMessage(message("C1", message_id)));
        envelope.timestamp = now - ChronoDuration::seconds(age_secs);
        app.state
            .registry
            .queue_offline("B", envelope, CachedReason::UserOffline);
    }

    let (_conn, mut rx) = app.connect("B");
    let mut order = Vec::new();
    for _ in 0..3 {
        match recv_type(&mut rx, "new_message").await.event {
            ServerEvent::NewMessage(e) => order.push(e.message_id),
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(order, vec!["t1", "t2", "t3"]);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_mid_replay_keeps_queue_for_next_reconnect() {
    let app = TestApp::new();
    for i in 0..5 {
        app.state.registry.queue_offline(
            "B",
            Envelope::new(ServerEvent::NewMessage(message("C1", &format!("m{}", i)))),
            CachedReason::UserOffline,
        );
    }

    let (conn, mut rx) = app.connect("B");
    recv_type(&mut rx, "new_message").await;
    lifecycle::disconnect(&app.state, &conn);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(app.state.registry.offline_queue("B").len(), 5);

    let (_again, mut rx) = app.connect("B");
    for _ in 0..5 {
        recv_type(&mut rx, "new_message").await;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(app.state.registry.offline_queue("B").is_empty());
}

#[tokio::test]
async fn test_online_iff_connection_set_non_empty() {
    let app = TestApp::new();
    let registry = &app.state.registry;
    assert!(!registry.is_online("B"));

    let (first, _rx1) = app.connect("B");
    let (second, _rx2) = app.connect("B");
    assert!(registry.is_online("B"));
    assert_eq!(registry.get_connections("B").len(), 2);

    assert!(lifecycle::disconnect(&app.state, &first).is_none());
    assert!(registry.is_online("B"));
    assert_eq!(registry.get_connections("B").len(), 1);

    assert!(lifecycle::disconnect(&app.state, &second).is_some());
    assert!(!registry.is_online("B"));
    assert!(registry.get_connections("B").is_empty());
}
