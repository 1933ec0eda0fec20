//! Route-aware deferral scenarios.

use std::time::Duration;

use marketplace_realtime::application::services::{DeferralDecision, DispatchOutcome};
use marketplace_realtime::domain::{
    ConversationEvent, ConversationStatusEvent, NewMessageEvent, ServerEvent,
};
use marketplace_realtime::presentation::websocket::protocol::{EventAckPayload, RoutePayload};
use marketplace_realtime::presentation::websocket::{lifecycle, ClientMessage};

use crate::common::{count_type, drain, recv_type, TestApp};

fn route(path: &str) -> ClientMessage {
    ClientMessage::RouteUpdate(RoutePayload { route: path.into() })
}

fn status_update(conversation_id: &str, status: &str) -> ConversationEvent {
    ConversationEvent::StatusChanged(ConversationStatusEvent {
        conversation_id: conversation_id.into(),
        status: status.into(),
        updated_by: Some("A".into()),
    })
}

fn new_message(conversation_id: &str, message_id: &str) -> ConversationEvent {
    ConversationEvent::NewMessage(NewMessageEvent {
        conversation_id: conversation_id.into(),
        message_id: message_id.into(),
        sender_id: "A".into(),
        preview: None,
    })
}

#[tokio::test]
async fn test_in_context_user_receives_events_live() {
    let app = TestApp::new();
    let (conn, mut rx) = app.connect("B");
    lifecycle::handle_client_message(&app.state, &conn, route("/chat/C1")).await;

    let decision = app
        .state
        .deferral
        .defer_or_deliver("B", &status_update("C1", "accepted"));
    assert_eq!(decision, DeferralDecision::NoActionNeeded);
    assert!(app.state.deferral.pending("B").is_empty());

    let outcome = app.state.deferral.dispatch("B", status_update("C1", "accepted"));
    assert_eq!(outcome, DispatchOutcome::Delivered);

    let pushed = recv_type(&mut rx, "conversation_status_update").await;
    match pushed.event {
        ServerEvent::ConversationStatus(e) => assert_eq!(e.status, "accepted"),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_out_of_context_events_flush_on_route_change() {
    let app = TestApp::new();
    let (conn, mut rx) = app.connect("B");
    lifecycle::handle_client_message(&app.state, &conn, route("/marketplace/listings")).await;

    assert_eq!(
        app.state.deferral.dispatch("B", new_message("C1", "m1")),
        DispatchOutcome::Deferred
    );
    assert_eq!(
        app.state.deferral.dispatch("B", new_message("C1", "m2")),
        DispatchOutcome::Deferred
    );
    assert_eq!(count_type(&drain(&mut rx), "new_message"), 0);
    assert_eq!(app.state.deferral.pending("B").len(), 2);

    lifecycle::handle_client_message(&app.state, &conn, route("/chat/C1")).await;

    let first = recv_type(&mut rx, "new_message").await;
    let second = recv_type(&mut rx, "new_message").await;
    assert!(app.state.deferral.pending("B").is_empty());

    let confirmation = app
        .state
        .deferral
        .confirmation(&first.id)
        .expect("confirmation recorded on flush");
    assert_eq!(confirmation.user_id, "B");
    assert_eq!(confirmation.event_type, "new_message");

    lifecycle::handle_client_message(
        &app.state,
        &conn,
        ClientMessage::EventAck(EventAckPayload {
            event_id: first.id.clone(),
        }),
    )
    .await;
    assert!(app.state.deferral.confirmation(&first.id).is_none());
    assert!(app.state.deferral.confirmation(&second.id).is_some());
}

#[tokio::test]
async fn test_only_recipient_can_acknowledge() {
    let app = TestApp::new();
    let (b, _rx_b) = app.connect("B");
    let (a, _rx_a) = app.connect("A");
    lifecycle::handle_client_message(&app.state, &b, route("/profile")).await;
    let DeferralDecision::Queued { event_id } = app
        .state
        .deferral
        .defer_or_deliver("B", &new_message("C1", "m1"))
    else {
        panic!("event should have been deferred");
    };
    lifecycle::handle_client_message(&app.state, &b, route("/messages")).await;

    lifecycle::handle_client_message(
        &app.state,
        &a,
        ClientMessage::EventAck(EventAckPayload {
            event_id: event_id.clone(),
        }),
    )
    .await;
    assert!(app.state.deferral.confirmation(&event_id).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_stale_route_defers_events() {
    let app = TestApp::new();
    let (conn, mut rx) = app.connect("B");
    lifecycle::handle_client_message(&app.state, &conn, route("/chat/C1")).await;
    assert!(app.state.deferral.is_in_context("B"));

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(!app.state.deferral.is_in_context("B"));

    assert_eq!(
        app.state.deferral.dispatch("B", new_message("C1", "m1")),
        DispatchOutcome::Deferred
    );
    assert_eq!(count_type(&drain(&mut rx), "new_message"), 0);
}

#[tokio::test]
async fn test_offline_user_goes_to_offline_queue_not_deferral() {
    let app = TestApp::new();

    assert_eq!(
        app.state.deferral.dispatch("B", new_message("C1", "m1")),
        DispatchOutcome::QueuedOffline
    );
    assert_eq!(app.state.registry.offline_queue("B").len(), 1);
    assert!(app.state.deferral.pending("B").is_empty());
}

#[tokio::test]
async fn test_last_disconnect_clears_route() {
    let app = TestApp::new();
    let (conn, _rx) = app.connect("B");
    lifecycle::handle_client_message(&app.state, &conn, route("/chat/C1")).await;
    assert!(app.state.deferral.route_status("B").is_some());

    lifecycle::disconnect(&app.state, &conn);
    assert!(app.state.deferral.route_status("B").is_none());
    assert!(!app.state.deferral.is_in_context("B"));
}
