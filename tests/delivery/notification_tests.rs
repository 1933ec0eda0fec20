//! Notification delivery scenarios.

use std::time::Duration;

use marketplace_realtime::application::services::{RetryOutcome, SendOptions};
use marketplace_realtime::domain::{
    NewNotification, NotificationKind, NotificationPriority, ServerEvent,
};
use marketplace_realtime::presentation::websocket::protocol::MarkReadPayload;
use marketplace_realtime::presentation::websocket::{lifecycle, ClientMessage};

use crate::common::{count_type, drain, recv_type, TestApp};

fn payment_received() -> NewNotification {
    NewNotification::new(
        NotificationKind::Payment,
        "Payment received",
        "Escrow funded for order #981",
    )
    .with_metadata("orderId", "981")
    .with_priority(NotificationPriority::High)
}

fn unread_count(frame: &marketplace_realtime::domain::Envelope) -> u64 {
    match &frame.event {
        ServerEvent::UnreadCount(e) => e.count,
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_offline_notification_is_kept_after_retries_are_exhausted() {
    let app = TestApp::new();
    let result = app
        .state
        .notifications
        .send("B", payment_received(), SendOptions::default());
    assert!(!result.delivered);
    let retry = result.retry.expect("retry scheduled for offline recipient");

    // Delays of 5s, 10s and 20s between attempts.
    tokio::time::sleep(Duration::from_millis(34_900)).await;
    assert_eq!(app.state.notifications.retries_in_flight(), 1);
    assert_eq!(retry.await.unwrap(), RetryOutcome::Abandoned { attempts: 3 });
    assert_eq!(app.state.notifications.retries_in_flight(), 0);

    let history = app.state.notifications.history("B");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].metadata.get("orderId").map(String::as_str), Some("981"));
    assert!(!history[0].delivered);
    assert_eq!(app.state.registry.offline_queue("B").len(), 1);

    let (_conn, mut rx) = app.connect("B");
    let count = recv_type(&mut rx, "notification:unread_count").await;
    assert_eq!(unread_count(&count), 1);
    let replayed = recv_type(&mut rx, "notification:new").await;
    match replayed.event {
        ServerEvent::NotificationNew(e) => assert_eq!(e.notification.id, history[0].id),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_notification_without_retry_arrives_once_on_reconnect() {
    let app = TestApp::new();
    let result = app.state.notifications.send(
        "B",
        payment_received(),
        SendOptions {
            retry_on_failure: false,
        },
    );
    assert!(!result.delivered);
    assert_eq!(app.state.registry.offline_queue("B").len(), 1);

    let (_conn, mut rx) = app.connect("B");
    recv_type(&mut rx, "notification:new").await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(count_type(&drain(&mut rx), "notification:new"), 0);
    assert!(app.state.registry.offline_queue("B").is_empty());
}

#[tokio::test]
async fn test_online_notification_is_pushed_with_count() {
    let app = TestApp::new();
    let (_conn, mut rx) = app.connect("B");
    drain(&mut rx);

    let result = app
        .state
        .notifications
        .send("B", payment_received(), SendOptions::default());
    assert!(result.delivered);
    assert!(result.retry.is_none());

    let pushed = recv_type(&mut rx, "notification:new").await;
    match pushed.event {
        ServerEvent::NotificationNew(e) => {
            assert_eq!(e.notification.id, result.notification.id);
            assert!(e.notification.delivered);
            assert!(!e.notification.read);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(unread_count(&recv_type(&mut rx, "notification:unread_count").await), 1);
}

#[tokio::test]
async fn test_mark_read_frame_updates_count_on_every_connection() {
    let app = TestApp::new();
    let options = SendOptions {
        retry_on_failure: false,
    };
    let first = app
        .state
        .notifications
        .send("B", payment_received(), options)
        .notification;
    app.state.notifications.send("B", payment_received(), options);

    let (phone, mut phone_rx) = app.connect("B");
    let (_laptop, mut laptop_rx) = app.connect("B");
    drain(&mut phone_rx);
    drain(&mut laptop_rx);

    lifecycle::handle_client_message(
        &app.state,
        &phone,
        ClientMessage::MarkRead(MarkReadPayload {
            ids: Some(vec![first.id.clone()]),
        }),
    )
    .await;
    assert_eq!(unread_count(&recv_type(&mut phone_rx, "notification:unread_count").await), 1);
    assert_eq!(unread_count(&recv_type(&mut laptop_rx, "notification:unread_count").await), 1);

    let history = app.state.notifications.history("B");
    let read = history.iter().find(|n| n.id == first.id).unwrap();
    assert!(read.read);
    assert!(read.read_at.is_some());

    lifecycle::handle_client_message(
        &app.state,
        &phone,
        ClientMessage::MarkRead(MarkReadPayload { ids: None }),
    )
    .await;
    assert_eq!(unread_count(&recv_type(&mut phone_rx, "notification:unread_count").await), 0);

    // Nothing left to change, so no further push.
    lifecycle::handle_client_message(
        &app.state,
        &phone,
        ClientMessage::MarkRead(MarkReadPayload { ids: None }),
    )
    .await;
    assert_eq!(count_type(&drain(&mut phone_rx), "notification:unread_count"), 0);
}

#[tokio::test]
async fn test_broadcast_reaches_online_and_stores_for_offline() {
    let app = TestApp::new();
    let (_a, mut rx_a) = app.connect("A");

    let users = vec!["A".to_string(), "C".to_string()];
    let results = app.state.notifications.broadcast(
        &users,
        NewNotification::new(NotificationKind::System, "Maintenance", "Tonight at 02:00 UTC"),
        SendOptions {
            retry_on_failure: false,
        },
    );

    assert!(results[0].delivered);
    assert!(!results[1].delivered);
    recv_type(&mut rx_a, "notification:new").await;
    assert_eq!(app.state.notifications.history("C").len(), 1);
    assert_eq!(app.state.notifications.unread_count("C"), 1);
    assert_eq!(app.state.registry.offline_queue("C").len(), 1);
}
