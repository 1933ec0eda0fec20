//! Presence debounce and authorization scenarios.

use std::time::Duration;

use marketplace_realtime::domain::ServerEvent;
use marketplace_realtime::presentation::websocket::protocol::UserIdsPayload;
use marketplace_realtime::presentation::websocket::{lifecycle, ClientMessage};

use crate::common::{count_type, drain, recv_type, TestApp};

fn subscribe(user_ids: &[&str]) -> ClientMessage {
    ClientMessage::PresenceSubscribe(UserIdsPayload {
        user_ids: user_ids.iter().map(|u| u.to_string()).collect(),
    })
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_within_grace_period_is_not_broadcast() {
    let app = TestApp::new();
    let (watcher, mut watcher_rx) = app.connect("A");
    lifecycle::handle_client_message(&app.state, &watcher, subscribe(&["B"])).await;
    recv_type(&mut watcher_rx, "presence:snapshot").await;

    let (first, _rx1) = app.connect("B");
    recv_type(&mut watcher_rx, "presence:online").await;

    let grace = lifecycle::disconnect(&app.state, &first).expect("last connection");
    tokio::time::sleep(Duration::from_secs(2)).await;
    let (_second, _rx2) = app.connect("B");

    assert!(!grace.await.unwrap());
    tokio::time::sleep(Duration::from_secs(10)).await;

    let frames = drain(&mut watcher_rx);
    assert_eq!(count_type(&frames, "presence:offline"), 0);
    assert_eq!(count_type(&frames, "presence:online"), 0);
    assert!(app.state.presence.status("B").is_online());
}

#[tokio::test(start_paused = true)]
async fn test_offline_broadcast_after_grace_period() {
    let app = TestApp::new();
    let (watcher, mut watcher_rx) = app.connect("A");
    lifecycle::handle_client_message(&app.state, &watcher, subscribe(&["B"])).await;

    let (conn, _rx) = app.connect("B");
    recv_type(&mut watcher_rx, "presence:online").await;

    let grace = lifecycle::disconnect(&app.state, &conn).expect("last connection");
    assert!(grace.await.unwrap());

    let offline = recv_type(&mut watcher_rx, "presence:offline").await;
    match offline.event {
        ServerEvent::PresenceOffline(e) => {
            assert_eq!(e.user_id, "B");
            assert!(e.last_active_at.is_some());
        }
        other => panic!("unexpected event {:?}", other),
    }

    let status = app.state.presence.status("B");
    assert!(!status.is_online());
    assert!(status.last_seen.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_subscriber_never_sees_presence() {
    let app = TestApp::new();
    let (stranger, mut stranger_rx) = app.connect("D");
    lifecycle::handle_client_message(&app.state, &stranger, subscribe(&["B"])).await;

    let snapshot = recv_type(&mut stranger_rx, "presence:snapshot").await;
    match snapshot.event {
        ServerEvent::PresenceSnapshot(e) => assert!(e.statuses.is_empty()),
        other => panic!("unexpected event {:?}", other),
    }

    let (conn, _rx) = app.connect("B");
    let grace = lifecycle::disconnect(&app.state, &conn).expect("last connection");
    grace.await.unwrap();

    let frames = drain(&mut stranger_rx);
    assert_eq!(count_type(&frames, "presence:online"), 0);
    assert_eq!(count_type(&frames, "presence:offline"), 0);
    assert_eq!(app.state.presence.subscriber_count("B"), 0);
}

#[tokio::test]
async fn test_presence_query_fails_closed() {
    let app = TestApp::new();
    let (_b, _rx_b) = app.connect("B");
    let (watcher, mut watcher_rx) = app.connect("A");
    app.store.set_unavailable(true);

    lifecycle::handle_client_message(
        &app.state,
        &watcher,
        ClientMessage::PresenceQuery(UserIdsPayload {
            user_ids: vec!["B".into()],
        }),
    )
    .await;

    let snapshot = recv_type(&mut watcher_rx, "presence:snapshot").await;
    match snapshot.event {
        ServerEvent::PresenceSnapshot(e) => assert!(e.statuses.is_empty()),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_presence_query_returns_authorized_statuses() {
    let app = TestApp::new();
    let (_b, _rx_b) = app.connect("B");

    let statuses = app
        .state
        .presence
        .query("A", &["B".to_string(), "C".to_string(), "D".to_string()])
        .await;

    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].user_id, "B");
    assert!(statuses[0].is_online());
    assert_eq!(statuses[1].user_id, "C");
    assert!(!statuses[1].is_online());
}
