//! Connection lifecycle and inbound frame dispatch.
//!
//! Transport-independent: the socket handler and the integration tests drive
//! the same functions with a [`Connection`].

use tokio::task::JoinHandle;

use super::connection::Connection;
use super::protocol::ClientMessage;
use crate::domain::{Envelope, PresenceSnapshotEvent, ServerEvent};
use crate::startup::AppState;

/// Register an authenticated connection.
pub fn connect(state: &AppState, connection: &Connection) {
    let user_id = connection.user_id();
    state.registry.add_connection(connection.clone());
    state.presence.handle_connect(user_id);
    state.notifications.push_unread_count(user_id);
}

/// Tear down a connection.
///
/// Returns the grace-period task when this was the user's last connection.
pub fn disconnect(state: &AppState, connection: &Connection) -> Option<JoinHandle<bool>> {
    let user_id = connection.user_id();
    connection.close();
    state.presence.unsubscribe_connection(connection.id());

    if !state.registry.remove_connection(user_id, connection.id()) {
        return None;
    }
    state.deferral.clear_route(user_id);
    Some(state.presence.handle_disconnect(user_id))
}

/// Apply one inbound frame from `connection`.
pub async fn handle_client_message(state: &AppState, connection: &Connection, message: ClientMessage) {
    let user_id = connection.user_id();
    state.presence.record_activity(user_id);
    tracing::trace!(user_id = %user_id, kind = message.kind(), "Client frame");

    match message {
        ClientMessage::Heartbeat => {}

        ClientMessage::RouteUpdate(payload) => {
            state.deferral.set_route(user_id, &payload.route);
        }

        ClientMessage::PresenceSubscribe(payload) => {
            state.presence.subscribe(connection, &payload.user_ids).await;
        }

        ClientMessage::PresenceUnsubscribe(payload) => {
            state.presence.unsubscribe(connection.id(), &payload.user_ids);
        }

        ClientMessage::PresenceQuery(payload) => {
            let statuses = state.presence.query(user_id, &payload.user_ids).await;
            connection.send(Envelope::new(ServerEvent::PresenceSnapshot(
                PresenceSnapshotEvent { statuses },
            )));
        }

        ClientMessage::ConversationJoin(payload) => {
            state
                .registry
                .set_active_conversation(user_id, &payload.conversation_id);
        }

        ClientMessage::ConversationLeave => {
            state.registry.clear_active_conversation(user_id);
        }

        ClientMessage::MarkRead(payload) => {
            state.notifications.mark_as_read(user_id, payload.ids.as_deref());
        }

        ClientMessage::EventAck(payload) => {
            if !state.deferral.acknowledge(user_id, &payload.event_id) {
                tracing::debug!(
                    user_id = %user_id,
                    event_id = %payload.event_id,
                    "Acknowledgment for unknown event"
                );
            }
        }
    }
}
