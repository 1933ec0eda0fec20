//! WebSocket Connection Handler
//!
//! Authenticates the upgrade request, then bridges the socket to a
//! [`Connection`] for the lifetime of the session.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use super::connection::Connection;
use super::lifecycle;
use super::protocol::ClientMessage;
use crate::presentation::middleware::validate_token;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Query parameters of the upgrade request
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub token: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let user_id = validate_token(&params.token, &state.settings.jwt.secret)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let (connection, mut outbound) = Connection::new(user_id.clone());
    let connection_id = connection.id().to_string();

    // Split socket for concurrent read/write
    let (mut sender, mut receiver) = socket.split();

    // Forward envelopes from the connection to the socket
    let sender_task = tokio::spawn(async move {
        while let Some(envelope) = outbound.recv().await {
            let text = match serde_json::to_string(&envelope) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize envelope");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    lifecycle::connect(&state, &connection);
    let closed = connection.closed();
    tokio::pin!(closed);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match ClientMessage::parse(&text) {
                        Ok(message) => lifecycle::handle_client_message(&state, &connection, message).await,
                        Err(e) => {
                            tracing::debug!(
                                connection_id = %connection_id,
                                error = %e,
                                "Ignoring malformed frame"
                            );
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection_id = %connection_id, "Connection closed");
                        break;
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // Pong is handled automatically by axum
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }

            _ = &mut closed => break,
        }
    }

    lifecycle::disconnect(&state, &connection);
    sender_task.abort();

    tracing::info!(
        user_id = %user_id,
        connection_id = %connection_id,
        "User disconnected"
    );
}
