//! Push connection handle.
//!
//! Wraps the transport's outbound channel together with a cancellation token
//! that is cancelled when the socket closes. Background loops targeting a
//! connection (paced replay) check [`Connection::is_live`] before every send.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use uuid::Uuid;

use crate::domain::Envelope;

/// Live push channel to one client instance.
#[derive(Debug, Clone)]
pub struct Connection {
    id: String,
    user_id: String,
    sender: mpsc::UnboundedSender<Envelope>,
    closed: CancellationToken,
    connected_at: DateTime<Utc>,
}

impl Connection {
    /// Create a connection for `user_id`. The receiver feeds the socket writer.
    pub fn new(user_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection = Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            sender,
            closed: CancellationToken::new(),
            connected_at: Utc::now(),
        };
        (connection, receiver)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Open and with a reader still attached.
    pub fn is_live(&self) -> bool {
        !self.closed.is_cancelled() && !self.sender.is_closed()
    }

    /// Push an envelope. Returns `false` if the connection is gone.
    pub fn send(&self, envelope: Envelope) -> bool {
        if !self.is_live() {
            return false;
        }
        self.sender.send(envelope).is_ok()
    }

    /// Mark the connection closed; idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Resolves once [`Connection::close`] has been called.
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.closed.clone().cancelled_owned()
    }
}
