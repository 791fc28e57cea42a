//! Connection registry
//!
//! Tracks every live WebSocket connection and offers broadcast.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::protocol::Envelope;

/// Connection errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection closed")]
    Closed,
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Handle to a WebSocket connection for sending messages
///
/// Cloning is cheap; every clone feeds the same writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Connection ID, assigned at upgrade
    pub id: Uuid,
    /// Caller-supplied client id, only used for logging
    pub client_id: i64,
    /// Channel to the connection's writer task
    sender: mpsc::Sender<String>,
}

impl ConnectionHandle {
    pub fn new(client_id: i64, sender: mpsc::Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            sender,
        }
    }

    /// Queue a text frame, waiting for buffer space
    pub async fn send(&self, text: String) -> Result<(), ConnectionError> {
        self.sender
            .send(text)
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    /// Serialize and queue an envelope
    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<(), ConnectionError> {
        self.send(envelope.to_text()?).await
    }

    /// Whether the writer task is still draining this connection
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Resolves once the writer task has stopped
    pub async fn closed(&self) {
        self.sender.closed().await
    }
}

/// Manages all WebSocket connections
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection; call only after the upgrade has completed
    pub fn register(&self, handle: ConnectionHandle) {
        debug!(connection_id = %handle.id, client_id = handle.client_id, "connection registered");
        self.connections.insert(handle.id, handle);
    }

    /// Remove a connection; removing an unknown id is a no-op
    pub fn unregister(&self, connection_id: &Uuid) -> Option<ConnectionHandle> {
        let removed = self.connections.remove(connection_id).map(|(_, h)| h);
        if removed.is_some() {
            debug!(connection_id = %connection_id, "connection unregistered");
        }
        removed
    }

    /// Get a connection by ID
    pub fn get(&self, connection_id: &Uuid) -> Option<ConnectionHandle> {
        self.connections.get(connection_id).map(|h| h.value().clone())
    }

    /// Get current connection count
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Get all connection IDs
    pub fn connection_ids(&self) -> Vec<Uuid> {
        self.connections.iter().map(|e| *e.key()).collect()
    }

    /// Send `text` to every live connection
    ///
    /// Works on a snapshot so concurrent register/unregister cannot disturb
    /// iteration. Returns how many connections accepted the message.
    pub async fn broadcast_text(&self, text: &str) -> usize {
        let snapshot: Vec<ConnectionHandle> =
            self.connections.iter().map(|e| e.value().clone()).collect();

        let mut delivered = 0;
        for handle in snapshot {
            match handle.send(text.to_string()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(connection_id = %handle.id, error = %e, "broadcast skipped connection");
                }
            }
        }
        delivered
    }
}
