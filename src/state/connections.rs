//! Live WebSocket connections and their binding to participant names.
//!
//! The registry belongs to the transport layer: it maps connections to names and
//! never holds domain data. Only the coordinator binds and unbinds, so a name is
//! bound to at most one connection at a time.

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::GameError;

/// Identifier of a WebSocket connection.
pub type ConnectionId = Uuid;

/// Close code sent to a connection whose seat was taken over.
pub const CLOSE_SESSION_REPLACED: u16 = 4001;
/// Close code sent when the server refuses a connection over capacity.
pub const CLOSE_CONNECTION_LIMIT: u16 = 1013;

/// Frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// JSON text frame.
    Text(String),
    /// Close frame; the writer stops after sending it.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Short reason text.
        reason: String,
    },
}

/// Registry of open connections keyed by [`ConnectionId`].
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, mpsc::Sender<Outbound>>,
    bindings: DashMap<String, ConnectionId>,
    owners: DashMap<ConnectionId, String>,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Empty registry accepting at most `max_connections` sockets.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            bindings: DashMap::new(),
            owners: DashMap::new(),
            max_connections,
        }
    }

    /// Track a new connection.
    pub fn register(&self, tx: mpsc::Sender<Outbound>) -> Result<ConnectionId, GameError> {
        if self.connections.len() >= self.max_connections {
            return Err(GameError::ConnectionLimit);
        }
        let id = Uuid::new_v4();
        self.connections.insert(id, tx);
        Ok(id)
    }

    /// Forget a connection. Returns the participant it was bound to, if it still was.
    pub fn unregister(&self, id: ConnectionId) -> Option<String> {
        self.connections.remove(&id);
        let (_, name) = self.owners.remove(&id)?;
        self.bindings.remove_if(&name, |_, bound| *bound == id);
        Some(name)
    }

    /// Bind `name` to `id`, returning the connection previously bound to that name.
    pub fn bind(&self, name: &str, id: ConnectionId) -> Option<ConnectionId> {
        let previous = self.bindings.insert(name.to_owned(), id);
        if let Some(previous) = previous.filter(|previous| *previous != id) {
            self.owners.remove(&previous);
            self.owners.insert(id, name.to_owned());
            return Some(previous);
        }
        self.owners.insert(id, name.to_owned());
        None
    }

    /// Drop the binding of `name`, returning the connection it pointed at.
    pub fn unbind(&self, name: &str) -> Option<ConnectionId> {
        let (_, id) = self.bindings.remove(name)?;
        self.owners.remove(&id);
        Some(id)
    }

    /// Participant bound to `id`.
    pub fn participant_of(&self, id: ConnectionId) -> Option<String> {
        self.owners.get(&id).map(|entry| entry.value().clone())
    }

    /// Connection bound to `name`.
    pub fn connection_of(&self, name: &str) -> Option<ConnectionId> {
        self.bindings.get(name).map(|entry| *entry.value())
    }

    /// Queue a frame without waiting. A full or closed queue only loses this frame.
    pub fn send(&self, id: ConnectionId, frame: Outbound) -> bool {
        let Some(tx) = self.connections.get(&id).map(|entry| entry.value().clone()) else {
            debug!(connection = %id, "send to unknown connection dropped");
            return false;
        };
        match tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection = %id, "outbound queue full; frame dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection = %id, "outbound queue closed; frame dropped");
                false
            }
        }
    }

    /// Queue a frame for whichever connection `name` is bound to.
    pub fn send_to(&self, name: &str, frame: Outbound) -> bool {
        match self.connection_of(name) {
            Some(id) => self.send(id, frame),
            None => false,
        }
    }

    /// Ask a connection to close and forget whatever it was bound to.
    pub fn close(&self, id: ConnectionId, code: u16, reason: &str) {
        if let Some((_, name)) = self.owners.remove(&id) {
            self.bindings.remove_if(&name, |_, bound| *bound == id);
        }
        self.send(
            id,
            Outbound::Close {
                code,
                reason: reason.to_owned(),
            },
        );
    }

    /// Names with a bound connection.
    pub fn bound_names(&self) -> Vec<String> {
        self.bindings
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is open.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
