//! Outbound fan-out over per-connection WebSocket writer channels.

use axum::extract::ws::Message;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::state::registry::{ConnectionId, ConnectionRegistry};

/// Sender half feeding a connection's writer task.
pub type OutboundSender = mpsc::UnboundedSender<Message>;

/// The only component allowed to push events to clients.
///
/// Payloads are serialized once per emit and forwarded untouched. Connections whose writer
/// task is gone are detached on the next emit that reaches them.
#[derive(Default)]
pub struct BroadcastGateway {
    connections: DashMap<ConnectionId, OutboundSender>,
}

impl BroadcastGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the writer channel of a freshly accepted connection.
    pub fn attach(&self, id: ConnectionId, tx: OutboundSender) {
        self.connections.insert(id, tx);
    }

    pub fn detach(&self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    /// Number of attached transport connections, joined or not.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Send `event` to every attached connection.
    pub fn emit_to_all<T>(&self, event: &T)
    where
        T: ?Sized + Serialize,
    {
        let Some(payload) = serialize(event) else {
            return;
        };

        let mut closed = Vec::new();
        for entry in self.connections.iter() {
            if entry.value().send(Message::Text(payload.clone().into())).is_err() {
                closed.push(*entry.key());
            }
        }
        self.prune(closed);
    }

    /// Send `event` to a single connection.
    pub fn emit_to_one<T>(&self, id: ConnectionId, event: &T)
    where
        T: ?Sized + Serialize,
    {
        let Some(payload) = serialize(event) else {
            return;
        };
        self.send_text(id, payload);
    }

    /// Send `event` to every connection that joined as a teacher.
    pub fn emit_to_teachers<T>(&self, registry: &ConnectionRegistry, event: &T)
    where
        T: ?Sized + Serialize,
    {
        let teachers = registry.teacher_ids();
        if teachers.is_empty() {
            return;
        }

        let Some(payload) = serialize(event) else {
            return;
        };
        for id in teachers {
            self.send_text(id, payload.clone());
        }
    }

    /// Ask the writer task of `id` to close the socket.
    pub fn terminate(&self, id: ConnectionId) {
        let Some(tx) = self.connections.get(&id).map(|entry| entry.value().clone()) else {
            return;
        };
        if tx.send(Message::Close(None)).is_err() {
            debug!(connection = %id, "connection already closed before termination");
        }
    }

    fn send_text(&self, id: ConnectionId, payload: String) {
        let Some(tx) = self.connections.get(&id).map(|entry| entry.value().clone()) else {
            debug!(connection = %id, "dropping event for unknown connection");
            return;
        };

        if tx.send(Message::Text(payload.into())).is_err() {
            self.prune(vec![id]);
        }
    }

    fn prune(&self, closed: Vec<ConnectionId>) {
        for id in closed {
            debug!(connection = %id, "detaching closed connection");
            self.connections.remove(&id);
        }
    }
}

fn serialize<T>(event: &T) -> Option<String>
where
    T: ?Sized + Serialize,
{
    match serde_json::to_string(event) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound event");
            None
        }
    }
}
