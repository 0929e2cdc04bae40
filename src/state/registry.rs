//! Live connection bookkeeping: roles, display names and the student roster.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Identifier assigned by the transport to each WebSocket connection.
pub type ConnectionId = Uuid;

/// Role a connection declared when joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Drives the session: creates, advances and ends polls.
    Teacher,
    /// Answers polls.
    Student,
}

/// Registered identity of a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEntry {
    pub id: ConnectionId,
    pub role: Role,
    /// Self-asserted display name; only students are tracked by name.
    pub name: Option<String>,
    /// Monotonic join order, used to find the most recent connection for a name.
    pub joined_seq: u64,
}

/// Result of a [`ConnectionRegistry::join`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Entry now bound to the connection.
    pub entry: ConnectionEntry,
    /// Identity the connection held before, when it re-joined as someone else.
    pub replaced: Option<ConnectionEntry>,
    /// False when the connection re-sent an identical join.
    pub changed: bool,
}

/// Aggregate connection counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStats {
    pub connected_students: usize,
    pub connected_teachers: usize,
    pub response_count: usize,
}

/// Connection id to identity map plus a de-duplicated roster of student names.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: IndexMap<ConnectionId, ConnectionEntry>,
    roster: Vec<String>,
    next_seq: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `id` to a role and optional name.
    ///
    /// Joining again with the same identity is a no-op; joining with a different identity
    /// replaces the previous entry.
    pub fn join(&mut self, id: ConnectionId, role: Role, name: Option<String>) -> JoinOutcome {
        let name = name
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty() && role == Role::Student);

        if let Some(existing) = self.entries.get(&id)
            && existing.role == role
            && existing.name == name
        {
            return JoinOutcome {
                entry: existing.clone(),
                replaced: None,
                changed: false,
            };
        }

        let replaced = self.disconnect(id);

        self.next_seq += 1;
        let entry = ConnectionEntry {
            id,
            role,
            name: name.clone(),
            joined_seq: self.next_seq,
        };
        self.entries.insert(id, entry.clone());

        if let Some(name) = name
            && !self.roster.contains(&name)
        {
            self.roster.push(name);
        }

        JoinOutcome {
            entry,
            replaced,
            changed: true,
        }
    }

    /// Forget `id`, returning the departed entry if the connection had joined.
    ///
    /// A student's name leaves the roster only once no other live connection holds it.
    pub fn disconnect(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        let entry = self.entries.shift_remove(&id)?;

        if let Some(name) = entry.name.as_deref()
            && !self.is_name_bound(name)
        {
            self.roster.retain(|rostered| rostered != name);
        }

        Some(entry)
    }

    /// Remove `name` from the roster and return the connections bound to it, most recent first.
    ///
    /// The returned connections are unregistered; the caller is expected to close them.
    pub fn kick(&mut self, name: &str) -> Vec<ConnectionId> {
        self.roster.retain(|rostered| rostered != name);

        let mut bound: Vec<ConnectionEntry> = self
            .entries
            .values()
            .filter(|entry| entry.role == Role::Student && entry.name.as_deref() == Some(name))
            .cloned()
            .collect();
        bound.sort_by(|a, b| b.joined_seq.cmp(&a.joined_seq));

        for entry in &bound {
            self.entries.shift_remove(&entry.id);
        }

        bound.into_iter().map(|entry| entry.id).collect()
    }

    /// Current counters, with `response_count` supplied by the session.
    pub fn stats(&self, response_count: usize) -> ConnectionStats {
        ConnectionStats {
            connected_students: self.count(Role::Student),
            connected_teachers: self.count(Role::Teacher),
            response_count,
        }
    }

    pub fn role(&self, id: ConnectionId) -> Option<Role> {
        self.entries.get(&id).map(|entry| entry.role)
    }

    pub fn is_teacher(&self, id: ConnectionId) -> bool {
        self.role(id) == Some(Role::Teacher)
    }

    /// Connections that joined as teachers, in join order.
    pub fn teacher_ids(&self) -> Vec<ConnectionId> {
        self.entries
            .values()
            .filter(|entry| entry.role == Role::Teacher)
            .map(|entry| entry.id)
            .collect()
    }

    /// Student names in first-join order.
    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    /// Number of joined connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn count(&self, role: Role) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.role == role)
            .count()
    }

    fn is_name_bound(&self, name: &str) -> bool {
        self.entries
            .values()
            .any(|entry| entry.name.as_deref() == Some(name))
    }
}
