//! Live connection tracking

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::{GenderFilter, Role, ServerEvent};

/// Identity and capability attributes supplied by the collaborator at
/// handshake time. The core never validates these, it only carries them.
#[derive(Debug, Clone, Default)]
pub struct ConnectionAttrs {
    /// Reference into the collaborator's user-identity store
    pub external_user_id: Option<String>,

    /// Preferred counterpart gender, matching metadata only
    pub gender_filter: Option<GenderFilter>,

    /// Per-session slow mode supplied externally; accepted, never enforced
    pub slow_mode_secs: Option<u64>,
}

/// Represents a connected participant
pub struct Connection {
    /// Unique connection identifier, stable for the connection's lifetime
    id: Uuid,

    /// Declared role, immutable after the handshake
    role: Role,

    /// Collaborator-supplied attributes
    attrs: ConnectionAttrs,

    /// Display name set via identify, if any
    display_name: Option<String>,

    /// Sessions this connection currently belongs to
    member_sessions: HashSet<String>,

    /// Channel to send events to this connection
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl Connection {
    fn new(
        id: Uuid,
        role: Role,
        attrs: ConnectionAttrs,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            id,
            role,
            attrs,
            display_name: None,
            member_sessions: HashSet::new(),
            sender,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn attrs(&self) -> &ConnectionAttrs {
        &self.attrs
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn set_display_name(&mut self, name: String) {
        self.display_name = Some(name);
    }

    pub fn member_sessions(&self) -> &HashSet<String> {
        &self.member_sessions
    }

    pub fn is_member_of(&self, session_id: &str) -> bool {
        self.member_sessions.contains(session_id)
    }

    pub fn join_session(&mut self, session_id: String) {
        self.member_sessions.insert(session_id);
    }

    pub fn leave_session(&mut self, session_id: &str) {
        self.member_sessions.remove(session_id);
    }

    /// Send an event to the connection. Delivery is best-effort: a closed
    /// channel means the transport is already tearing the connection down.
    pub fn send(&self, event: ServerEvent) {
        if self.sender.send(event).is_err() {
            tracing::warn!("Failed to send event to connection {}", self.id);
        }
    }
}

/// Registry of every live connection, keyed by connection id
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<Uuid, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly handshaken connection. Role validation happens at
    /// the decode boundary; by the time a `Role` exists it is valid.
    pub fn register(
        &mut self,
        id: Uuid,
        role: Role,
        attrs: ConnectionAttrs,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> &Connection {
        self.connections
            .entry(id)
            .or_insert_with(|| Connection::new(id, role, attrs, sender))
    }

    pub fn get(&self, id: &Uuid) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.connections.contains_key(id)
    }

    /// Remove a connection. The caller must already have ended every
    /// session referencing it.
    pub fn deregister(&mut self, id: &Uuid) -> Option<Connection> {
        self.connections.remove(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
