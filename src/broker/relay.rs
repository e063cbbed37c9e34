//! Message validation and fan-out

use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{ChatPayload, Envelope, Role, ServerEvent, UserProfile};

use super::registry::ConnectionRegistry;
use super::session::SessionManager;

/// Why an inbound room event was dropped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("payload is empty")]
    EmptyPayload,

    #[error("room '{0}' is not an active session")]
    UnknownRoom(String),

    #[error("sender is not a member of room '{0}'")]
    NotAMember(String),
}

/// Fans chat traffic out to the members of a session. Sessions are plain
/// pairs, so a room broadcast is two direct sends.
pub struct MessageRelay {
    /// Last assigned envelope id; ids are time-derived and forced to be
    /// strictly increasing across a server's lifetime
    last_envelope_id: u64,
}

impl MessageRelay {
    pub fn new() -> Self {
        Self {
            last_envelope_id: 0,
        }
    }

    fn next_envelope_id(&mut self) -> u64 {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.last_envelope_id = now.max(self.last_envelope_id + 1);
        self.last_envelope_id
    }

    /// Look up the active session for a room and check the sender belongs
    /// to it.
    fn resolve<'a>(
        sessions: &'a SessionManager,
        sender_id: &Uuid,
        room_id: &str,
    ) -> Result<&'a super::session::Session, RelayError> {
        let session = sessions
            .get_active(room_id)
            .ok_or_else(|| RelayError::UnknownRoom(room_id.to_string()))?;
        if session.peer_of(sender_id).is_none() {
            return Err(RelayError::NotAMember(room_id.to_string()));
        }
        Ok(session)
    }

    fn send_to(registry: &ConnectionRegistry, conn_id: &Uuid, event: ServerEvent) {
        if let Some(conn) = registry.get(conn_id) {
            conn.send(event);
        }
    }

    /// Validate and deliver a chat payload to both members of the room,
    /// sender included, stamped with a server-assigned id and the sender's
    /// role. Gifts go out as a distinct event so clients can render them
    /// apart from ordinary messages.
    pub fn deliver_chat(
        &mut self,
        sender_id: &Uuid,
        sender_role: Role,
        room_id: &str,
        payload: ChatPayload,
        registry: &ConnectionRegistry,
        sessions: &SessionManager,
    ) -> Result<(), RelayError> {
        if payload.is_empty() {
            return Err(RelayError::EmptyPayload);
        }
        let session = Self::resolve(sessions, sender_id, room_id)?;

        let envelope = Envelope {
            id: self.next_envelope_id(),
            sender: sender_role,
            room_id: room_id.to_string(),
            payload,
        };
        let event = if envelope.payload.is_gift() {
            ServerEvent::ChatGift(envelope)
        } else {
            ServerEvent::ChatMessage(envelope)
        };

        for member in session.members() {
            Self::send_to(registry, &member, event.clone());
        }
        Ok(())
    }

    /// Record a display name against an active membership and forward it
    /// to the other member.
    pub fn deliver_identify(
        &self,
        sender_id: &Uuid,
        room_id: &str,
        display_name: String,
        registry: &mut ConnectionRegistry,
        sessions: &SessionManager,
    ) -> Result<(), RelayError> {
        if display_name.is_empty() {
            return Err(RelayError::EmptyPayload);
        }
        let session = Self::resolve(sessions, sender_id, room_id)?;
        let peer = session
            .peer_of(sender_id)
            .ok_or_else(|| RelayError::NotAMember(room_id.to_string()))?;

        if let Some(conn) = registry.get_mut(sender_id) {
            conn.set_display_name(display_name.clone());
        }
        Self::send_to(
            registry,
            &peer,
            ServerEvent::Identified {
                room_id: room_id.to_string(),
                display_name,
            },
        );
        Ok(())
    }

    /// Friend requests go to the peer only; the sender already knows.
    pub fn deliver_friend_request(
        &self,
        sender_id: &Uuid,
        room_id: &str,
        registry: &ConnectionRegistry,
        sessions: &SessionManager,
    ) -> Result<(), RelayError> {
        let session = Self::resolve(sessions, sender_id, room_id)?;
        let peer = session
            .peer_of(sender_id)
            .ok_or_else(|| RelayError::NotAMember(room_id.to_string()))?;
        Self::send_to(
            registry,
            &peer,
            ServerEvent::FriendRequestReceived {
                room_id: room_id.to_string(),
            },
        );
        Ok(())
    }

    /// Acceptance is broadcast to both members so both UIs settle on the
    /// same state.
    pub fn deliver_friend_accept(
        &self,
        sender_id: &Uuid,
        room_id: &str,
        registry: &ConnectionRegistry,
        sessions: &SessionManager,
    ) -> Result<(), RelayError> {
        let session = Self::resolve(sessions, sender_id, room_id)?;
        for member in session.members() {
            Self::send_to(
                registry,
                &member,
                ServerEvent::FriendAccepted {
                    room_id: room_id.to_string(),
                },
            );
        }
        Ok(())
    }

    /// Moderator-initiated profile sync, broadcast to both members. The
    /// caller performs the role check; a non-moderator attempt never
    /// reaches this method.
    pub fn deliver_profile(
        &self,
        sender_id: &Uuid,
        room_id: &str,
        profile: UserProfile,
        registry: &ConnectionRegistry,
        sessions: &SessionManager,
    ) -> Result<(), RelayError> {
        let session = Self::resolve(sessions, sender_id, room_id)?;
        for member in session.members() {
            Self::send_to(
                registry,
                &member,
                ServerEvent::UserProfile {
                    room_id: room_id.to_string(),
                    profile: profile.clone(),
                },
            );
        }
        Ok(())
    }

    /// Typing indicators reach the peer only and carry no ordering or
    /// durability guarantees.
    pub fn deliver_typing(
        &self,
        sender_id: &Uuid,
        room_id: &str,
        stopped: bool,
        registry: &ConnectionRegistry,
        sessions: &SessionManager,
    ) -> Result<(), RelayError> {
        let session = Self::resolve(sessions, sender_id, room_id)?;
        let peer = session
            .peer_of(sender_id)
            .ok_or_else(|| RelayError::NotAMember(room_id.to_string()))?;
        let event = if stopped {
            ServerEvent::StopTyping {
                room_id: room_id.to_string(),
            }
        } else {
            ServerEvent::Typing {
                room_id: room_id.to_string(),
            }
        };
        Self::send_to(registry, &peer, event);
        Ok(())
    }
}

impl Default for MessageRelay {
    fn default() -> Self {
        Self::new()
    }
}
