//! Event types for the matchline protocol

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role a participant declares at handshake time. Immutable for the
/// lifetime of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Moderator,
}

/// Preferred counterpart gender, carried as matching metadata only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderFilter {
    Male,
    Female,
    Random,
}

/// Currencies accepted for gift payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Inr,
}

/// Chat payload kinds. Decoded once at the boundary; handlers match
/// exhaustively so new kinds cannot silently fall through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatPayload {
    /// Plain text message
    Text { content: String },

    /// Reference to an externally hosted image, optionally gated behind
    /// an unlock price (enforced by the collaborator, not here)
    Image {
        image_id: String,
        unlock_price: Option<u32>,
    },

    /// Monetary gift; amount must be positive
    Gift {
        amount: u32,
        currency: Currency,
        gift_id: Option<String>,
    },
}

impl ChatPayload {
    /// A payload with nothing to deliver (empty text/image content,
    /// zero gift amount) is rejected by the relay.
    pub fn is_empty(&self) -> bool {
        match self {
            ChatPayload::Text { content } => content.is_empty(),
            ChatPayload::Image { image_id, .. } => image_id.is_empty(),
            ChatPayload::Gift { amount, .. } => *amount == 0,
        }
    }

    pub fn is_gift(&self) -> bool {
        matches!(self, ChatPayload::Gift { .. })
    }
}

/// Profile snapshot a moderator pushes into a room. The fields mirror
/// what the identity collaborator exposes; the relay treats it as opaque.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
}

/// A delivered chat message, stamped by the server with a monotonic id
/// and the sender's role so both ends render the same canonical list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Server-assigned, time-derived, strictly increasing
    pub id: u64,

    /// Role of the originating connection
    pub sender: Role,

    /// Session the message is scoped to
    pub room_id: String,

    /// Kind-specific payload
    pub payload: ChatPayload,
}

/// Events sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Handshake; must be the first frame on a connection
    Hello {
        protocol_version: u32,
        role: Role,
        external_user_id: Option<String>,
        gender_filter: Option<GenderFilter>,
        slow_mode_secs: Option<u64>,
    },

    /// Associate a display name with an active room membership
    Identify {
        room_id: String,
        display_name: String,
    },

    /// Start (or reset) a matchmaking search (USER only)
    Search,

    /// Cancel a pending search
    CancelSearch,

    /// Send a chat payload to a room
    Chat {
        room_id: String,
        payload: ChatPayload,
    },

    /// End the named session ("next")
    EndChat { room_id: String },

    /// Ask the room peer to become a friend
    FriendRequest { room_id: String },

    /// Accept a previously relayed friend request
    FriendAccept { room_id: String },

    /// Push a user profile snapshot into the room (MODERATOR only)
    SendProfile {
        room_id: String,
        profile: UserProfile,
    },

    /// Typing indicator, relayed to the peer only
    Typing { room_id: String },

    /// End-of-typing indicator, relayed to the peer only
    StopTyping { room_id: String },
}

/// Events sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// Handshake accepted
    Welcome {
        connection_id: Uuid,
        protocol_version: u32,
    },

    /// A search was scheduled; the delay is advisory UI feedback
    Searching { delay_ms: u64 },

    /// Session created, user side
    ChatConnected {
        room_id: String,
        slow_mode_secs: Option<u64>,
    },

    /// Session created, moderator side
    NewChat {
        room_id: String,
        user_id: Uuid,
        external_user_id: Option<String>,
        gender_filter: Option<GenderFilter>,
    },

    /// Delivered text/image message
    ChatMessage(Envelope),

    /// Delivered gift
    ChatGift(Envelope),

    /// Session terminated
    ChatEnded { room_id: String },

    /// Matchmaking attempt failed; no retry is scheduled
    NoModAvailable,

    /// Peer identified itself with a display name
    Identified {
        room_id: String,
        display_name: String,
    },

    /// Peer asked to become a friend
    FriendRequestReceived { room_id: String },

    /// Friend request accepted, delivered to both members
    FriendAccepted { room_id: String },

    /// Moderator-pushed profile snapshot
    UserProfile {
        room_id: String,
        profile: UserProfile,
    },

    /// Peer is typing
    Typing { room_id: String },

    /// Peer stopped typing
    StopTyping { room_id: String },
}
