//! Session lifecycle management

use std::collections::HashMap;

use thiserror::Error;
use uuid::Uuid;

use super::load::ModeratorLoadTable;
use super::registry::ConnectionRegistry;

/// Why a matchmaking attempt produced no session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MatchFailure {
    /// No moderator under capacity, or the chosen candidate turned out to
    /// be stale. Either way the attempt is over; the user must re-request.
    #[error("no moderator available")]
    NoModeratorAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Ended,
}

/// The pairing of one user and one moderator connection
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    user_id: Uuid,
    moderator_id: Uuid,
    slow_mode_secs: Option<u64>,
    state: SessionState,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn moderator_id(&self) -> Uuid {
        self.moderator_id
    }

    pub fn slow_mode_secs(&self) -> Option<u64> {
        self.slow_mode_secs
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Both members of the pair
    pub fn members(&self) -> [Uuid; 2] {
        [self.user_id, self.moderator_id]
    }

    /// The other member of the pair, if `conn_id` is a member at all
    pub fn peer_of(&self, conn_id: &Uuid) -> Option<Uuid> {
        if *conn_id == self.user_id {
            Some(self.moderator_id)
        } else if *conn_id == self.moderator_id {
            Some(self.user_id)
        } else {
            None
        }
    }
}

/// Derive the session id from the pair, so a pairing attempt's id is
/// reproducible from its members.
pub fn session_id_for(user_id: &Uuid, moderator_id: &Uuid) -> String {
    format!("chat_{}_{}", user_id, moderator_id)
}

/// Owns every session and is the only component that moves moderator
/// load back down.
#[derive(Default)]
pub struct SessionManager {
    sessions: HashMap<String, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// A session id resolves for message delivery only while ACTIVE.
    pub fn get_active(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id).filter(|s| s.is_active())
    }

    /// Count of active sessions assigned to a moderator. The load table
    /// must agree with this number between any two processed events.
    pub fn active_count_for(&self, moderator_id: &Uuid) -> usize {
        self.sessions
            .values()
            .filter(|s| s.is_active() && s.moderator_id == *moderator_id)
            .count()
    }

    /// Resolve a fired search into a session.
    ///
    /// Picks the least-loaded moderator under capacity. If the candidate's
    /// connection vanished between the table scan and now, the stale entry
    /// is purged and the whole attempt fails; no second candidate is tried.
    /// On success the session, both memberships, and the load increment are
    /// all applied before returning, so no other event can observe a
    /// partially created session.
    pub fn attempt_match(
        &mut self,
        user_id: Uuid,
        registry: &mut ConnectionRegistry,
        loads: &mut ModeratorLoadTable,
    ) -> Result<&Session, MatchFailure> {
        let moderator_id = loads
            .least_loaded_available()
            .ok_or(MatchFailure::NoModeratorAvailable)?;

        if !registry.contains(&moderator_id) {
            tracing::warn!(
                "Moderator {} present in load table but no longer connected; purging",
                moderator_id
            );
            loads.remove(&moderator_id);
            return Err(MatchFailure::NoModeratorAvailable);
        }

        let session_id = session_id_for(&user_id, &moderator_id);
        let slow_mode_secs = registry
            .get(&user_id)
            .and_then(|c| c.attrs().slow_mode_secs);

        if let Some(user) = registry.get_mut(&user_id) {
            user.join_session(session_id.clone());
        }
        if let Some(moderator) = registry.get_mut(&moderator_id) {
            moderator.join_session(session_id.clone());
        }
        loads.increment(&moderator_id);

        let session = Session {
            id: session_id.clone(),
            user_id,
            moderator_id,
            slow_mode_secs,
            state: SessionState::Active,
        };

        tracing::info!("Session created: {}", session_id);
        Ok(self.sessions.entry(session_id).or_insert(session))
    }

    /// End a session. Idempotent: an unknown id (already ended, or never
    /// existed) is a logged no-op. Returns the member pair so the caller
    /// can notify both sides exactly once.
    pub fn end_session(
        &mut self,
        session_id: &str,
        registry: &mut ConnectionRegistry,
        loads: &mut ModeratorLoadTable,
    ) -> Option<(Uuid, Uuid)> {
        let mut session = match self.sessions.remove(session_id) {
            Some(session) => session,
            None => {
                tracing::warn!("End requested for unknown session {}", session_id);
                return None;
            }
        };
        session.state = SessionState::Ended;

        for member in session.members() {
            if let Some(conn) = registry.get_mut(&member) {
                conn.leave_session(session_id);
            }
        }
        loads.decrement(&session.moderator_id);

        tracing::info!("Session ended: {}", session_id);
        Some((session.user_id, session.moderator_id))
    }

    /// End every session a connection belongs to, used on disconnect.
    /// Iterates a snapshot of the membership set so the cascade never
    /// mutates the collection it is walking. Returns (session id, user,
    /// moderator) for each session actually ended.
    pub fn end_all_for(
        &mut self,
        conn_id: &Uuid,
        registry: &mut ConnectionRegistry,
        loads: &mut ModeratorLoadTable,
    ) -> Vec<(String, Uuid, Uuid)> {
        let member_sessions: Vec<String> = registry
            .get(conn_id)
            .map(|c| c.member_sessions().iter().cloned().collect())
            .unwrap_or_default();

        let mut ended = Vec::new();
        for session_id in member_sessions {
            if let Some((user_id, moderator_id)) =
                self.end_session(&session_id, registry, loads)
            {
                ended.push((session_id, user_id, moderator_id));
            }
        }
        ended
    }

    pub fn active_len(&self) -> usize {
        self.sessions.values().filter(|s| s.is_active()).count()
    }
}
