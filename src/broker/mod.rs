//! Matchmaking and chat-relay broker
//!
//! One `Broker` owns every piece of mutable state: the connection
//! registry, the moderator load table, the search scheduler, and the
//! session table. All connection events, disconnects, and search-timer
//! fires are posted onto one queue and handled to completion one at a
//! time, so the components need no locks. Logical races only exist
//! across event boundaries: a matched moderator may have disconnected
//! since the load-table scan (handled by the staleness check), and a
//! cancellation may drain before a timer fire already queued behind it
//! (handled by the scheduler's still-wanted guard).

mod load;
mod registry;
mod relay;
mod scheduler;
mod session;

pub use load::ModeratorLoadTable;
pub use registry::{Connection, ConnectionAttrs, ConnectionRegistry};
pub use relay::{MessageRelay, RelayError};
pub use scheduler::SearchScheduler;
pub use session::{session_id_for, MatchFailure, Session, SessionManager};

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::MatchmakingConfig;
use crate::protocol::{ClientEvent, Role, ServerEvent, PROTOCOL_VERSION};

/// Broker-level errors. Every variant is handled internally as a logged
/// drop; none of them crosses back to a client as a structured error.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("role {role:?} may not send {event}")]
    Unauthorized { role: Role, event: &'static str },
}

/// A unit of work for the broker task
#[derive(Debug)]
pub enum BrokerEvent {
    /// A connection completed its handshake
    Connected {
        id: Uuid,
        role: Role,
        attrs: ConnectionAttrs,
        sender: mpsc::UnboundedSender<ServerEvent>,
    },

    /// A decoded event arrived from a connection
    Inbound { id: Uuid, event: ClientEvent },

    /// A search delay elapsed
    SearchFired { user_id: Uuid, generation: u64 },

    /// A connection's transport went away
    Disconnected { id: Uuid },
}

/// Owns all matchmaking and relay state and processes one event at a time
pub struct Broker {
    registry: ConnectionRegistry,
    loads: ModeratorLoadTable,
    scheduler: SearchScheduler,
    sessions: SessionManager,
    relay: MessageRelay,

    /// Handle the scheduler's timers use to post fires back onto the queue
    events_tx: mpsc::UnboundedSender<BrokerEvent>,
}

impl Broker {
    /// Build a broker and the queue endpoints the transport feeds.
    pub fn new(
        config: &MatchmakingConfig,
    ) -> (
        Self,
        mpsc::UnboundedSender<BrokerEvent>,
        mpsc::UnboundedReceiver<BrokerEvent>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let broker = Self {
            registry: ConnectionRegistry::new(),
            loads: ModeratorLoadTable::new(config.moderator_capacity),
            scheduler: SearchScheduler::new(
                Duration::from_millis(config.search_delay_min_ms),
                Duration::from_millis(config.search_delay_max_ms),
            ),
            sessions: SessionManager::new(),
            relay: MessageRelay::new(),
            events_tx: events_tx.clone(),
        };
        (broker, events_tx, events_rx)
    }

    /// Drain the queue until every sender is gone.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<BrokerEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        tracing::info!("Broker event loop finished");
    }

    /// Process a single event to completion. Nothing here suspends, so no
    /// other event can observe intermediate state.
    pub fn handle_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected {
                id,
                role,
                attrs,
                sender,
            } => self.handle_connected(id, role, attrs, sender),
            BrokerEvent::Inbound { id, event } => self.handle_inbound(id, event),
            BrokerEvent::SearchFired {
                user_id,
                generation,
            } => self.handle_search_fired(user_id, generation),
            BrokerEvent::Disconnected { id } => self.handle_disconnected(id),
        }
    }

    fn handle_connected(
        &mut self,
        id: Uuid,
        role: Role,
        attrs: ConnectionAttrs,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let conn = self.registry.register(id, role, attrs, sender);
        conn.send(ServerEvent::Welcome {
            connection_id: id,
            protocol_version: PROTOCOL_VERSION,
        });

        match role {
            Role::Moderator => {
                self.loads.insert(id);
                tracing::info!("Moderator {} added to matchmaking pool", id);
            }
            Role::User => {
                tracing::info!("User {} connected", id);
            }
        }
    }

    fn handle_inbound(&mut self, conn_id: Uuid, event: ClientEvent) {
        let role = match self.registry.get(&conn_id) {
            Some(conn) => conn.role(),
            None => {
                tracing::warn!("Event from unknown connection {}", conn_id);
                return;
            }
        };

        if let Err(e) = authorize(role, &event) {
            // Dropped, not errored back: a misbehaving client learns
            // nothing about role gating
            tracing::warn!("Dropped event from {}: {}", conn_id, e);
            return;
        }

        match event {
            ClientEvent::Hello { .. } => {
                tracing::warn!("Duplicate handshake from {}", conn_id);
            }

            ClientEvent::Identify {
                room_id,
                display_name,
            } => {
                if let Err(e) = self.relay.deliver_identify(
                    &conn_id,
                    &room_id,
                    display_name,
                    &mut self.registry,
                    &self.sessions,
                ) {
                    tracing::warn!("Dropped identify from {}: {}", conn_id, e);
                }
            }

            ClientEvent::Search => {
                let delay = self.scheduler.start_search(conn_id, &self.events_tx);
                tracing::info!(
                    "User {} started searching, delay {}ms",
                    conn_id,
                    delay.as_millis()
                );
                if let Some(conn) = self.registry.get(&conn_id) {
                    conn.send(ServerEvent::Searching {
                        delay_ms: delay.as_millis() as u64,
                    });
                }
            }

            ClientEvent::CancelSearch => {
                self.scheduler.cancel_search(&conn_id);
            }

            ClientEvent::Chat { room_id, payload } => {
                if let Err(e) = self.relay.deliver_chat(
                    &conn_id,
                    role,
                    &room_id,
                    payload,
                    &self.registry,
                    &self.sessions,
                ) {
                    tracing::warn!("Dropped chat from {}: {}", conn_id, e);
                }
            }

            ClientEvent::EndChat { room_id } => {
                tracing::info!("Connection {} ending room {}", conn_id, room_id);
                self.end_session_and_notify(&room_id);
            }

            ClientEvent::FriendRequest { room_id } => {
                if let Err(e) = self.relay.deliver_friend_request(
                    &conn_id,
                    &room_id,
                    &self.registry,
                    &self.sessions,
                ) {
                    tracing::warn!("Dropped friend request from {}: {}", conn_id, e);
                }
            }

            ClientEvent::FriendAccept { room_id } => {
                if let Err(e) = self.relay.deliver_friend_accept(
                    &conn_id,
                    &room_id,
                    &self.registry,
                    &self.sessions,
                ) {
                    tracing::warn!("Dropped friend accept from {}: {}", conn_id, e);
                }
            }

            ClientEvent::SendProfile { room_id, profile } => {
                if let Err(e) = self.relay.deliver_profile(
                    &conn_id,
                    &room_id,
                    profile,
                    &self.registry,
                    &self.sessions,
                ) {
                    tracing::warn!("Dropped profile sync from {}: {}", conn_id, e);
                }
            }

            ClientEvent::Typing { room_id } => {
                if let Err(e) = self.relay.deliver_typing(
                    &conn_id,
                    &room_id,
                    false,
                    &self.registry,
                    &self.sessions,
                ) {
                    tracing::debug!("Dropped typing from {}: {}", conn_id, e);
                }
            }

            ClientEvent::StopTyping { room_id } => {
                if let Err(e) = self.relay.deliver_typing(
                    &conn_id,
                    &room_id,
                    true,
                    &self.registry,
                    &self.sessions,
                ) {
                    tracing::debug!("Dropped stop-typing from {}: {}", conn_id, e);
                }
            }
        }
    }

    fn handle_search_fired(&mut self, user_id: Uuid, generation: u64) {
        // Honors cancellations and supersessions drained before this fire
        if !self.scheduler.take_fired(&user_id, generation) {
            tracing::debug!("Stale search fire for user {} ignored", user_id);
            return;
        }

        match self
            .sessions
            .attempt_match(user_id, &mut self.registry, &mut self.loads)
        {
            Ok(session) => {
                let room_id = session.id().to_string();
                let moderator_id = session.moderator_id();
                let slow_mode_secs = session.slow_mode_secs();

                let (external_user_id, gender_filter) = self
                    .registry
                    .get(&user_id)
                    .map(|c| {
                        (
                            c.attrs().external_user_id.clone(),
                            c.attrs().gender_filter,
                        )
                    })
                    .unwrap_or_default();

                if let Some(user) = self.registry.get(&user_id) {
                    user.send(ServerEvent::ChatConnected {
                        room_id: room_id.clone(),
                        slow_mode_secs,
                    });
                }
                if let Some(moderator) = self.registry.get(&moderator_id) {
                    moderator.send(ServerEvent::NewChat {
                        room_id,
                        user_id,
                        external_user_id,
                        gender_filter,
                    });
                }
            }
            Err(MatchFailure::NoModeratorAvailable) => {
                tracing::warn!("No moderator available for user {}", user_id);
                if let Some(user) = self.registry.get(&user_id) {
                    user.send(ServerEvent::NoModAvailable);
                }
            }
        }
    }

    fn handle_disconnected(&mut self, conn_id: Uuid) {
        tracing::info!("Connection {} disconnected", conn_id);

        self.scheduler.cancel_search(&conn_id);

        let ended = self
            .sessions
            .end_all_for(&conn_id, &mut self.registry, &mut self.loads);
        for (room_id, user_id, moderator_id) in ended {
            for member in [user_id, moderator_id] {
                // The disconnecting side can no longer receive anything
                if member == conn_id {
                    continue;
                }
                if let Some(conn) = self.registry.get(&member) {
                    conn.send(ServerEvent::ChatEnded {
                        room_id: room_id.clone(),
                    });
                }
            }
        }

        if let Some(conn) = self.registry.get(&conn_id) {
            if conn.role() == Role::Moderator {
                self.loads.remove(&conn_id);
            }
        }
        self.registry.deregister(&conn_id);
    }

    /// End a session and notify every member still connected. Idempotent:
    /// a second end of the same room does nothing.
    fn end_session_and_notify(&mut self, room_id: &str) {
        if let Some((user_id, moderator_id)) =
            self.sessions
                .end_session(room_id, &mut self.registry, &mut self.loads)
        {
            for member in [user_id, moderator_id] {
                if let Some(conn) = self.registry.get(&member) {
                    conn.send(ServerEvent::ChatEnded {
                        room_id: room_id.to_string(),
                    });
                }
            }
        }
    }

    // Component views, used by the invariant tests

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn loads(&self) -> &ModeratorLoadTable {
        &self.loads
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn scheduler(&self) -> &SearchScheduler {
        &self.scheduler
    }
}

/// Single authorization check performed when dispatching each inbound
/// event. Role-restricted events from the wrong role produce a typed
/// `Unauthorized` outcome which the broker logs and drops.
fn authorize(role: Role, event: &ClientEvent) -> Result<(), BrokerError> {
    match event {
        ClientEvent::Search if role != Role::User => Err(BrokerError::Unauthorized {
            role,
            event: "search",
        }),
        ClientEvent::SendProfile { .. } if role != Role::Moderator => {
            Err(BrokerError::Unauthorized {
                role,
                event: "profile sync",
            })
        }
        _ => Ok(()),
    }
}
