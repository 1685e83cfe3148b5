//! Session registry: which sessions are live and which player each controls.

use super::session::{Session, SessionId, SessionState};
use crate::entity::EntityId;
use crate::world::WorldStore;
use bytes::Bytes;
use protocol::{PlayerState, ServerMessage};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tracing::{debug, info, warn};

/// Why a session is being removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The transport closed the connection.
    Disconnected,
    /// The session could not keep up with fan-out.
    Unresponsive,
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub session_id: SessionId,
    pub player: PlayerState,
    /// Whether INIT reached the session's outbound buffer.
    pub init_delivered: bool,
}

/// Registration settings.
#[derive(Debug, Clone, Copy)]
pub struct RegisterOptions {
    pub init_timeout: Duration,
    pub max_name_length: usize,
}

/// Live sessions, keyed by id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub(crate) fn insert(&mut self, session: Session) {
        self.sessions.insert(session.id(), session);
    }

    /// Admit a session, create its player and hand it the initial state.
    ///
    /// Returns `None` when the session is already bound to a player.
    pub async fn register(
        &mut self,
        mut session: Session,
        world: &WorldStore,
        options: RegisterOptions,
    ) -> Option<Registration> {
        if session.player_id().is_some() || self.contains(session.id()) {
            debug!("Session {} is already registered", session.id());
            return None;
        }

        let name = display_name(session.name(), session.id(), options.max_name_length);
        let (player_id, player, state) = {
            let mut world = world.write().await;
            let player_id = world.add_player(name);
            let player = world.player(player_id).map(|p| p.to_state())?;
            (player_id, player, world.snapshot())
        };
        session.bind(player_id);
        session.set_state(SessionState::Registered);
        info!(
            "Session {} registered as player {} ({})",
            session.id(),
            player_id,
            player.name
        );

        let init = ServerMessage::Init {
            player_id: player_id.to_string(),
            state,
        };
        let init_delivered = match init.encode() {
            Ok(payload) => deliver_initial(&session, payload, options.init_timeout).await,
            Err(e) => {
                warn!("Failed to serialize INIT for session {}: {}", session.id(), e);
                false
            }
        };
        if init_delivered {
            session.set_state(SessionState::Active);
        } else {
            warn!("Initial state for session {} was dropped", session.id());
        }

        let session_id = session.id();
        self.insert(session);
        Some(Registration {
            session_id,
            player,
            init_delivered,
        })
    }

    /// Remove a session and its player.
    ///
    /// Returns the id of the player that was actually removed from the world.
    /// Unknown sessions, sessions without a player and players that are
    /// already gone (eaten) all yield `None`.
    pub async fn unregister(
        &mut self,
        id: SessionId,
        world: &WorldStore,
        departure: Departure,
    ) -> Option<EntityId> {
        let mut session = self.sessions.remove(&id)?;
        session.set_state(match departure {
            Departure::Disconnected => SessionState::Disconnected,
            Departure::Unresponsive => SessionState::Unresponsive,
        });
        debug!("Session {} is {:?}", id, session.state());

        let removed = match session.player_id() {
            Some(player_id) => world
                .write()
                .await
                .remove_player(player_id)
                .map(|_| player_id),
            None => None,
        };

        session.set_state(SessionState::Terminated);
        // Dropping the session closes its outbound buffer.
        drop(session);
        info!("Session {} terminated ({:?})", id, departure);
        removed
    }
}

/// Enqueue INIT for a freshly registered session.
///
/// Waits up to `timeout` for room. If the buffer is still full, the oldest
/// queued payload is discarded and INIT takes its place.
async fn deliver_initial(session: &Session, payload: Bytes, timeout: Duration) -> bool {
    let payload = match session.try_deliver(payload) {
        Ok(()) => return true,
        Err(TrySendError::Closed(_)) => return false,
        Err(TrySendError::Full(payload)) => payload,
    };

    match session.outbound().send_timeout(payload, timeout).await {
        Ok(()) => true,
        Err(SendTimeoutError::Closed(_)) => false,
        Err(SendTimeoutError::Timeout(payload)) => {
            warn!(
                "INIT delivery to session {} timed out, retrying once",
                session.id()
            );
            if let Some(stale) = session.drain_one() {
                debug!(
                    "Discarded {} queued bytes for session {}",
                    stale.len(),
                    session.id()
                );
            }
            session.try_deliver(payload).is_ok()
        }
    }
}

/// Trim and truncate a requested name; fall back to `Player <session>`.
pub fn display_name(requested: &str, session: SessionId, max_len: usize) -> String {
    let name: String = requested.trim().chars().take(max_len).collect();
    let name = name.trim_end();
    if name.is_empty() {
        format!("Player {}", session)
    } else {
        name.to_string()
    }
}
