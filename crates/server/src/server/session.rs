//! Client session state.
//!
//! A connection is split in two when it is accepted: the transport keeps the
//! [`Connection`] (the receiving end of the outbound buffer), and the
//! [`Session`] (the sending end) is handed to the control loop on register.

use crate::entity::EntityId;
use bytes::Bytes;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{
    self,
    error::{TryRecvError, TrySendError},
};

/// Unique id of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted by the transport, not yet registered.
    Connecting,
    /// Bound to a player; initial state not yet confirmed delivered.
    Registered,
    /// Initial state delivered; receiving per-tick updates.
    Active,
    /// Outbound buffer overflowed during fan-out.
    Unresponsive,
    /// Transport closed.
    Disconnected,
    /// Cleanup finished.
    Terminated,
}

/// Loop-side half of a connection. Owned by the session registry.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    name: String,
    outbound: mpsc::Sender<Bytes>,
    /// The transport's end of the buffer. Weak so that a dropped transport
    /// still shows up as a closed channel.
    queued: Weak<Mutex<mpsc::Receiver<Bytes>>>,
    binding: Arc<OnceLock<EntityId>>,
    state: SessionState,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        name: String,
        outbound: mpsc::Sender<Bytes>,
        queued: Weak<Mutex<mpsc::Receiver<Bytes>>>,
        binding: Arc<OnceLock<EntityId>>,
    ) -> Self {
        Self {
            id,
            name,
            outbound,
            queued,
            binding,
            state: SessionState::Connecting,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Name requested at registration.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// The player this session controls, once bound.
    pub fn player_id(&self) -> Option<EntityId> {
        self.binding.get().copied()
    }

    /// Bind the session to a player. Returns false if it was already bound.
    pub(crate) fn bind(&self, player_id: EntityId) -> bool {
        self.binding.set(player_id).is_ok()
    }

    /// Enqueue without waiting.
    pub(crate) fn try_deliver(&self, payload: Bytes) -> Result<(), TrySendError<Bytes>> {
        self.outbound.try_send(payload)
    }

    pub(crate) fn outbound(&self) -> &mpsc::Sender<Bytes> {
        &self.outbound
    }

    /// Discard the oldest queued payload to make room. Returns `None` if the
    /// buffer is empty, the transport is gone, or its writer is mid-receive.
    pub(crate) fn drain_one(&self) -> Option<Bytes> {
        let queued = self.queued.upgrade()?;
        let mut rx = queued.try_lock().ok()?;
        rx.try_recv().ok()
    }
}

/// Receiving end of a session's outbound buffer, held by the transport.
#[derive(Debug)]
pub struct Outbox {
    rx: Arc<Mutex<mpsc::Receiver<Bytes>>>,
}

impl Outbox {
    /// Wait for the next payload. `None` once the session has been dropped
    /// and the buffer is empty.
    pub async fn recv(&self) -> Option<Bytes> {
        self.rx.lock().await.recv().await
    }

    /// Take a payload if one is ready.
    pub fn try_recv(&self) -> Result<Bytes, TryRecvError> {
        match self.rx.try_lock() {
            Ok(mut rx) => rx.try_recv(),
            Err(_) => Err(TryRecvError::Empty),
        }
    }
}

/// Transport-side half of a connection.
#[derive(Debug)]
pub struct Connection {
    id: SessionId,
    session: Option<Session>,
    outbox: Option<Outbox>,
    binding: Arc<OnceLock<EntityId>>,
}

impl Connection {
    pub(crate) fn new(id: SessionId, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let binding = Arc::new(OnceLock::new());
        let session = Session::new(
            id,
            String::new(),
            tx,
            Arc::downgrade(&rx),
            Arc::clone(&binding),
        );
        Self {
            id,
            session: Some(session),
            outbox: Some(Outbox { rx }),
            binding,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Player bound by the control loop, if registration has been processed.
    pub fn player_id(&self) -> Option<EntityId> {
        self.binding.get().copied()
    }

    /// Take the receiving end of the outbound buffer (once).
    pub fn take_outbound(&mut self) -> Option<Outbox> {
        self.outbox.take()
    }

    /// Hand out the loop-side half with the requested name. Only the first
    /// call returns a session.
    pub(crate) fn take_session(&mut self, name: String) -> Option<Session> {
        let mut session = self.session.take()?;
        session.name = name;
        Some(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_taken_once() {
        let mut conn = Connection::new(SessionId::new(1), 4);
        let session = conn.take_session("alice".to_string()).unwrap();
        assert_eq!(session.name(), "alice");
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(conn.take_session("again".to_string()).is_none());
    }

    #[test]
    fn test_binding_is_shared_and_write_once() {
        let mut conn = Connection::new(SessionId::new(1), 4);
        let session = conn.take_session(String::new()).unwrap();
        assert!(conn.player_id().is_none());

        assert!(session.bind(EntityId::new(10)));
        assert!(!session.bind(EntityId::new(11)));
        assert_eq!(conn.player_id(), Some(EntityId::new(10)));
        assert_eq!(session.player_id(), Some(EntityId::new(10)));
    }

    #[test]
    fn test_delivery_reports_full_and_closed() {
        let mut conn = Connection::new(SessionId::new(1), 1);
        let session = conn.take_session(String::new()).unwrap();
        let rx = conn.take_outbound().unwrap();

        assert!(session.try_deliver(Bytes::from_static(b"a")).is_ok());
        assert!(matches!(
            session.try_deliver(Bytes::from_static(b"b")),
            Err(TrySendError::Full(_))
        ));
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"a"));

        drop(rx);
        assert!(matches!(
            session.try_deliver(Bytes::from_static(b"c")),
            Err(TrySendError::Closed(_))
        ));
    }

    #[test]
    fn test_drain_one_frees_a_slot() {
        let mut conn = Connection::new(SessionId::new(1), 1);
        let session = conn.take_session(String::new()).unwrap();
        let rx = conn.take_outbound().unwrap();

        assert!(session.drain_one().is_none());
        session.try_deliver(Bytes::from_static(b"old")).unwrap();
        assert_eq!(session.drain_one(), Some(Bytes::from_static(b"old")));
        session.try_deliver(Bytes::from_static(b"new")).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"new"));

        drop(rx);
        assert!(session.drain_one().is_none());
    }
}
