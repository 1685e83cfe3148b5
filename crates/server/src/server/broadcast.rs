//! Broadcast fan-out.
//!
//! A payload is serialized once and offered to every session without
//! waiting. Sessions that cannot take it are reported back for eviction.

use super::registry::SessionRegistry;
use super::session::SessionId;
use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;

/// Why a session could not take a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// Outbound buffer is full: the consumer is too slow.
    Full,
    /// The transport dropped its receiver.
    Closed,
}

/// Offer `payload` to every session except `except`.
///
/// Returns the sessions that must be evicted.
pub fn fan_out(
    registry: &SessionRegistry,
    payload: &Bytes,
    except: Option<SessionId>,
) -> Vec<(SessionId, DeliveryFailure)> {
    let mut failed = Vec::new();
    for session in registry.sessions() {
        if Some(session.id()) == except {
            continue;
        }
        match session.try_deliver(payload.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => failed.push((session.id(), DeliveryFailure::Full)),
            Err(TrySendError::Closed(_)) => failed.push((session.id(), DeliveryFailure::Closed)),
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::session::Connection;

    #[test]
    fn test_fan_out_skips_sender_and_reports_slow_sessions() {
        let mut registry = SessionRegistry::new();

        let mut fast = Connection::new(SessionId::new(1), 8);
        let mut slow = Connection::new(SessionId::new(2), 1);
        let mut gone = Connection::new(SessionId::new(3), 8);
        let fast_rx = fast.take_outbound().unwrap();
        let _slow_rx = slow.take_outbound().unwrap();
        drop(gone.take_outbound());

        registry.insert(fast.take_session(String::new()).unwrap());
        registry.insert(slow.take_session(String::new()).unwrap());
        registry.insert(gone.take_session(String::new()).unwrap());

        let payload = Bytes::from_static(b"{}");
        let mut failed = fan_out(&registry, &payload, Some(SessionId::new(2)));
        assert_eq!(failed, vec![(SessionId::new(3), DeliveryFailure::Closed)]);
        assert_eq!(fast_rx.try_recv().unwrap(), payload);

        failed = fan_out(&registry, &payload, None);
        failed.sort_by_key(|(id, _)| *id);
        assert_eq!(
            failed,
            vec![(SessionId::new(3), DeliveryFailure::Closed)]
        );

        // The slow session's single slot is now taken.
        failed = fan_out(&registry, &payload, None);
        failed.sort_by_key(|(id, _)| *id);
        assert_eq!(
            failed,
            vec![
                (SessionId::new(2), DeliveryFailure::Full),
                (SessionId::new(3), DeliveryFailure::Closed),
            ]
        );
    }
}
