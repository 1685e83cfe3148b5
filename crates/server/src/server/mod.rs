//! Session handling and the control loop.

pub mod broadcast;
pub mod game;
pub mod registry;
pub mod session;

pub use game::{GameHandle, GameLoop};
pub use registry::{Departure, RegisterOptions, Registration, SessionRegistry, display_name};
pub use session::{Connection, Outbox, Session, SessionId, SessionState};
