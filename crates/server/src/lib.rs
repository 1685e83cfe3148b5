//! Authoritative simulation core for the arena server.
//!
//! The world (players, food and viruses) lives in a [`WorldStore`]. A single
//! [`GameLoop`] advances it on a fixed tick, admits and removes sessions, and
//! fans serialized updates out to every connected client. Transports talk to
//! the loop through a [`GameHandle`].

pub mod collision;
pub mod config;
pub mod entity;
pub mod error;
pub mod physics;
pub mod server;
pub mod world;

pub use config::Config;
pub use entity::EntityId;
pub use error::GameError;
pub use server::{Connection, GameHandle, GameLoop, Outbox, SessionId, SessionState};
pub use world::{World, WorldStore};
