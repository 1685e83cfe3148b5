//! Message definitions for the arena protocol.
//!
//! Every message is a JSON object whose `type` field selects the variant.

mod client;
mod server;

pub use client::*;
pub use server::*;

/// `type` values accepted from clients.
pub mod client_types {
    pub const REGISTER: &str = "REGISTER";
    pub const PLAYER_UPDATE: &str = "PLAYER_UPDATE";
}
