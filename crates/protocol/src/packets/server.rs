//! Server -> Client message building.

use crate::{Color, ProtocolError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Outbound message. Serialized as `{"type": ..., ...payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Sent once to a newly registered session.
    Init {
        #[serde(rename = "playerId")]
        player_id: String,
        state: WorldState,
    },
    /// Full world state, sent every tick.
    Update { state: WorldState },
    /// A player entered the world.
    PlayerJoined { player: PlayerState },
    /// A player left the world (disconnected or eaten).
    PlayerLeft {
        #[serde(rename = "playerId")]
        player_id: String,
    },
}

impl ServerMessage {
    /// Serialize into a frame payload that can be shared across sessions.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Parse a frame produced by [`ServerMessage::encode`].
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// The wire `type` tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Init { .. } => "INIT",
            ServerMessage::Update { .. } => "UPDATE",
            ServerMessage::PlayerJoined { .. } => "PLAYER_JOINED",
            ServerMessage::PlayerLeft { .. } => "PLAYER_LEFT",
        }
    }
}

/// Point-in-time copy of every entity in the world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub players: Vec<PlayerState>,
    pub foods: Vec<CellState>,
    pub viruses: Vec<CellState>,
}

impl WorldState {
    pub fn player(&self, id: &str) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub mass: f64,
    pub direction: DirectionState,
    pub color: Color,
    pub radius: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionState {
    pub x: f64,
    pub y: f64,
}

/// Food pellet or virus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellState {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub mass: f64,
    pub color: Color,
    pub radius: f64,
}
