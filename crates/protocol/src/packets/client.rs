//! Client -> Server message parsing.
//!
//! Parsing is lenient on purpose: unknown or wrongly typed fields inside a
//! `PLAYER_UPDATE` are skipped rather than failing the whole message.

use super::client_types;
use crate::ProtocolError;
use serde_json::Value;

/// Parsed client message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Join the game with a display name.
    Register { name: String },
    /// Movement intent and state overrides for the bound player.
    PlayerUpdate(PlayerUpdate),
}

/// Partial update of a player. Any subset of fields may be present.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerUpdate {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub mass: Option<f64>,
    pub direction: Option<DirectionUpdate>,
}

/// Direction components are applied independently.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DirectionUpdate {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl ClientMessage {
    /// Parse a client message from a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;

        match kind {
            client_types::REGISTER => {
                let name = value
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or(ProtocolError::MissingField("name"))?;
                Ok(ClientMessage::Register {
                    name: name.to_string(),
                })
            }
            client_types::PLAYER_UPDATE => {
                // The browser client ships the payload under `name`.
                let data = value
                    .get("data")
                    .filter(|d| d.is_object())
                    .or_else(|| value.get("name").filter(|d| d.is_object()))
                    .ok_or(ProtocolError::MissingField("data"))?;
                Ok(ClientMessage::PlayerUpdate(PlayerUpdate::from_value(data)))
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

impl PlayerUpdate {
    fn from_value(data: &Value) -> Self {
        let direction = data
            .get("direction")
            .filter(|d| d.is_object())
            .map(|d| DirectionUpdate {
                x: number(d, "x"),
                y: number(d, "y"),
            });

        Self {
            x: number(data, "x"),
            y: number(data, "y"),
            mass: number(data, "mass"),
            direction,
        }
    }
}

#[inline]
fn number(value: &Value, key: &str) -> Option<f64> {
    value.get(key)?.as_f64().filter(|n| n.is_finite())
}
