//! Player-controlled cell.

use super::cell::{Cell, CellData};
use super::EntityId;
use glam::DVec2;
use protocol::{Color, DirectionState, PlayerState};
use rand::seq::IndexedRandom;
use std::time::Instant;

/// Palette players are colored from.
pub const PLAYER_COLORS: [Color; 10] = [
    Color::new(0xff, 0x7f, 0x50),
    Color::new(0x87, 0xce, 0xfa),
    Color::new(0xda, 0x70, 0xd6),
    Color::new(0x32, 0xcd, 0x32),
    Color::new(0x64, 0x95, 0xed),
    Color::new(0xff, 0x69, 0xb4),
    Color::new(0x9a, 0xcd, 0x32),
    Color::new(0xff, 0xa0, 0x7a),
    Color::new(0xf0, 0x80, 0x80),
    Color::new(0x7b, 0x68, 0xee),
];

pub fn random_player_color() -> Color {
    PLAYER_COLORS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or_default()
}

/// A player in the world. Owned by the world store, bound to one session.
#[derive(Debug, Clone)]
pub struct Player {
    id: EntityId,
    data: CellData,
    /// Display name.
    pub name: String,
    /// Movement direction as sent by the client (expected to be normalized).
    pub direction: DVec2,
    pub color: Color,
    /// When the last input update was applied.
    pub last_input: Instant,
}

impl Player {
    pub fn new(id: EntityId, name: String, position: DVec2, mass: f64, color: Color) -> Self {
        Self {
            id,
            data: CellData::new(position, mass),
            name,
            direction: DVec2::ZERO,
            color,
            last_input: Instant::now(),
        }
    }

    pub fn to_state(&self) -> PlayerState {
        PlayerState {
            id: self.id.to_string(),
            name: self.name.clone(),
            x: self.data.position.x,
            y: self.data.position.y,
            mass: self.data.mass(),
            direction: DirectionState {
                x: self.direction.x,
                y: self.direction.y,
            },
            color: self.color,
            radius: self.data.radius(),
        }
    }
}

impl Cell for Player {
    fn id(&self) -> EntityId {
        self.id
    }

    fn data(&self) -> &CellData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut CellData {
        &mut self.data
    }
}
