//! Food pellet cell.

use super::cell::{Cell, CellData};
use super::EntityId;
use glam::DVec2;
use protocol::{CellState, Color};

pub const FOOD_COLOR: Color = Color::new(0xff, 0xcc, 0xcb);

/// A food pellet that can be eaten by players.
#[derive(Debug, Clone)]
pub struct Food {
    id: EntityId,
    data: CellData,
    pub color: Color,
}

impl Food {
    pub fn new(id: EntityId, position: DVec2, mass: f64) -> Self {
        Self {
            id,
            data: CellData::new(position, mass),
            color: FOOD_COLOR,
        }
    }

    pub fn to_state(&self) -> CellState {
        CellState {
            id: self.id.to_string(),
            x: self.data.position.x,
            y: self.data.position.y,
            mass: self.data.mass(),
            color: self.color,
            radius: self.data.radius(),
        }
    }
}

impl Cell for Food {
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
