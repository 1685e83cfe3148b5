//! Virus cell.

use super::cell::{Cell, CellData};
use super::EntityId;
use glam::DVec2;
use protocol::{CellState, Color};

/// Default virus color (green).
pub const VIRUS_COLOR: Color = Color::new(0x32, 0xcd, 0x32);

/// A virus. Kept at a target population; takes part in no interaction rule.
#[derive(Debug, Clone)]
pub struct Virus {
    id: EntityId,
    data: CellData,
}

impl Virus {
    pub fn new(id: EntityId, position: DVec2, mass: f64) -> Self {
        Self {
            id,
            data: CellData::new(position, mass),
        }
    }

    pub fn to_state(&self) -> CellState {
        CellState {
            id: self.id.to_string(),
            x: self.data.position.x,
            y: self.data.position.y,
            mass: self.data.mass(),
            color: VIRUS_COLOR,
            radius: self.data.radius(),
        }
    }
}

impl Cell for Virus {
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
