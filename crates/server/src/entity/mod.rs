//! Game entities.
//!
//! Players, food pellets and viruses all share [`CellData`]: a position,
//! a mass and the radius derived from that mass.

mod cell;
mod food;
mod id;
mod player;
mod virus;

pub use cell::{Cell, CellData};
pub use food::{FOOD_COLOR, Food};
pub use id::{EntityId, IdGenerator};
pub use player::{PLAYER_COLORS, Player, random_player_color};
pub use virus::{VIRUS_COLOR, Virus};
