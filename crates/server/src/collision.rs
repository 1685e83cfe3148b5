//! Eating rules.
//!
//! A cell can eat another when the target's center lies inside the eater's
//! radius and the eater is strictly more than [`EAT_MASS_MULT`] times heavier.

use crate::entity::CellData;

pub const EAT_MASS_MULT: f64 = 1.2;
pub const MASS_CONVERSION: f64 = 100.0;

/// Calculate radius from mass: `sqrt(mass * 100 / PI)`.
#[inline]
pub fn mass_to_radius(mass: f64) -> f64 {
    (mass * MASS_CONVERSION / std::f64::consts::PI).sqrt()
}

/// Check whether `eater` may absorb `target`.
#[inline]
pub fn can_eat(eater: &CellData, target: &CellData) -> bool {
    eater.distance_to(target) < eater.radius() && eater.mass() > target.mass() * EAT_MASS_MULT
}
