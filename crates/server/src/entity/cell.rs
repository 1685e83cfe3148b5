//! Base cell type and common functionality.

use super::EntityId;
use crate::collision::mass_to_radius;
use glam::DVec2;

/// Geometry shared by every entity.
///
/// Mass is only writable through [`CellData::set_mass`], which keeps the
/// radius in step with it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellData {
    /// Center in world coordinates.
    pub position: DVec2,
    mass: f64,
    radius: f64,
}

impl CellData {
    pub fn new(position: DVec2, mass: f64) -> Self {
        let mass = mass.max(0.0);
        Self {
            position,
            mass,
            radius: mass_to_radius(mass),
        }
    }

    #[inline]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Set mass and recompute radius. Negative input is floored at zero.
    pub fn set_mass(&mut self, mass: f64) {
        self.mass = mass.max(0.0);
        self.radius = mass_to_radius(self.mass);
    }

    /// Euclidean distance between centers.
    #[inline]
    pub fn distance_to(&self, other: &CellData) -> f64 {
        self.position.distance(other.position)
    }
}

/// Common behavior of all entity types.
pub trait Cell {
    fn id(&self) -> EntityId;

    fn data(&self) -> &CellData;

    fn data_mut(&mut self) -> &mut CellData;

    fn position(&self) -> DVec2 {
        self.data().position
    }

    fn mass(&self) -> f64 {
        self.data().mass()
    }

    fn radius(&self) -> f64 {
        self.data().radius()
    }
}
