//! Movement integration and world-bound clamping.

use crate::entity::CellData;
use glam::DVec2;
use std::time::Duration;

/// Base speed in world units per second at mass 1.
pub const BASE_SPEED: f64 = 5.0;
/// Exponent applied to mass; heavier cells move slower.
pub const SPEED_EXPONENT: f64 = -0.2;

/// Speed for a given mass: `5 * mass^-0.2`.
#[inline]
pub fn speed(mass: f64) -> f64 {
    if mass <= 0.0 {
        return 0.0;
    }
    BASE_SPEED * mass.powf(SPEED_EXPONENT)
}

/// Displacement along `direction` over `elapsed` at the speed for `mass`.
#[inline]
pub fn displacement(direction: DVec2, mass: f64, elapsed: Duration) -> DVec2 {
    direction * speed(mass) * elapsed.as_secs_f64()
}

/// Clamp a cell's center into `[radius, size - radius]` on both axes.
///
/// A cell wider than the world is pinned to the center.
pub fn clamp_to_border(data: &mut CellData, size: f64) {
    let r = data.radius();
    let (lo, hi) = if 2.0 * r <= size {
        (r, size - r)
    } else {
        (size / 2.0, size / 2.0)
    };
    data.position = data.position.clamp(DVec2::splat(lo), DVec2::splat(hi));
}

/// Advance a cell by its direction for `elapsed`, then clamp it into the world.
pub fn integrate(data: &mut CellData, direction: DVec2, elapsed: Duration, size: f64) {
    if !elapsed.is_zero() {
        data.position += displacement(direction, data.mass(), elapsed);
    }
    clamp_to_border(data, size);
}
