//! Positions and distance calculations.

use serde::Deserialize;

/// A point in world coordinates, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z }
    }

    /// Squared Euclidean distance. Cheaper than `distance` when only comparing.
    pub fn distance2(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance(&self, other: &Position) -> f64 {
        distance_from_d2(self.distance2(other))
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Convert squared distance back to distance.
pub fn distance_from_d2(d2: f64) -> f64 {
    d2.sqrt()
}
