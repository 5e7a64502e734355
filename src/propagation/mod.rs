//! Position providers and propagation models consumed by the shared medium.
//!
//! - `geometry`: positions and distances
//! - `mobility`: position providers
//! - `loss`: received power given transmit power and two positions
//! - `delay`: propagation delay between two positions

pub mod delay;
pub mod geometry;
pub mod loss;
pub mod mobility;

use std::time::Duration;

pub use delay::ConstantSpeedDelay;
pub use geometry::Position;
pub use loss::{FixedRssLoss, LogDistanceLoss};
pub use mobility::ConstantPosition;

/// Provides the current position of a node.
pub trait MobilityModel {
    fn position(&self) -> Position;

    fn distance_to(&self, other: &dyn MobilityModel) -> f64 {
        self.position().distance(&other.position())
    }
}

/// Computes the power arriving at a receiver.
pub trait PropagationLossModel {
    fn rx_power_dbm(&self, tx_power_dbm: f64, sender: &dyn MobilityModel, receiver: &dyn MobilityModel) -> f64;
}

/// Computes how long a signal travels between two positions.
pub trait PropagationDelayModel {
    fn delay(&self, sender: &dyn MobilityModel, receiver: &dyn MobilityModel) -> Duration;
}
