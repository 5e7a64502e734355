use std::time::Duration;

use super::{MobilityModel, PropagationDelayModel};
use crate::error::{BridgeError, BridgeResult};

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Delay proportional to distance at a fixed propagation speed.
#[derive(Debug, Clone)]
pub struct ConstantSpeedDelay {
    speed: f64,
}

impl ConstantSpeedDelay {
    pub fn new(speed: f64) -> BridgeResult<Self> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(BridgeError::InvalidParameter(format!("propagation speed must be positive, got {}", speed)));
        }
        Ok(ConstantSpeedDelay { speed })
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }
}

impl Default for ConstantSpeedDelay {
    fn default() -> Self {
        ConstantSpeedDelay { speed: SPEED_OF_LIGHT }
    }
}

impl PropagationDelayModel for ConstantSpeedDelay {
    fn delay(&self, sender: &dyn MobilityModel, receiver: &dyn MobilityModel) -> Duration {
        let seconds = sender.distance_to(receiver) / self.speed;
        Duration::from_secs_f64(seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::{ConstantPosition, Position};

    #[test]
    fn three_hundred_meters_at_light_speed() {
        let a = ConstantPosition::new(Position::new(0.0, 0.0, 0.0));
        let b = ConstantPosition::new(Position::new(300.0, 0.0, 0.0));
        let d = ConstantSpeedDelay::default().delay(&a, &b);
        // 300 m / c ≈ 1000.7 ns
        assert!((d.as_nanos() as i64 - 1_000).abs() <= 2, "{:?}", d);
    }

    #[test]
    fn colocated_nodes_have_no_delay() {
        let a = ConstantPosition::new(Position::new(5.0, 5.0, 0.0));
        assert_eq!(ConstantSpeedDelay::new(10.0).unwrap().delay(&a, &a), Duration::ZERO);
    }

    #[test]
    fn rejects_non_positive_speed() {
        assert!(ConstantSpeedDelay::new(0.0).is_err());
        assert!(ConstantSpeedDelay::new(-1.0).is_err());
        assert!(ConstantSpeedDelay::new(f64::NAN).is_err());
    }
}
