use std::cell::RefCell;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::{MobilityModel, PropagationLossModel};
use crate::error::{BridgeError, BridgeResult};
use crate::radio::signal_calculations::{PathLossParameters, calculate_path_loss};

/// Log-distance path loss with optional log-normal shadowing.
///
/// Every call samples fresh shadowing, so two transmissions over the same
/// link can arrive with different power when `shadowing_sigma` is non-zero.
#[derive(Debug)]
pub struct LogDistanceLoss {
    params: PathLossParameters,
    rng: RefCell<StdRng>,
}

impl LogDistanceLoss {
    pub fn new(params: PathLossParameters) -> BridgeResult<Self> {
        Self::build(params, StdRng::from_entropy())
    }

    /// Same as `new` but with a reproducible shadowing sequence.
    pub fn with_seed(params: PathLossParameters, seed: u64) -> BridgeResult<Self> {
        Self::build(params, StdRng::seed_from_u64(seed))
    }

    fn build(params: PathLossParameters, rng: StdRng) -> BridgeResult<Self> {
        params.validate()?;
        Ok(LogDistanceLoss { params, rng: RefCell::new(rng) })
    }

    pub fn parameters(&self) -> &PathLossParameters {
        &self.params
    }
}

impl Default for LogDistanceLoss {
    fn default() -> Self {
        LogDistanceLoss {
            params: PathLossParameters::default(),
            rng: RefCell::new(StdRng::from_entropy()),
        }
    }
}

impl PropagationLossModel for LogDistanceLoss {
    fn rx_power_dbm(&self, tx_power_dbm: f64, sender: &dyn MobilityModel, receiver: &dyn MobilityModel) -> f64 {
        let distance = sender.distance_to(receiver);
        let loss = calculate_path_loss(distance, &self.params, &mut *self.rng.borrow_mut());
        tx_power_dbm - loss
    }
}

/// Every receiver hears the same power regardless of distance or transmit power.
#[derive(Debug, Clone)]
pub struct FixedRssLoss {
    rss_dbm: f64,
}

impl FixedRssLoss {
    pub fn new(rss_dbm: f64) -> BridgeResult<Self> {
        if !rss_dbm.is_finite() {
            return Err(BridgeError::InvalidParameter(format!("fixed RSS must be finite, got {}", rss_dbm)));
        }
        Ok(FixedRssLoss { rss_dbm })
    }
}

impl PropagationLossModel for FixedRssLoss {
    fn rx_power_dbm(&self, _tx_power_dbm: f64, _sender: &dyn MobilityModel, _receiver: &dyn MobilityModel) -> f64 {
        self.rss_dbm
    }
}
