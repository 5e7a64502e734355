//! Shared broadcast medium.
//!
//! Every transmission is fanned out to each other attached PHY with its own
//! propagation delay and received power. Deliveries run in the receiving
//! node's context so per-node ordering is kept by the scheduler.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use log::debug;

use super::phy::RadioPhy;
use crate::error::{BridgeError, BridgeResult};
use crate::frame::Frame;
use crate::propagation::{PropagationDelayModel, PropagationLossModel};
use crate::simulation::{NodeId, Simulator};

struct Delivery {
    index: usize,
    node: NodeId,
    delay: Duration,
    rx_power_dbm: f64,
}

#[derive(Default)]
pub struct SharedMedium {
    phys: RefCell<Vec<Rc<RadioPhy>>>,
    loss: RefCell<Option<Rc<dyn PropagationLossModel>>>,
    delay: RefCell<Option<Rc<dyn PropagationDelayModel>>>,
}

impl SharedMedium {
    /// A medium without propagation models. Transmitting fails until both are set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(loss: Rc<dyn PropagationLossModel>, delay: Rc<dyn PropagationDelayModel>) -> Self {
        SharedMedium {
            phys: RefCell::new(Vec::new()),
            loss: RefCell::new(Some(loss)),
            delay: RefCell::new(Some(delay)),
        }
    }

    pub fn set_loss_model(&self, loss: Rc<dyn PropagationLossModel>) {
        *self.loss.borrow_mut() = Some(loss);
    }

    pub fn set_delay_model(&self, delay: Rc<dyn PropagationDelayModel>) {
        *self.delay.borrow_mut() = Some(delay);
    }

    /// Append a PHY. Attaching the same PHY twice is a caller error and is not checked.
    pub fn attach(&self, phy: Rc<RadioPhy>) -> usize {
        let mut phys = self.phys.borrow_mut();
        phys.push(phy);
        phys.len() - 1
    }

    pub fn len(&self) -> usize {
        self.phys.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.phys.borrow().is_empty()
    }

    pub fn phy(&self, index: usize) -> Option<Rc<RadioPhy>> {
        self.phys.borrow().get(index).cloned()
    }

    /// Schedule delivery of `frame` to every attached PHY except `sender`.
    /// Returns the number of deliveries scheduled.
    ///
    /// Nothing is scheduled if any model or position provider is missing.
    pub fn transmit(self: &Rc<Self>, sim: &mut Simulator, sender: &Rc<RadioPhy>, frame: Frame, tx_power_dbm: f64) -> BridgeResult<usize> {
        let loss = self.loss.borrow().clone().ok_or(BridgeError::LossModelUnset)?;
        let delay_model = self.delay.borrow().clone().ok_or(BridgeError::DelayModelUnset)?;
        let sender_mobility = sender.mobility().ok_or(BridgeError::MobilityUnset(sender.node()))?;

        let phys = self.phys.borrow().clone();
        let mut deliveries = Vec::with_capacity(phys.len());
        for (index, receiver) in phys.iter().enumerate() {
            if Rc::ptr_eq(receiver, sender) {
                continue;
            }
            let receiver_mobility = receiver.mobility().ok_or(BridgeError::MobilityUnset(receiver.node()))?;
            let delay = delay_model.delay(sender_mobility.as_ref(), receiver_mobility.as_ref());
            let rx_power_dbm = loss.rx_power_dbm(tx_power_dbm, sender_mobility.as_ref(), receiver_mobility.as_ref());
            debug!(
                "propagation {} -> {}: tx={} dBm, rx={:.2} dBm, distance={:.2} m, delay={:?}",
                sender.node(),
                receiver.node(),
                tx_power_dbm,
                rx_power_dbm,
                sender_mobility.distance_to(receiver_mobility.as_ref()),
                delay
            );
            deliveries.push(Delivery {
                index,
                node: receiver.node(),
                delay,
                rx_power_dbm,
            });
        }

        let scheduled = deliveries.len();
        for delivery in deliveries {
            let medium = Rc::downgrade(self);
            let frame = frame.clone();
            sim.schedule_with_context(delivery.node, delivery.delay, move |sim| match medium.upgrade() {
                Some(medium) => medium.receive(sim, delivery.index, frame, delivery.rx_power_dbm),
                None => Ok(()),
            });
        }
        Ok(scheduled)
    }

    /// A scheduled delivery reached the PHY at `index`.
    pub fn receive(&self, sim: &mut Simulator, index: usize, frame: Frame, rx_power_dbm: f64) -> BridgeResult<()> {
        match self.phy(index) {
            Some(phy) => {
                phy.start_receive(sim, frame, rx_power_dbm);
            }
            None => debug!("medium: no PHY at index {}, dropping frame", index),
        }
        Ok(())
    }
}
