//! Physical layer: airtime and energy-detection model for one node's radio.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use log::{debug, trace};

use super::medium::SharedMedium;
use super::signal_calculations::{PhyMode, PhyProfile, calculate_tx_duration, dbm_to_w};
use crate::error::{BridgeError, BridgeResult};
use crate::frame::Frame;
use crate::propagation::MobilityModel;
use crate::simulation::{NodeId, Simulator};
use crate::trace::{FrameTrace, TracedCallback};

/// Transmit power used unless configured otherwise, in dBm.
pub const DEFAULT_TX_POWER_DBM: f64 = 65.0;

/// Invoked when a frame has been received successfully.
pub type RxOkCallback = Rc<dyn Fn(&mut Simulator, Frame) -> BridgeResult<()>>;

/// Radio physical layer.
///
/// The operating mode, data rate and energy-detection threshold live in a
/// single [`PhyProfile`] that is swapped as a whole, so no caller can ever
/// observe a rate or threshold belonging to another mode.
pub struct RadioPhy {
    node: NodeId,
    profile: Cell<PhyProfile>,
    tx_power_dbm: Cell<f64>,
    mobility: RefCell<Option<Rc<dyn MobilityModel>>>,
    medium: RefCell<Weak<SharedMedium>>,
    rx_ok: RefCell<Option<RxOkCallback>>,
    rx_drop_trace: TracedCallback<FrameTrace>,
    rx_end_trace: TracedCallback<FrameTrace>,
}

impl RadioPhy {
    pub fn new(node: NodeId) -> Self {
        RadioPhy {
            node,
            profile: Cell::new(PhyProfile::for_mode(PhyMode::default())),
            tx_power_dbm: Cell::new(DEFAULT_TX_POWER_DBM),
            mobility: RefCell::new(None),
            medium: RefCell::new(Weak::new()),
            rx_ok: RefCell::new(None),
            rx_drop_trace: TracedCallback::new(),
            rx_end_trace: TracedCallback::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn set_mode(&self, mode: PhyMode) {
        self.profile.set(PhyProfile::for_mode(mode));
        debug!("{}: PHY mode set to {:?}", self.node, mode);
    }

    pub fn mode(&self) -> PhyMode {
        self.profile.get().mode()
    }

    pub fn profile(&self) -> PhyProfile {
        self.profile.get()
    }

    pub fn data_rate(&self) -> u64 {
        self.profile.get().data_rate()
    }

    pub fn ed_threshold_dbm(&self) -> f64 {
        self.profile.get().ed_threshold_dbm()
    }

    pub fn set_tx_power_dbm(&self, dbm: f64) {
        self.tx_power_dbm.set(dbm);
    }

    pub fn tx_power_dbm(&self) -> f64 {
        self.tx_power_dbm.get()
    }

    pub fn set_mobility(&self, mobility: Rc<dyn MobilityModel>) {
        *self.mobility.borrow_mut() = Some(mobility);
    }

    pub fn mobility(&self) -> Option<Rc<dyn MobilityModel>> {
        self.mobility.borrow().clone()
    }

    /// Join `medium` and return the index it assigned.
    pub fn attach_to(self: &Rc<Self>, medium: &Rc<SharedMedium>) -> usize {
        *self.medium.borrow_mut() = Rc::downgrade(medium);
        medium.attach(self.clone())
    }

    pub fn medium(&self) -> Option<Rc<SharedMedium>> {
        self.medium.borrow().upgrade()
    }

    pub fn set_receive_ok_callback<F>(&self, callback: F)
    where
        F: Fn(&mut Simulator, Frame) -> BridgeResult<()> + 'static,
    {
        *self.rx_ok.borrow_mut() = Some(Rc::new(callback));
    }

    /// Airtime of a frame of `size` bytes in the current mode.
    pub fn tx_duration(&self, size: usize) -> Duration {
        calculate_tx_duration(&self.profile.get(), size)
    }

    /// Hand a frame to the medium. Returns the number of receivers it was scheduled for.
    pub fn transmit(self: &Rc<Self>, sim: &mut Simulator, frame: Frame) -> BridgeResult<usize> {
        let medium = self.medium().ok_or(BridgeError::MediumUnset(self.node))?;
        trace!("{}: transmitting {} bytes at {} dBm", self.node, frame.len(), self.tx_power_dbm());
        medium.transmit(sim, self, frame, self.tx_power_dbm())
    }

    /// A signal has started to arrive with `rx_power_dbm`. Returns `true` if
    /// the radio synchronized to it and will complete the reception.
    pub fn start_receive(self: &Rc<Self>, sim: &mut Simulator, frame: Frame, rx_power_dbm: f64) -> bool {
        let profile = self.profile.get();
        let rx_power_w = dbm_to_w(rx_power_dbm);
        if rx_power_w > profile.ed_threshold_w() {
            let duration = calculate_tx_duration(&profile, frame.len());
            debug!("{}: sync to signal (power={:.3e} W), rx ends in {:?}", self.node, rx_power_w, duration);
            let phy = self.clone();
            sim.schedule(duration, move |sim| phy.complete_receive(sim, frame));
            true
        } else {
            debug!(
                "{}: drop frame, signal power too small ({:.3e} W <= {:.3e} W)",
                self.node,
                rx_power_w,
                profile.ed_threshold_w()
            );
            self.rx_drop_trace.fire(&FrameTrace { time: sim.now(), frame });
            false
        }
    }

    /// Finish a reception. Reception never fails once synchronized; the frame
    /// goes straight to the receive callback.
    pub fn complete_receive(&self, sim: &mut Simulator, frame: Frame) -> BridgeResult<()> {
        self.rx_end_trace.fire(&FrameTrace { time: sim.now(), frame: frame.clone() });
        let callback = self.rx_ok.borrow().clone();
        match callback {
            Some(callback) => callback(sim, frame),
            None => {
                debug!("{}: received frame but no receive callback is set", self.node);
                Ok(())
            }
        }
    }

    /// Frames that arrived below the energy-detection threshold.
    pub fn rx_drop_trace(&self) -> &TracedCallback<FrameTrace> {
        &self.rx_drop_trace
    }

    /// Frames whose reception completed.
    pub fn rx_end_trace(&self) -> &TracedCallback<FrameTrace> {
        &self.rx_end_trace
    }
}

impl std::fmt::Debug for RadioPhy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioPhy")
            .field("node", &self.node)
            .field("profile", &self.profile.get())
            .field("tx_power_dbm", &self.tx_power_dbm.get())
            .finish_non_exhaustive()
    }
}
