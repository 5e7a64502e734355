//! Pass-through link layer: no contention, retransmission or framing.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use log::debug;

use super::phy::RadioPhy;
use crate::address::Mac64Address;
use crate::bridge::ExternalProcessLink;
use crate::device::{PacketType, PromiscRx};
use crate::error::{BridgeError, BridgeResult};
use crate::frame::Frame;
use crate::simulation::{NodeId, Simulator};
use crate::trace::{FrameTrace, TracedCallback};

pub struct PassthroughMac {
    node: NodeId,
    address: Cell<Mac64Address>,
    phy: RefCell<Option<Rc<RadioPhy>>>,
    link: RefCell<Weak<ExternalProcessLink>>,
    tx_trace: TracedCallback<FrameTrace>,
    rx_trace: TracedCallback<FrameTrace>,
}

impl PassthroughMac {
    pub fn new(node: NodeId) -> Self {
        PassthroughMac {
            node,
            address: Cell::new(Mac64Address::default()),
            phy: RefCell::new(None),
            link: RefCell::new(Weak::new()),
            tx_trace: TracedCallback::new(),
            rx_trace: TracedCallback::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn address(&self) -> Mac64Address {
        self.address.get()
    }

    pub fn set_address(&self, address: Mac64Address) {
        self.address.set(address);
    }

    /// Use `phy` for transmission and register for its successful receptions.
    pub fn set_phy(self: &Rc<Self>, phy: Rc<RadioPhy>) {
        let mac = Rc::downgrade(self);
        phy.set_receive_ok_callback(move |sim, frame| match mac.upgrade() {
            Some(mac) => mac.receive(sim, frame),
            None => Ok(()),
        });
        *self.phy.borrow_mut() = Some(phy);
    }

    pub fn phy(&self) -> Option<Rc<RadioPhy>> {
        self.phy.borrow().clone()
    }

    pub fn set_link(&self, link: &Rc<ExternalProcessLink>) {
        *self.link.borrow_mut() = Rc::downgrade(link);
    }

    /// Transmit immediately. There is no queue and no backoff.
    pub fn enqueue(&self, sim: &mut Simulator, frame: Frame) -> BridgeResult<()> {
        self.tx_trace.fire(&FrameTrace { time: sim.now(), frame: frame.clone() });
        let phy = self.phy().ok_or(BridgeError::PhyUnset(self.node))?;
        phy.transmit(sim, frame)?;
        Ok(())
    }

    /// A frame came up from the PHY; pass it to the link for the external process.
    pub fn receive(&self, sim: &mut Simulator, frame: Frame) -> BridgeResult<()> {
        self.rx_trace.fire(&FrameTrace { time: sim.now(), frame: frame.clone() });
        let link = self.link.borrow().upgrade();
        let Some(link) = link else {
            debug!("{}: MAC has no link, dropping {} bytes", self.node, frame.len());
            return Ok(());
        };
        let rx = PromiscRx {
            frame: &frame,
            protocol: 0,
            source: None,
            destination: None,
            packet_type: PacketType::Host,
            time: sim.now(),
        };
        link.receive_from_bridged_device(&rx)?;
        Ok(())
    }

    pub fn tx_trace(&self) -> &TracedCallback<FrameTrace> {
        &self.tx_trace
    }

    pub fn rx_trace(&self) -> &TracedCallback<FrameTrace> {
        &self.rx_trace
    }
}

impl std::fmt::Debug for PassthroughMac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassthroughMac")
            .field("node", &self.node)
            .field("address", &self.address.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::{ConstantPosition, ConstantSpeedDelay, FixedRssLoss, Position};
    use crate::radio::SharedMedium;

    #[test]
    fn enqueue_without_phy_fails() {
        let mac = PassthroughMac::new(NodeId::new(3));
        let mut sim = Simulator::new();
        let err = mac.enqueue(&mut sim, Frame::from(vec![1])).unwrap_err();
        assert!(matches!(err, BridgeError::PhyUnset(_)));
    }

    #[test]
    fn frames_pass_straight_through_with_traces() {
        let medium = Rc::new(SharedMedium::with_models(
            Rc::new(FixedRssLoss::new(-50.0).unwrap()),
            Rc::new(ConstantSpeedDelay::default()),
        ));
        let mut macs = Vec::new();
        for i in 0..2u32 {
            let phy = Rc::new(RadioPhy::new(NodeId::new(i)));
            phy.set_mobility(Rc::new(ConstantPosition::new(Position::new(i as f64, 0.0, 0.0))));
            phy.attach_to(&medium);
            let mac = Rc::new(PassthroughMac::new(NodeId::new(i)));
            mac.set_phy(phy);
            macs.push(mac);
        }
        let sent = Rc::new(RefCell::new(Vec::new()));
        let got = Rc::new(RefCell::new(Vec::new()));
        let s = sent.clone();
        macs[0].tx_trace().connect(move |t| s.borrow_mut().push(t.clone()));
        let g = got.clone();
        macs[1].rx_trace().connect(move |t| g.borrow_mut().push(t.clone()));

        let mut sim = Simulator::new();
        macs[0].enqueue(&mut sim, Frame::from(vec![7u8; 20])).unwrap();
        // Without a link the receiving MAC drops after tracing.
        sim.run().unwrap();

        assert_eq!(sent.borrow().len(), 1);
        assert_eq!(sent.borrow()[0].time, crate::simulation::SimTime::ZERO);
        let got = got.borrow();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].frame.as_bytes(), &[7u8; 20][..]);
        assert!(got[0].time > sent.borrow()[0].time);
    }
}
