//! The simulated network device contract.
//!
//! Devices are shared through `Rc` and mutate through interior mutability, so
//! every method takes `&self`. A device may be handed to callbacks it owns
//! (the socket bridge can bridge itself), which is why implementations keep
//! their `RefCell` borrows short and never hold one across a callback.

use crate::address::Mac64Address;
use crate::error::BridgeResult;
use crate::frame::Frame;
use crate::simulation::{NodeId, SimTime, Simulator};

/// Classification of a frame seen by a device in promiscuous mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Host,
    Broadcast,
    Multicast,
    OtherHost,
}

/// Everything a promiscuous receiver learns about one frame.
#[derive(Debug, Clone)]
pub struct PromiscRx<'a> {
    pub frame: &'a Frame,
    pub protocol: u16,
    pub source: Option<Mac64Address>,
    pub destination: Option<Mac64Address>,
    pub packet_type: PacketType,
    pub time: SimTime,
}

/// Called with `(frame, protocol, source)` for frames addressed to the device's own stack.
pub type ReceiveCallback = Box<dyn Fn(&Frame, u16, Option<Mac64Address>) -> BridgeResult<bool>>;

/// Called for every frame the device sees, whatever its destination.
pub type PromiscReceiveCallback = Box<dyn Fn(&PromiscRx<'_>) -> BridgeResult<bool>>;

pub trait NetDevice {
    fn node(&self) -> NodeId;

    fn address(&self) -> Mac64Address;
    fn set_address(&self, address: Mac64Address);

    fn mtu(&self) -> u16;
    /// Returns `false` if the device refuses the value.
    fn set_mtu(&self, mtu: u16) -> bool;

    fn is_link_up(&self) -> bool;

    fn is_broadcast(&self) -> bool {
        true
    }

    fn broadcast(&self) -> Mac64Address {
        Mac64Address::BROADCAST
    }

    /// Hand a frame to the device for transmission. `destination` is `None`
    /// when the caller has no meaningful address to give.
    fn send(&self, sim: &mut Simulator, frame: Frame, destination: Option<Mac64Address>, protocol: u16) -> BridgeResult<bool>;

    fn send_from(
        &self,
        sim: &mut Simulator,
        frame: Frame,
        source: Mac64Address,
        destination: Option<Mac64Address>,
        protocol: u16,
    ) -> BridgeResult<bool>;

    fn supports_send_from(&self) -> bool;

    fn set_receive_callback(&self, callback: ReceiveCallback);
    fn set_promisc_receive_callback(&self, callback: PromiscReceiveCallback);
}
