//! The external-process link device.
//!
//! Makes a simulated node look, from the outside, like a real process attached
//! through an OS socket. Frames the process writes are read on a background
//! thread, injected into the simulation in the node's context and handed to
//! the bridged device's send path. Frames the bridged device sees are written
//! back to the process unchanged.
//!
//! Lifecycle:
//!
//! ```text
//! NotStarted --start_device--> Running --stop_device--> Stopped
//! ```
//!
//! `start`/`stop` only schedule those transitions; scheduling again before the
//! event fires replaces the earlier one.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::time::Duration;

use log::{debug, error, info};

use super::OverlayMode;
use super::inspect::{FrameInspector, PassthroughInspector};
use super::session::{ChildSession, LifecycleEvent};
use crate::address::{AddressAllocator, Mac64Address};
use crate::device::{NetDevice, PromiscReceiveCallback, PromiscRx, ReceiveCallback};
use crate::error::{BridgeError, BridgeResult};
use crate::frame::Frame;
use crate::radio::{PassthroughMac, RadioPhy};
use crate::simulation::{EventId, InjectorId, NodeId, SimTime, Simulator};
use crate::trace::{FrameTrace, TracedCallback};

/// Size of the read buffer and of the outbound scratch buffer.
pub const MAX_FRAME_SIZE: usize = 65536;

pub const DEFAULT_MTU: u16 = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    NotStarted,
    Running,
    Stopped,
}

pub struct ExternalProcessLink {
    node: NodeId,
    address: Cell<Mac64Address>,
    mtu: Cell<u16>,
    state: Cell<LinkState>,
    exec_path: RefCell<PathBuf>,
    mode: Cell<OverlayMode>,
    address_learned: Cell<bool>,
    allocator: Rc<AddressAllocator>,
    inspector: RefCell<Rc<dyn FrameInspector>>,
    bridged: RefCell<Option<Weak<dyn NetDevice>>>,
    mac: RefCell<Option<Rc<PassthroughMac>>>,
    phy: RefCell<Option<Rc<RadioPhy>>>,
    session: RefCell<Option<ChildSession>>,
    injector: Cell<Option<InjectorId>>,
    scratch: RefCell<Box<[u8]>>,
    start_event: Cell<Option<EventId>>,
    stop_event: Cell<Option<EventId>>,
    rx_callback: RefCell<Option<ReceiveCallback>>,
    promisc_callback: RefCell<Option<PromiscReceiveCallback>>,
    to_external_trace: TracedCallback<FrameTrace>,
    from_external_trace: TracedCallback<FrameTrace>,
    lifecycle_trace: TracedCallback<LifecycleEvent>,
}

impl ExternalProcessLink {
    pub fn new(node: NodeId, allocator: Rc<AddressAllocator>) -> Self {
        ExternalProcessLink {
            node,
            address: Cell::new(Mac64Address::default()),
            mtu: Cell::new(DEFAULT_MTU),
            state: Cell::new(LinkState::NotStarted),
            exec_path: RefCell::new(PathBuf::new()),
            mode: Cell::new(OverlayMode::Unset),
            address_learned: Cell::new(false),
            allocator,
            inspector: RefCell::new(Rc::new(PassthroughInspector)),
            bridged: RefCell::new(None),
            mac: RefCell::new(None),
            phy: RefCell::new(None),
            session: RefCell::new(None),
            injector: Cell::new(None),
            scratch: RefCell::new(vec![0u8; MAX_FRAME_SIZE].into_boxed_slice()),
            start_event: Cell::new(None),
            stop_event: Cell::new(None),
            rx_callback: RefCell::new(None),
            promisc_callback: RefCell::new(None),
            to_external_trace: TracedCallback::new(),
            from_external_trace: TracedCallback::new(),
            lifecycle_trace: TracedCallback::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state.get()
    }

    pub fn set_exec_path(&self, path: impl Into<PathBuf>) {
        *self.exec_path.borrow_mut() = path.into();
    }

    pub fn exec_path(&self) -> PathBuf {
        self.exec_path.borrow().clone()
    }

    pub fn set_mode(&self, mode: OverlayMode) {
        self.mode.set(mode);
    }

    pub fn mode(&self) -> OverlayMode {
        self.mode.get()
    }

    /// Whether the bridged device took over the external process's address.
    pub fn is_address_learned(&self) -> bool {
        self.address_learned.get()
    }

    pub fn set_inspector(&self, inspector: impl FrameInspector + 'static) {
        *self.inspector.borrow_mut() = Rc::new(inspector);
    }

    pub fn set_mac(&self, mac: Rc<PassthroughMac>) {
        *self.mac.borrow_mut() = Some(mac);
    }

    pub fn mac(&self) -> Option<Rc<PassthroughMac>> {
        self.mac.borrow().clone()
    }

    pub fn set_phy(&self, phy: Rc<RadioPhy>) {
        *self.phy.borrow_mut() = Some(phy);
    }

    pub fn phy(&self) -> Option<Rc<RadioPhy>> {
        self.phy.borrow().clone()
    }

    /// Process id of the running child, if any.
    pub fn pid(&self) -> Option<u32> {
        self.session.borrow().as_ref().map(ChildSession::pid)
    }

    pub fn has_transport(&self) -> bool {
        self.session.borrow().as_ref().is_some_and(ChildSession::is_open)
    }

    /// Take over `device`: its own stack stops receiving and everything it sees
    /// is written to the external process. A link bridges exactly one device,
    /// which may be the link itself.
    pub fn set_bridged_device(self: &Rc<Self>, device: &Rc<dyn NetDevice>) -> BridgeResult<()> {
        if self.bridged.borrow().is_some() {
            return Err(BridgeError::AlreadyBridged(self.node));
        }
        let node = self.node;
        device.set_receive_callback(Box::new(move |_, _, _| {
            debug!("{}: discarding frame stolen from bridged device", node);
            Ok(true)
        }));
        let link = Rc::downgrade(self);
        device.set_promisc_receive_callback(Box::new(move |rx| match link.upgrade() {
            Some(link) => link.receive_from_bridged_device(rx),
            None => Ok(false),
        }));
        *self.bridged.borrow_mut() = Some(Rc::downgrade(device));
        Ok(())
    }

    pub fn bridged_device(&self) -> Option<Rc<dyn NetDevice>> {
        self.bridged.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Schedule activation `delay` from now, replacing any pending activation.
    pub fn start(self: &Rc<Self>, sim: &mut Simulator, delay: Duration) -> EventId {
        if let Some(previous) = self.start_event.take() {
            sim.cancel(previous);
        }
        let link = Rc::downgrade(self);
        let id = sim.schedule_with_context(self.node, delay, move |sim| match link.upgrade() {
            Some(link) => link.start_device(sim),
            None => Ok(()),
        });
        self.start_event.set(Some(id));
        id
    }

    /// Schedule teardown `delay` from now, replacing any pending teardown.
    pub fn stop(self: &Rc<Self>, sim: &mut Simulator, delay: Duration) -> EventId {
        if let Some(previous) = self.stop_event.take() {
            sim.cancel(previous);
        }
        let link = Rc::downgrade(self);
        let id = sim.schedule_with_context(self.node, delay, move |sim| match link.upgrade() {
            Some(link) => link.stop_device(sim),
            None => Ok(()),
        });
        self.stop_event.set(Some(id));
        id
    }

    /// Give the bridged device a fresh address and spawn the external process.
    pub fn start_device(self: &Rc<Self>, sim: &mut Simulator) -> BridgeResult<()> {
        if self.session.borrow().is_some() {
            error!("{}: IPC socket already created", self.node);
            return Err(BridgeError::TransportAlreadyOpen(self.node));
        }
        let device = self.bridged_device().ok_or(BridgeError::NotBridged(self.node))?;

        let address = self.allocator.allocate();
        device.set_address(address);

        let link = Rc::downgrade(self);
        let injector = sim.injector(self.node, move |sim, frame| match link.upgrade() {
            Some(link) => link.forward(sim, frame),
            None => Ok(()),
        });
        let injector_id = injector.id();
        let exec_path = self.exec_path();
        let session = match ChildSession::spawn(self.node, &exec_path, address, injector) {
            Ok(session) => session,
            Err(err) => {
                sim.remove_injector(injector_id);
                error!("{}: starting external process failed: {}", self.node, err);
                return Err(err);
            }
        };
        let pid = session.pid();
        *self.session.borrow_mut() = Some(session);
        self.injector.set(Some(injector_id));
        self.state.set(LinkState::Running);
        info!("{}: link running at {} (pid {}, mode {})", self.node, sim.now(), pid, self.mode());
        self.lifecycle_trace.fire(&LifecycleEvent::Started { pid });
        Ok(())
    }

    /// Tear the running session down. Does nothing if no session is running.
    pub fn stop_device(&self, sim: &mut Simulator) -> BridgeResult<()> {
        let session = self.session.borrow_mut().take();
        let Some(mut session) = session else {
            debug!("{}: stop requested but no external process is running", self.node);
            return Ok(());
        };
        session.teardown(&mut |event| self.lifecycle_trace.fire(&event));
        if let Some(id) = self.injector.take() {
            sim.remove_injector(id);
        }
        self.state.set(LinkState::Stopped);
        info!("{}: link stopped at {}", self.node, sim.now());
        Ok(())
    }

    /// A frame read from the external process reached the simulation thread.
    pub fn forward(&self, sim: &mut Simulator, frame: Frame) -> BridgeResult<()> {
        self.from_external_trace.fire(&FrameTrace { time: sim.now(), frame: frame.clone() });

        let inspector = self.inspector.borrow().clone();
        let Some(info) = inspector.inspect(&frame) else {
            debug!("{}: discarding frame as unfit for the simulation", self.node);
            return Ok(());
        };
        let device = self.bridged_device().ok_or(BridgeError::NotBridged(self.node))?;

        match self.mode() {
            OverlayMode::MacPhyOverlay => {
                if !self.address_learned.get() {
                    match info.source {
                        Some(source) => {
                            info!("{}: learned address {}, assigning it to the bridged device", self.node, source);
                            device.set_address(source);
                            self.address_learned.set(true);
                        }
                        None => debug!("{}: frame carries no source address, nothing to learn", self.node),
                    }
                }
                debug!("{}: forwarding {} bytes to bridged device", self.node, frame.len());
                device.send(sim, frame, info.destination, info.protocol)?;
            }
            OverlayMode::PhyOverlay | OverlayMode::Unset => {
                debug!("{}: forwarding {} bytes to bridged device", self.node, frame.len());
                device.send(sim, frame, None, 0)?;
            }
        }
        Ok(())
    }

    /// Promiscuous hook of the bridged device: everything it sees goes to the external process.
    pub fn receive_from_bridged_device(&self, rx: &PromiscRx<'_>) -> BridgeResult<bool> {
        self.deliver_to_external(rx.frame, rx.time)?;
        Ok(true)
    }

    /// Copy `frame` into the scratch buffer and write it to the external process.
    ///
    /// Frames arriving while no process is running are dropped.
    pub fn deliver_to_external(&self, frame: &Frame, time: SimTime) -> BridgeResult<()> {
        self.to_external_trace.fire(&FrameTrace { time, frame: frame.clone() });

        let len = frame.len();
        if len > MAX_FRAME_SIZE {
            return Err(BridgeError::FrameTooLarge {
                node: self.node,
                len,
                max: MAX_FRAME_SIZE,
            });
        }
        let mut session = self.session.borrow_mut();
        let Some(session) = session.as_mut() else {
            debug!("{}: no open transport, dropping {} bytes", self.node, len);
            return Ok(());
        };
        let mut scratch = self.scratch.borrow_mut();
        scratch[..len].copy_from_slice(frame.as_bytes());
        session
            .write_frame(&scratch[..len])
            .map_err(|source| BridgeError::Write { node: self.node, source })?;
        debug!("{}: wrote {} bytes to external process", self.node, len);
        Ok(())
    }

    /// Frames written to the external process.
    pub fn to_external_trace(&self) -> &TracedCallback<FrameTrace> {
        &self.to_external_trace
    }

    /// Frames read from the external process.
    pub fn from_external_trace(&self) -> &TracedCallback<FrameTrace> {
        &self.from_external_trace
    }

    pub fn lifecycle_trace(&self) -> &TracedCallback<LifecycleEvent> {
        &self.lifecycle_trace
    }
}

impl NetDevice for ExternalProcessLink {
    fn node(&self) -> NodeId {
        self.node
    }

    fn address(&self) -> Mac64Address {
        self.address.get()
    }

    fn set_address(&self, address: Mac64Address) {
        self.address.set(address);
    }

    fn mtu(&self) -> u16 {
        self.mtu.get()
    }

    fn set_mtu(&self, mtu: u16) -> bool {
        self.mtu.set(mtu);
        true
    }

    fn is_link_up(&self) -> bool {
        true
    }

    /// Hand the frame to the MAC, which transmits it right away.
    fn send(&self, sim: &mut Simulator, frame: Frame, _destination: Option<Mac64Address>, _protocol: u16) -> BridgeResult<bool> {
        let mac = self.mac().ok_or(BridgeError::MacUnset(self.node))?;
        mac.enqueue(sim, frame)?;
        Ok(true)
    }

    fn send_from(
        &self,
        _sim: &mut Simulator,
        _frame: Frame,
        _source: Mac64Address,
        _destination: Option<Mac64Address>,
        _protocol: u16,
    ) -> BridgeResult<bool> {
        Err(BridgeError::SendFromUnsupported(self.node))
    }

    fn supports_send_from(&self) -> bool {
        false
    }

    // Neither callback is ever invoked: the link is transparent to the stack above it.
    fn set_receive_callback(&self, callback: ReceiveCallback) {
        *self.rx_callback.borrow_mut() = Some(callback);
    }

    fn set_promisc_receive_callback(&self, callback: PromiscReceiveCallback) {
        *self.promisc_callback.borrow_mut() = Some(callback);
    }
}

impl std::fmt::Debug for ExternalProcessLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalProcessLink")
            .field("node", &self.node)
            .field("address", &self.address.get())
            .field("state", &self.state.get())
            .field("mode", &self.mode.get())
            .field("exec_path", &self.exec_path.borrow())
            .finish_non_exhaustive()
    }
}
