//! Helpers shared by unit tests.

use std::cell::{Cell, RefCell};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::address::Mac64Address;
use crate::device::{NetDevice, PacketType, PromiscReceiveCallback, PromiscRx, ReceiveCallback};
use crate::error::{BridgeError, BridgeResult};
use crate::frame::Frame;
use crate::simulation::{NodeId, SimTime, Simulator};

// Writing a script while another test thread forks can leave the file open
// for writing in the child, and exec then fails with ETXTBSY.
static SUBPROCESS_GUARD: Mutex<()> = Mutex::new(());
static SCRIPT_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn subprocess_guard() -> MutexGuard<'static, ()> {
    SUBPROCESS_GUARD.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write an executable `/bin/sh` script with `body` and return its path.
pub(crate) fn write_script(name: &str, body: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("socket-bridge-sim-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let n = SCRIPT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = dir.join(format!("{}-{}.sh", name, n));
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A frame handed to [`RecordingDevice::send`].
#[derive(Debug, Clone)]
pub(crate) struct SentFrame {
    pub frame: Frame,
    pub destination: Option<Mac64Address>,
    pub protocol: u16,
    pub time: SimTime,
    pub context: Option<NodeId>,
}

/// A device that records what it is asked to send.
pub(crate) struct RecordingDevice {
    node: NodeId,
    address: Cell<Mac64Address>,
    sent: RefCell<Vec<SentFrame>>,
    rx_callback: RefCell<Option<ReceiveCallback>>,
    promisc_callback: RefCell<Option<PromiscReceiveCallback>>,
}

impl RecordingDevice {
    pub(crate) fn new(node: NodeId) -> Self {
        RecordingDevice {
            node,
            address: Cell::new(Mac64Address::default()),
            sent: RefCell::new(Vec::new()),
            rx_callback: RefCell::new(None),
            promisc_callback: RefCell::new(None),
        }
    }

    pub(crate) fn sent(&self) -> Vec<SentFrame> {
        self.sent.borrow().clone()
    }

    /// Pretend the device saw `frame` on its medium.
    pub(crate) fn observe(&self, frame: &Frame, time: SimTime) -> BridgeResult<bool> {
        let rx = PromiscRx {
            frame,
            protocol: 0x86dd,
            source: None,
            destination: Some(self.address.get()),
            packet_type: PacketType::Host,
            time,
        };
        match self.promisc_callback.borrow().as_ref() {
            Some(callback) => callback(&rx),
            None => Ok(false),
        }
    }

    /// Deliver `frame` to the device's own stack.
    pub(crate) fn deliver_up(&self, frame: &Frame) -> BridgeResult<bool> {
        match self.rx_callback.borrow().as_ref() {
            Some(callback) => callback(frame, 0, None),
            None => Ok(false),
        }
    }
}

impl NetDevice for RecordingDevice {
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
        1500
    }

    fn set_mtu(&self, _mtu: u16) -> bool {
        false
    }

    fn is_link_up(&self) -> bool {
        true
    }

    fn send(&self, sim: &mut Simulator, frame: Frame, destination: Option<Mac64Address>, protocol: u16) -> BridgeResult<bool> {
        self.sent.borrow_mut().push(SentFrame {
            frame,
            destination,
            protocol,
            time: sim.now(),
            context: sim.context(),
        });
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

    fn set_receive_callback(&self, callback: ReceiveCallback) {
        *self.rx_callback.borrow_mut() = Some(callback);
    }

    fn set_promisc_receive_callback(&self, callback: PromiscReceiveCallback) {
        *self.promisc_callback.borrow_mut() = Some(callback);
    }
}
