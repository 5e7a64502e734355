//! A running external process together with its transport and reader.
//!
//! The three are created together and only ever torn down together, in a
//! fixed order: reader first, then the transport, then the child. Teardown
//! also runs on drop, so no error path can leak a process or a descriptor.

use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use log::{info, warn};

use super::reader::FrameReader;
use crate::address::Mac64Address;
use crate::error::{BridgeError, BridgeResult};
use crate::simulation::{Injector, NodeId};

/// Steps of a link's process lifecycle, reported through the link's lifecycle trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started { pid: u32 },
    ReaderStopped,
    TransportClosed,
    ChildKilled { pid: u32 },
}

pub struct ChildSession {
    node: NodeId,
    pid: u32,
    transport: Option<UnixStream>,
    reader: Option<FrameReader>,
    child: Option<Child>,
}

impl ChildSession {
    /// Spawn `exec_path -a<address>` with its stdin bound to one end of a
    /// fresh socket pair and start reading the other end.
    pub(crate) fn spawn(node: NodeId, exec_path: &Path, address: Mac64Address, injector: Injector) -> BridgeResult<Self> {
        let (parent_end, child_end) = UnixStream::pair().map_err(BridgeError::TransportCreate)?;
        let reader_end = parent_end.try_clone().map_err(BridgeError::TransportCreate)?;

        let child = Command::new(exec_path)
            .arg(format!("-a{}", address))
            .stdin(Stdio::from(OwnedFd::from(child_end)))
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                path: exec_path.to_path_buf(),
                source,
            })?;
        let pid = child.id();
        info!("{}: spawned {} (pid {}) with address {}", node, exec_path.display(), pid, address);

        let mut session = ChildSession {
            node,
            pid,
            transport: Some(parent_end),
            reader: None,
            child: Some(child),
        };
        // On failure the session is dropped here and the child is killed.
        session.reader = Some(FrameReader::start(node, reader_end, injector)?);
        Ok(session)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Write one frame. No length prefix is added.
    pub(crate) fn write_frame(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.transport.as_mut() {
            Some(transport) => transport.write_all(bytes),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed")),
        }
    }

    /// Stop the reader, close the transport, then kill and reap the child.
    /// Steps already done are skipped, so calling this again does nothing.
    pub fn teardown(&mut self, notify: &mut dyn FnMut(LifecycleEvent)) {
        if let Some(reader) = self.reader.take() {
            reader.stop(self.transport.as_ref());
            notify(LifecycleEvent::ReaderStopped);
        }
        if let Some(transport) = self.transport.take() {
            drop(transport);
            notify(LifecycleEvent::TransportClosed);
        }
        if let Some(mut child) = self.child.take() {
            info!("{}: killing child {}", self.node, self.pid);
            if let Err(err) = child.kill() {
                // InvalidInput means the child was already reaped.
                if err.kind() != io::ErrorKind::InvalidInput {
                    warn!("{}: killing child {} failed: {}", self.node, self.pid, err);
                }
            }
            match child.wait() {
                Ok(status) => info!("{}: child {} exited with {}", self.node, self.pid, status),
                Err(err) => warn!("{}: waiting for child {} failed: {}", self.node, self.pid, err),
            }
            notify(LifecycleEvent::ChildKilled { pid: self.pid });
        }
    }
}

impl Drop for ChildSession {
    fn drop(&mut self) {
        self.teardown(&mut |_| {});
    }
}

impl std::fmt::Debug for ChildSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildSession")
            .field("node", &self.node)
            .field("pid", &self.pid)
            .field("open", &self.is_open())
            .finish()
    }
}
