//! Background thread reading frames from the external process.

use std::io::{self, Read};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use super::link::MAX_FRAME_SIZE;
use crate::error::{BridgeError, BridgeResult};
use crate::frame::Frame;
use crate::simulation::{Injector, NodeId};

/// Background thread that blocks on the transport and injects every read as one frame.
///
/// The thread never touches simulation state. The only way to interrupt its
/// blocking read is to shut the socket down, which is what `stop` does.
pub(crate) struct FrameReader {
    node: NodeId,
    handle: Option<JoinHandle<()>>,
}

impl FrameReader {
    pub(crate) fn start(node: NodeId, stream: UnixStream, injector: Injector) -> BridgeResult<Self> {
        let handle = thread::Builder::new()
            .name(format!("link-reader-{}", node.raw()))
            .spawn(move || read_loop(node, stream, injector))
            .map_err(BridgeError::ReaderSpawn)?;
        Ok(FrameReader { node, handle: Some(handle) })
    }

    /// Shut the transport down so the pending read returns, then wait for the thread.
    pub(crate) fn stop(mut self, transport: Option<&UnixStream>) {
        if let Some(transport) = transport {
            if let Err(err) = transport.shutdown(Shutdown::Both) {
                // Already disconnected when the child went away first.
                if err.kind() != io::ErrorKind::NotConnected {
                    warn!("{}: shutting down transport failed: {}", self.node, err);
                }
            }
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("{}: reader thread panicked", self.node);
            }
        }
    }
}

fn read_loop(node: NodeId, mut stream: UnixStream, injector: Injector) {
    let mut buf = vec![0u8; MAX_FRAME_SIZE];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => {
                info!("{}: external process closed the transport", node);
                break;
            }
            Ok(len) => {
                debug!("{}: read {} bytes from external process", node, len);
                if !injector.inject(Frame::new(&buf[..len])) {
                    debug!("{}: simulation gone, reader exiting", node);
                    break;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                info!("{}: reader stopped: {}", node, err);
                break;
            }
        }
    }
}
