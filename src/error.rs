//! Error type shared by the bridge, radio and simulation layers.
//!
//! Every variant here is fatal: the operation (or the scheduled event) that
//! hits one returns it, and `Simulator::run` stops at the first error it sees.
//! Expected steady-state outcomes such as frames below the energy-detection
//! threshold are not errors and never show up here.

use std::io;
use std::path::PathBuf;

use crate::simulation::NodeId;

/// Fatal conditions raised by the socket bridge and the emulated medium.
#[derive(Debug)]
pub enum BridgeError {
    /// Activation was requested while the link still owns an open transport.
    TransportAlreadyOpen(NodeId),
    /// The connected socket pair could not be created or duplicated.
    TransportCreate(io::Error),
    /// The external executable could not be spawned.
    Spawn { path: PathBuf, source: io::Error },
    /// The background reader thread could not be started.
    ReaderSpawn(io::Error),
    /// Writing a frame to the external process failed.
    Write { node: NodeId, source: io::Error },
    /// A frame does not fit into the outbound scratch buffer.
    FrameTooLarge { node: NodeId, len: usize, max: usize },
    /// A second device was attached to an already bridged link.
    AlreadyBridged(NodeId),
    /// The link was used before a bridged device was attached.
    NotBridged(NodeId),
    /// The link was asked to send without a MAC layer.
    MacUnset(NodeId),
    /// The MAC layer was asked to transmit without a PHY.
    PhyUnset(NodeId),
    /// The PHY was asked to transmit without being attached to a medium.
    MediumUnset(NodeId),
    /// A PHY taking part in a transmission has no position provider.
    MobilityUnset(NodeId),
    /// The medium has no propagation loss model.
    LossModelUnset,
    /// The medium has no propagation delay model.
    DelayModelUnset,
    /// `send_from` is not available on the socket bridge.
    SendFromUnsupported(NodeId),
    /// A textual hardware address could not be parsed.
    InvalidAddress(String),
    /// A model or configuration parameter is out of range.
    InvalidParameter(String),
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::TransportAlreadyOpen(node) => {
                write!(f, "link on node {} already has an open transport", node)
            }
            BridgeError::TransportCreate(err) => write!(f, "failed to create IPC socket pair: {}", err),
            BridgeError::Spawn { path, source } => {
                write!(f, "failed to spawn external process {}: {}", path.display(), source)
            }
            BridgeError::ReaderSpawn(err) => write!(f, "failed to start reader thread: {}", err),
            BridgeError::Write { node, source } => {
                write!(f, "write to external process of node {} failed: {}", node, source)
            }
            BridgeError::FrameTooLarge { node, len, max } => {
                write!(f, "frame of {} bytes on node {} exceeds the {} byte buffer", len, node, max)
            }
            BridgeError::AlreadyBridged(node) => write!(f, "link on node {} is already bridged", node),
            BridgeError::NotBridged(node) => write!(f, "link on node {} has no bridged device", node),
            BridgeError::MacUnset(node) => write!(f, "link on node {} has no MAC layer", node),
            BridgeError::PhyUnset(node) => write!(f, "MAC on node {} has no PHY", node),
            BridgeError::MediumUnset(node) => write!(f, "PHY on node {} is not attached to a medium", node),
            BridgeError::MobilityUnset(node) => write!(f, "PHY on node {} has no position provider", node),
            BridgeError::LossModelUnset => write!(f, "medium has no propagation loss model"),
            BridgeError::DelayModelUnset => write!(f, "medium has no propagation delay model"),
            BridgeError::SendFromUnsupported(node) => {
                write!(f, "send_from may not be called on the socket bridge of node {}", node)
            }
            BridgeError::InvalidAddress(text) => write!(f, "invalid hardware address: {:?}", text),
            BridgeError::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::TransportCreate(err) | BridgeError::ReaderSpawn(err) => Some(err),
            BridgeError::Spawn { source, .. } | BridgeError::Write { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience alias for `Result<T, BridgeError>`.
pub type BridgeResult<T> = Result<T, BridgeError>;
