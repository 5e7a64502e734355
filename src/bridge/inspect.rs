//! Inspection of frames arriving from the external process.
//!
//! A complete MAC+PHY overlay needs the source, destination and protocol of
//! every frame the process emits. How those are laid out depends on the MAC
//! the external stack speaks, so extraction is left to a `FrameInspector`
//! supplied by whoever wires the link. The default extracts nothing.

use crate::address::Mac64Address;
use crate::frame::Frame;

/// What an inspector learned about one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    pub source: Option<Mac64Address>,
    pub destination: Option<Mac64Address>,
    pub protocol: u16,
}

pub trait FrameInspector {
    /// Return `None` to drop the frame as unfit for the simulation.
    fn inspect(&self, frame: &Frame) -> Option<FrameInfo>;
}

/// Accepts every frame and extracts no addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughInspector;

impl FrameInspector for PassthroughInspector {
    fn inspect(&self, _frame: &Frame) -> Option<FrameInfo> {
        Some(FrameInfo::default())
    }
}
