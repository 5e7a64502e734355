//! Bridge between a simulated node and an external OS process.
//!
//! - `link`: the `ExternalProcessLink` device and its lifecycle state machine
//! - `session`: child process, socket transport and reader owned as one unit
//! - `reader`: background thread turning socket reads into injected frames
//! - `inspect`: frame inspection hook used before frames enter the simulation

pub mod inspect;
pub mod link;
pub(crate) mod reader;
pub mod session;

use std::convert::Infallible;
use std::str::FromStr;

use serde::Deserialize;

pub use inspect::{FrameInfo, FrameInspector, PassthroughInspector};
pub use link::{DEFAULT_MTU, ExternalProcessLink, LinkState, MAX_FRAME_SIZE};
pub use session::LifecycleEvent;

/// Which simulated layers the external process takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum OverlayMode {
    #[default]
    Unset,
    /// The process brings its own MAC; the simulation provides the PHY.
    PhyOverlay,
    /// The process sits on top of the simulated MAC and PHY.
    MacPhyOverlay,
}

impl FromStr for OverlayMode {
    type Err = Infallible;

    /// Unknown names select `Unset`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "MACPHYOVERLAY" => OverlayMode::MacPhyOverlay,
            "PHYOVERLAY" => OverlayMode::PhyOverlay,
            _ => OverlayMode::Unset,
        })
    }
}

impl From<String> for OverlayMode {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(mode) => mode,
            Err(never) => match never {},
        }
    }
}

impl std::fmt::Display for OverlayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OverlayMode::Unset => "UNSET",
            OverlayMode::PhyOverlay => "PHYOVERLAY",
            OverlayMode::MacPhyOverlay => "MACPHYOVERLAY",
        })
    }
}
