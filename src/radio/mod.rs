//! The emulated radio: pass-through MAC, physical layer and shared medium.

pub mod mac;
pub mod medium;
pub mod phy;
pub mod signal_calculations;

pub use mac::PassthroughMac;
pub use medium::SharedMedium;
pub use phy::{DEFAULT_TX_POWER_DBM, RadioPhy, RxOkCallback};
pub use signal_calculations::{PathLossParameters, PhyMode, PhyProfile};
