//! Socket-bridge radio simulator.
//!
//! Real processes exchange frames over OS sockets while a discrete-event
//! simulation carries those frames across an emulated radio channel.
//!
//! - `bridge`: the external-process link and its process lifecycle
//! - `radio`: pass-through MAC, PHY timing and energy detection, shared medium
//! - `propagation`: positions, loss and delay models
//! - `simulation`: event scheduler, simulated time and realtime pacing
//! - `network`: installs complete node stacks from a scene
//! - `common`, `control`: scene and bridge configuration files

pub mod address;
pub mod bridge;
pub mod common;
pub mod control;
pub mod device;
pub mod error;
pub mod frame;
pub mod network;
pub mod propagation;
pub mod radio;
pub mod simulation;
pub mod trace;

#[cfg(test)]
mod test_support;

pub use error::{BridgeError, BridgeResult};
