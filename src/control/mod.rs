//! Run-time configuration of the bridged nodes.

pub mod config;

pub use config::BridgeConfig;
