//! Simulation kernel consumed by the bridge and the emulated medium.
//!
//! - `time`: simulated timestamps and node identity
//! - `scheduler`: event queue, cancellation, node contexts, cross-thread injection
//! - `clock`: wall-clock pacing for realtime runs

pub mod clock;
pub mod scheduler;
pub mod time;

pub use clock::ClockMode;
pub use scheduler::{EventFn, EventId, Injector, InjectorId, Simulator};
pub use time::{NodeId, SimTime};
