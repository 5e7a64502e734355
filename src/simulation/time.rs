//! Simulated time and node identity.
//!
//! `SimTime` is an absolute point on the simulated timeline with nanosecond
//! resolution. It only advances when the scheduler dispatches an event.
//! Relative delays are plain `std::time::Duration` values.

use std::time::Duration;

/// Absolute simulated time in nanoseconds since the start of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(u64);

impl SimTime {
    /// The zero-point of simulated time.
    pub const ZERO: SimTime = SimTime(0);

    #[inline]
    pub fn from_nanos(nanos: u64) -> Self {
        SimTime(nanos)
    }

    #[inline]
    pub fn from_micros(micros: u64) -> Self {
        SimTime(micros.saturating_mul(1_000))
    }

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        SimTime(millis.saturating_mul(1_000_000))
    }

    #[inline]
    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// Offset from the zero-point as a `Duration`.
    #[inline]
    pub fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0)
    }

    /// The point `delay` after `self`. Saturates at the end of time.
    #[inline]
    pub fn after(self, delay: Duration) -> SimTime {
        let delta = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        SimTime(self.0.saturating_add(delta))
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is in the future.
    #[inline]
    pub fn saturating_since(self, earlier: SimTime) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Returns `None` when `earlier` is after `self`.
    #[inline]
    pub fn checked_since(self, earlier: SimTime) -> Option<Duration> {
        self.0.checked_sub(earlier.0).map(Duration::from_nanos)
    }
}

impl std::ops::Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        self.after(rhs)
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "+{}.{:09}s", self.0 / 1_000_000_000, self.0 % 1_000_000_000)
    }
}

/// Identity of a simulated node. Scheduled events carry it as their context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        NodeId(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}", self.0)
    }
}
