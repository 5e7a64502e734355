//! Wall-clock pacing for realtime runs.
//!
//! Maps simulated time onto host time with an adjustable speed factor so the
//! scheduler can wait for an event's real deadline and stamp frames injected by
//! reader threads with the simulated time at which they arrived.

use std::time::{Duration, Instant};

use super::time::SimTime;

// Fixed-point Q32.32 for speed scaling. 1.0 == 1<<32
const ONE_Q32: u64 = 1u64 << 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClockMode {
    /// Dispatch events back to back; simulated time is decoupled from the host.
    #[default]
    AsFastAsPossible,
    /// Pace events against the host clock and keep running while reader threads are attached.
    Realtime,
}

#[derive(Debug)]
pub(crate) struct WallClock {
    origin_real: Instant,
    origin_virtual: SimTime,
    scale_q32: u64,
    last_set_percent: u32,
}

fn scale_for_percent(percent: u32) -> u64 {
    ((percent as u128) * (ONE_Q32 as u128) / 100u128) as u64
}

impl WallClock {
    /// Anchor `origin_virtual` to the current host instant.
    pub(crate) fn start(origin_virtual: SimTime, percent: u32) -> Self {
        let percent = percent.clamp(1, 1000);
        WallClock {
            origin_real: Instant::now(),
            origin_virtual,
            scale_q32: scale_for_percent(percent),
            last_set_percent: percent,
        }
    }

    pub(crate) fn speed_percent(&self) -> u32 {
        self.last_set_percent
    }

    pub(crate) fn to_virtual(&self, real: Instant) -> SimTime {
        let real_dt = real.saturating_duration_since(self.origin_real);
        let scaled = (real_dt.as_nanos() * (self.scale_q32 as u128) / (ONE_Q32 as u128)).min(u64::MAX as u128) as u64;
        SimTime::from_nanos(self.origin_virtual.as_nanos().saturating_add(scaled))
    }

    pub(crate) fn to_real(&self, target: SimTime) -> Instant {
        // Targets before the anchor are already due.
        let virt_dt = match target.checked_since(self.origin_virtual) {
            Some(dt) => dt,
            None => return self.origin_real,
        };
        let real_ns = virt_dt.as_nanos() * (ONE_Q32 as u128) / (self.scale_q32 as u128);
        self.origin_real + Duration::from_nanos(real_ns.min(u64::MAX as u128) as u64)
    }

    /// Change the speed factor without moving the simulated time of the current host instant.
    pub(crate) fn set_speed_percent(&mut self, percent: u32) {
        let percent = percent.clamp(1, 1000);
        if percent == self.last_set_percent {
            return;
        }
        let r_now = Instant::now();
        let v_now_old = self.to_virtual(r_now);
        let new_scale_q32 = scale_for_percent(percent);

        // Only origin_real moves, so deadlines already mapped never end up in the past.
        let delta_v = v_now_old.saturating_since(self.origin_virtual).as_nanos();
        let real_elapsed_new_ns = delta_v * (ONE_Q32 as u128) / (new_scale_q32 as u128);
        let dur = Duration::from_nanos(real_elapsed_new_ns.min(u64::MAX as u128) as u64);
        self.origin_real = r_now.checked_sub(dur).unwrap_or(r_now);
        self.scale_q32 = new_scale_q32;
        self.last_set_percent = percent;
    }
}
