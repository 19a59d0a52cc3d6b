//! Time system for delta-time driven simulation
//!
//! Provides monotonic time for the timing core:
//! - `Timestamp` - Milliseconds on a monotonic timeline
//! - `TimeSource` - Injected provider of "now"
//! - `ManualClock` - Synthetic time for tests and replays
//! - `MonotonicClock` - Wall-clock backed source for real play
//! - `Clock` - Per-tick bookkeeping (tick count and delta)

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::time::Instant;

/// A discrete tick identifier (frame counter)
pub type Tick = u64;

/// A point on the monotonic timeline, in milliseconds
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The origin of the timeline
    pub const ZERO: Timestamp = Timestamp(0);

    /// Create a timestamp from milliseconds
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Create a timestamp from whole seconds
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1000)
    }

    /// Get the raw millisecond value
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Timestamp `ms` milliseconds later
    pub const fn add_ms(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is later
    pub const fn saturating_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}s", self.0 / 1000, self.0 % 1000)
    }
}

/// A monotonic source of "now"
///
/// Injected into [`Game`](crate::Game) instead of reading a global clock.
pub trait TimeSource {
    /// Current time on the monotonic timeline
    fn now(&self) -> Timestamp;
}

/// Synthetic time that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    /// Create a clock at the given time
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Cell::new(start.0),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, at: Timestamp) {
        self.now.set(at.0);
    }

    /// Move forward by `ms` milliseconds
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now.get())
    }
}

/// Real time, measured from the moment the clock was created
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start a clock at timestamp zero
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.origin.elapsed().as_millis();
        Timestamp(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }
}

/// Per-tick bookkeeping for the simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clock {
    /// Number of ticks processed
    pub tick: Tick,
    /// Time of the most recent tick
    pub now: Timestamp,
    /// Milliseconds between the last two ticks
    pub delta_ms: u64,
}

impl Clock {
    /// Create a clock positioned at `start`
    pub fn new(start: Timestamp) -> Self {
        Self {
            tick: 0,
            now: start,
            delta_ms: 0,
        }
    }

    /// Advance to `now`, returning the delta in milliseconds
    ///
    /// Returns `None` and leaves the clock untouched if `now` is earlier than
    /// the previous tick.
    pub fn advance_to(&mut self, now: Timestamp) -> Option<u64> {
        if now < self.now {
            return None;
        }
        self.delta_ms = now.saturating_since(self.now);
        self.now = now;
        self.tick += 1;
        Some(self.delta_ms)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(Timestamp::ZERO)
    }
}
