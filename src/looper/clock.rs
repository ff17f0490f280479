//! Loop clock - converts wall-clock time into a looped position
//!
//! Time is read through a `TimeSource` so that tick scheduling can be driven
//! by a manual clock in tests instead of real sleeps.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of "now" for position tracking and tick scheduling
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualTimeSource {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move time forward by `delta`
    pub fn advance(&self, delta: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += delta;
    }

    pub fn advance_secs(&self, seconds: f64) {
        self.advance(Duration::from_secs_f64(seconds));
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}

/// Looped position of `now` relative to `start`, in `[0, duration)`.
pub fn position_at(now: Instant, start: Instant, duration: f64) -> f64 {
    wrap_position(now.saturating_duration_since(start).as_secs_f64(), duration)
}

/// Fold an unbounded time in seconds into `[0, duration)`.
pub fn wrap_position(seconds: f64, duration: f64) -> f64 {
    if duration <= 0.0 {
        return 0.0;
    }
    let wrapped = seconds.rem_euclid(duration);
    // rem_euclid can round up to exactly `duration` for tiny negative inputs
    if wrapped >= duration {
        0.0
    } else {
        wrapped
    }
}

/// True when going from `previous` to `new` elapsed seconds crosses a loop boundary.
pub fn did_wrap(previous: f64, new: f64, duration: f64) -> bool {
    if duration <= 0.0 {
        return false;
    }
    (new / duration).floor() > (previous / duration).floor()
}

/// Running clock anchored at a reference instant and a base position.
///
/// Position is `(base + elapsed) mod duration`.
#[derive(Debug, Clone, Copy)]
pub struct LoopClock {
    reference: Instant,
    base: f64,
}

impl LoopClock {
    pub fn new(reference: Instant, base: f64) -> Self {
        Self { reference, base }
    }

    /// Unwrapped seconds since the clock's origin (base included)
    pub fn elapsed(&self, now: Instant) -> f64 {
        self.base + now.saturating_duration_since(self.reference).as_secs_f64()
    }

    pub fn position(&self, now: Instant, duration: f64) -> f64 {
        wrap_position(self.elapsed(now), duration)
    }
}
