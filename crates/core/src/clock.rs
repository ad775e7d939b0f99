// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.
//!
//! The allocator's back-off/fizzle gates and the peer-takeover jitter are all
//! defined in terms of epoch seconds, so [`Clock`] exposes epoch seconds
//! directly rather than a monotonic `Instant` — cycle logic never needs
//! wall-clock-independent timing, only a value it can compare against
//! persisted timestamps.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time as epoch seconds.
pub trait Clock: Clone + Send + Sync {
    fn epoch_seconds(&self) -> i64;
}

/// Real system clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_seconds(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

/// Fake clock for testing with controllable time.
#[derive(Clone)]
pub struct FakeClock {
    epoch_seconds: Arc<Mutex<i64>>,
}

impl FakeClock {
    /// Starts at an arbitrary fixed epoch (1_000_000 s past the epoch) so that
    /// subtraction against zero-valued "unset" timestamps in tests is never
    /// accidentally negative.
    pub fn new() -> Self {
        Self { epoch_seconds: Arc::new(Mutex::new(1_000_000)) }
    }

    pub fn at(epoch_seconds: i64) -> Self {
        Self { epoch_seconds: Arc::new(Mutex::new(epoch_seconds)) }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        *self.epoch_seconds.lock() += duration.as_secs() as i64;
    }

    /// Advance the clock by a raw second count (negative not meaningful but not rejected).
    pub fn advance_secs(&self, secs: i64) {
        *self.epoch_seconds.lock() += secs;
    }

    /// Set the clock to a specific epoch-seconds value.
    pub fn set_epoch_seconds(&self, epoch_seconds: i64) {
        *self.epoch_seconds.lock() = epoch_seconds;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn epoch_seconds(&self) -> i64 {
        *self.epoch_seconds.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances() {
        let clock = FakeClock::at(100);
        assert_eq!(clock.epoch_seconds(), 100);
        clock.advance(Duration::from_secs(50));
        assert_eq!(clock.epoch_seconds(), 150);
    }

    #[test]
    fn fake_clock_set() {
        let clock = FakeClock::new();
        clock.set_epoch_seconds(42);
        assert_eq!(clock.epoch_seconds(), 42);
    }

    #[test]
    fn system_clock_is_plausible() {
        let clock = SystemClock;
        assert!(clock.epoch_seconds() > 1_700_000_000);
    }
}
