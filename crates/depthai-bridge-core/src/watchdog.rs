//! Liveness watchdog for the device pipeline.
//!
//! A device which stops delivering packets looks the same as a hung
//! process. The [Watchdog] bounds that silence to one timeout: every
//! non-empty poll pushes the deadline forward, and an empty poll past
//! the deadline is reported as expired.

use std::time::{Duration, Instant};

/// Timeout applied when the configuration does not override it.
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of monotonic time for the dispatch loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// [Clock] backed by [Instant::now].
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// The outcome of feeding one poll result to the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Packets arrived and the deadline was pushed forward.
    Fed,
    /// No packets, but the deadline has not passed yet.
    Waiting,
    /// No packets and the deadline has passed.
    Expired,
}

/// Tracks the instant after which the pipeline is considered stalled.
#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout: Duration,
    deadline: Instant,
}

impl Watchdog {
    /// Create a watchdog armed at `now`.
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            deadline: now + timeout,
        }
    }

    /// Set the deadline to one timeout after `now`.
    pub fn reset(&mut self, now: Instant) {
        self.deadline = now + self.timeout;
    }

    /// Returns true iff `now` is strictly past the deadline.
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.deadline
    }

    /// Feed the size of a polled batch.
    ///
    /// A non-empty batch resets the deadline. An empty batch leaves it
    /// untouched and checks for expiry.
    pub fn observe(&mut self, batch_len: usize, now: Instant) -> Verdict {
        if batch_len > 0 {
            self.reset(now);
            Verdict::Fed
        } else if self.is_expired(now) {
            Verdict::Expired
        } else {
            Verdict::Waiting
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before expiry, zero once the deadline has passed.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}
