//! Monotonic time source, testable without sleeping real time.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A clock that provides the current monotonic time.
///
/// Every timing decision in the daemon (liveness windows, backoff,
/// blink phase, fade progress) reads through this trait instead of calling
/// `Instant::now()` directly, so tests can drive the clock deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Real monotonic clock backed by `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Fake clock for tests: starts at an arbitrary epoch and only advances when
/// told to.
pub struct FakeClock {
    current: Mutex<Instant>,
}

impl FakeClock {
    pub fn new() -> Self {
        FakeClock {
            current: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut guard = self.current.lock().expect("fake clock mutex poisoned");
        *guard += duration;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock().expect("fake clock mutex poisoned")
    }
}
