//! Wall-clock source for the in-process store.
//!
//! `MemoryStore` asks a [`Clock`] when deciding whether a key has outlived
//! its TTL. Production code uses [`SystemClock`]; tests swap in `MockClock`
//! (from `crate::infrastructure::mocks`, enabled by the `test-helpers`
//! feature) to move time forward without sleeping.

use crate::application::ports::Clock;
use std::time::Instant;

/// Monotonic clock reading `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
