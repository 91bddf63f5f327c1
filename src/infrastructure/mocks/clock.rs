//! Manually driven clock.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Clock that only moves when told to.
///
/// Lets tests walk through counting windows and cool-down periods without
/// sleeping. Clones share the same time value.
///
/// # Examples
///
/// ```
/// use http_throttle::infrastructure::mocks::MockClock;
/// use http_throttle::Clock;
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let clock = MockClock::new(start);
///
/// // Skip past a 60 second window
/// clock.advance(Duration::from_secs(61));
/// assert_eq!(clock.now(), start + Duration::from_secs(61));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: Arc<Mutex<Instant>>,
}

impl MockClock {
    /// Create a mock clock starting at a specific instant.
    pub fn new(start: Instant) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: Duration) {
        let mut time = self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        *time += duration;
    }

    /// Set the clock to a specific instant.
    pub fn set(&self, instant: Instant) {
        let mut time = self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        *time = instant;
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
    }
}
