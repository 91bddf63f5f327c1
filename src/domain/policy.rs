//! Per-class request budgets.
//!
//! A [`LimitPolicy`] holds one [`ClassLimits`] per [`IdentityClass`] plus the
//! single allow-listed token. It is built once at startup and shared
//! read-only afterwards.

use crate::domain::identity::IdentityClass;
use std::fmt;
use std::time::Duration;

/// Longest window or cool-down accepted, in seconds.
///
/// Redis rejects an `EX` whose expiry in milliseconds, added to the current
/// time, overflows an `i64`. The cap leaves room for clocks up to the year 2100.
pub const MAX_DURATION_SECS: u64 = i64::MAX as u64 / 1000 - 4_102_444_800;

/// Error returned when limits are out of range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A class must allow at least one request per window
    ZeroMaxRequests,
    /// Window length must be at least one second
    ZeroWindow,
    /// Block duration must be at least one second
    ZeroBlock,
    /// Window or block duration exceeds [`MAX_DURATION_SECS`]
    DurationTooLong(u64),
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::ZeroMaxRequests => write!(f, "max_requests must be greater than 0"),
            PolicyError::ZeroWindow => write!(f, "window must be at least one second"),
            PolicyError::ZeroBlock => write!(f, "block duration must be at least one second"),
            PolicyError::DurationTooLong(secs) => write!(
                f,
                "duration of {} seconds exceeds the maximum of {}",
                secs, MAX_DURATION_SECS
            ),
        }
    }
}

impl std::error::Error for PolicyError {}

/// Budget for one identity class.
///
/// # Example
/// ```
/// use http_throttle::ClassLimits;
/// use std::time::Duration;
///
/// let limits = ClassLimits::new(10, 60, 300).unwrap();
/// assert_eq!(limits.max_requests(), 10);
/// assert_eq!(limits.window(), Duration::from_secs(60));
/// assert_eq!(limits.block(), Duration::from_secs(300));
///
/// assert!(ClassLimits::new(0, 60, 300).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassLimits {
    max_requests: u32,
    window: Duration,
    block: Duration,
}

impl ClassLimits {
    /// Create limits for a class.
    ///
    /// # Arguments
    /// * `max_requests` - Requests allowed per window
    /// * `window_secs` - Fixed window length in seconds
    /// * `block_secs` - Cool-down length in seconds once the budget is spent
    ///
    /// # Errors
    /// Returns `PolicyError` if any argument is zero, or if a duration is
    /// longer than [`MAX_DURATION_SECS`].
    pub fn new(max_requests: u32, window_secs: u64, block_secs: u64) -> Result<Self, PolicyError> {
        if max_requests == 0 {
            return Err(PolicyError::ZeroMaxRequests);
        }
        if window_secs == 0 {
            return Err(PolicyError::ZeroWindow);
        }
        if block_secs == 0 {
            return Err(PolicyError::ZeroBlock);
        }
        if let Some(&secs) = [window_secs, block_secs]
            .iter()
            .find(|&&secs| secs > MAX_DURATION_SECS)
        {
            return Err(PolicyError::DurationTooLong(secs));
        }

        Ok(Self {
            max_requests,
            window: Duration::from_secs(window_secs),
            block: Duration::from_secs(block_secs),
        })
    }

    /// Requests allowed per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Length of the counting window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Length of the cool-down period.
    pub fn block(&self) -> Duration {
        self.block
    }
}

/// Limits for every identity class plus the trusted token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitPolicy {
    ip: ClassLimits,
    token: ClassLimits,
    allowed_token: Option<String>,
}

impl LimitPolicy {
    /// Create a policy. An empty `allowed_token` is stored as `None`.
    pub fn new(ip: ClassLimits, token: ClassLimits, allowed_token: Option<String>) -> Self {
        Self {
            ip,
            token,
            allowed_token: allowed_token.filter(|t| !t.is_empty()),
        }
    }

    /// Limits that apply to `class`.
    pub fn limits(&self, class: IdentityClass) -> ClassLimits {
        match class {
            IdentityClass::Ip => self.ip,
            IdentityClass::Token => self.token,
        }
    }

    /// The allow-listed token, if any.
    pub fn allowed_token(&self) -> Option<&str> {
        self.allowed_token.as_deref()
    }
}

impl Default for LimitPolicy {
    /// 10 requests per second per IP, 100 per second for the token, a 60
    /// second cool-down for both, and no trusted token.
    fn default() -> Self {
        Self {
            ip: ClassLimits {
                max_requests: 10,
                window: Duration::from_secs(1),
                block: Duration::from_secs(60),
            },
            token: ClassLimits {
                max_requests: 100,
                window: Duration::from_secs(1),
                block: Duration::from_secs(60),
            },
            allowed_token: None,
        }
    }
}
