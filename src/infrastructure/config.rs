//! Environment configuration.
//!
//! Read once at startup into an immutable [`ThrottleConfig`]. Every variable
//! is optional:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DB_HOST` | `127.0.0.1:6379` |
//! | `REQUESTS_IP` / `REQUESTS_TOKEN` | `10` / `100` |
//! | `WINDOW_IP` / `WINDOW_TOKEN` | `1` / `1` (seconds) |
//! | `TIME_BLOCKED_IP` / `TIME_BLOCKED_TOKEN` | `60` / `60` (seconds) |
//! | `ALLOWED_TOKEN` | empty (no token trusted) |
//! | `API_KEY_HEADER` | `api_key` |
//! | `HOST` / `PORT` | `127.0.0.1` / `8080` |

use crate::domain::policy::{ClassLimits, LimitPolicy, PolicyError};
use crate::infrastructure::layer::DEFAULT_API_KEY_HEADER;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

/// Error raised while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Variable is set but cannot be parsed
    Invalid { var: &'static str, value: String },
    /// Values parse but do not form a valid policy
    Policy(PolicyError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => {
                write!(f, "{} has an invalid value: {:?}", var, value)
            }
            ConfigError::Policy(e) => write!(f, "invalid limits: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Policy(e) => Some(e),
            ConfigError::Invalid { .. } => None,
        }
    }
}

impl From<PolicyError> for ConfigError {
    fn from(e: PolicyError) -> Self {
        ConfigError::Policy(e)
    }
}

/// Deployment configuration.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    store_addr: String,
    policy: LimitPolicy,
    header_name: String,
    host: IpAddr,
    port: u16,
}

impl ThrottleConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    /// Returns `ConfigError` if a variable is malformed or a limit is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns `ConfigError` if a variable is malformed or a limit is out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ip = ClassLimits::new(
            parse_or(&lookup, "REQUESTS_IP", 10)?,
            parse_or(&lookup, "WINDOW_IP", 1)?,
            parse_or(&lookup, "TIME_BLOCKED_IP", 60)?,
        )?;
        let token = ClassLimits::new(
            parse_or(&lookup, "REQUESTS_TOKEN", 100)?,
            parse_or(&lookup, "WINDOW_TOKEN", 1)?,
            parse_or(&lookup, "TIME_BLOCKED_TOKEN", 60)?,
        )?;
        let allowed_token = lookup("ALLOWED_TOKEN").filter(|t| !t.is_empty());

        let store_addr = lookup("DB_HOST")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "127.0.0.1:6379".to_string());
        let header_name = lookup("API_KEY_HEADER")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string());

        Ok(Self {
            store_addr,
            policy: LimitPolicy::new(ip, token, allowed_token),
            header_name,
            host: parse_or(&lookup, "HOST", IpAddr::V4(Ipv4Addr::LOCALHOST))?,
            port: parse_or(&lookup, "PORT", 8080)?,
        })
    }

    /// Redis connection URL for the counting store.
    ///
    /// A bare `host:port` is given the `redis://` scheme.
    pub fn store_url(&self) -> String {
        if self.store_addr.contains("://") {
            self.store_addr.clone()
        } else {
            format!("redis://{}", self.store_addr)
        }
    }

    /// Per-class limits and the trusted token.
    pub fn policy(&self) -> &LimitPolicy {
        &self.policy
    }

    /// Header the caller's token is read from.
    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Address the server listens on.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::Invalid { var, value: raw })
        }
        _ => Ok(default),
    }
}
