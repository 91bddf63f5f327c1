//! Caller identities for admission control.
//!
//! An identity names the budget a request is counted against. Two classes
//! exist:
//! - **Token**: the caller presented the single allow-listed token
//! - **Ip**: everyone else, keyed by the remote host address
//!
//! Keys are namespaced (`"ip:"` / `"token:"`) so the two classes can never
//! share a counter, even when an address string equals a token string.

use std::fmt;

const IP_PREFIX: &str = "ip:";
const TOKEN_PREFIX: &str = "token:";
const BLOCKED_SUFFIX: &str = ":blocked";

/// The class an identity belongs to. Selects the limits that apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityClass {
    /// Anonymous caller, limited per remote address
    Ip,
    /// Caller holding the allow-listed token
    Token,
}

impl IdentityClass {
    /// Lower-case name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityClass::Ip => "ip",
            IdentityClass::Token => "token",
        }
    }
}

impl fmt::Display for IdentityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved caller identity: the counting key plus its class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    key: String,
    class: IdentityClass,
}

impl Identity {
    /// Identity for a remote host (port already stripped).
    pub fn ip(host: &str) -> Self {
        Self {
            key: format!("{IP_PREFIX}{host}"),
            class: IdentityClass::Ip,
        }
    }

    /// Identity for the allow-listed token.
    pub fn token(token: &str) -> Self {
        Self {
            key: format!("{TOKEN_PREFIX}{token}"),
            class: IdentityClass::Token,
        }
    }

    /// Store key of the request counter.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Class of this identity.
    pub fn class(&self) -> IdentityClass {
        self.class
    }

    /// Store key of the cool-down marker.
    pub fn block_key(&self) -> String {
        format!("{}{BLOCKED_SUFFIX}", self.key)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Maps request attributes to an [`Identity`].
///
/// The trust policy is single-tenant: exactly one token is recognised. Any
/// other token value is ignored and the caller falls back to IP-based
/// counting.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    allowed_token: Option<String>,
}

impl IdentityResolver {
    /// Create a resolver trusting `allowed_token`.
    ///
    /// An empty token is the same as none: no header value will ever match.
    pub fn new(allowed_token: Option<String>) -> Self {
        Self {
            allowed_token: allowed_token.filter(|t| !t.is_empty()),
        }
    }

    /// Resolve the identity of a request.
    ///
    /// # Arguments
    /// * `api_key` - Value of the token header, if present
    /// * `remote_addr` - Caller address, normally in `host:port` form
    pub fn resolve(&self, api_key: Option<&str>, remote_addr: &str) -> Identity {
        match (api_key, self.allowed_token.as_deref()) {
            (Some(presented), Some(allowed)) if !presented.is_empty() && presented == allowed => {
                Identity::token(presented)
            }
            _ => Identity::ip(strip_port(remote_addr)),
        }
    }
}

/// Strip the port from a `host:port` address.
///
/// Handles bracketed IPv6 (`[::1]:8080`). Input without a numeric port,
/// including a bare IPv6 literal, is returned unchanged.
pub fn strip_port(addr: &str) -> &str {
    let host = match addr.rsplit_once(':') {
        Some((host, port))
            if !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit())
                && (!host.contains(':') || host.starts_with('[')) =>
        {
            host
        }
        _ => addr,
    };

    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}
