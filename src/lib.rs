//! # http-throttle
//!
//! Per-caller HTTP admission control backed by a shared counting store.
//!
//! This crate provides a `tower::Layer` that counts requests per caller in a
//! fixed time window and, once a caller exhausts its budget, rejects every
//! request from it with `429 Too Many Requests` for a cool-down period.
//! Counters and cool-down markers live in a key-value store with per-key
//! expiry (Redis in production), so several application instances share the
//! same budgets.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use http_throttle::{ClassLimits, LimitPolicy, RedisStore, ThrottleLayer};
//! use std::net::SocketAddr;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisStore::connect("redis://127.0.0.1:6379").await?;
//!
//! let throttle = ThrottleLayer::builder(store)
//!     .with_policy(LimitPolicy::new(
//!         ClassLimits::new(10, 1, 60)?,   // 10 req/s per IP, 60s cool-down
//!         ClassLimits::new(100, 1, 60)?,  // 100 req/s for the trusted token
//!         Some("secret-token".to_string()),
//!     ))
//!     .with_header_name("api_key")
//!     .build()?;
//!
//! let app = Router::new()
//!     .route("/", get(|| async { "Hello, world!" }))
//!     .layer(throttle);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! // ConnectInfo is needed to count by remote address
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Identities
//!
//! Every request is counted against exactly one identity:
//!
//! - **Token**: the token header carries the single allow-listed token. The
//!   token class has its own (usually larger) budget.
//! - **Ip**: everything else, keyed by the remote host with the port stripped.
//!   A wrong token is ignored, not rejected.
//!
//! Store keys are `ip:<host>` and `token:<token>`; cool-down markers append
//! `:blocked`.
//!
//! ## Decision Procedure
//!
//! For each request:
//!
//! 1. A live cool-down marker means **Deny**.
//! 2. No counter yet: create it at `1` with the window as TTL, **Allow**.
//! 3. Counter at or above the limit: write the cool-down marker with the block
//!    duration as TTL, **Deny**.
//! 4. Otherwise increment the counter, **Allow**.
//!
//! A counter that does not hold an integer is logged at `warn` and the request
//! is allowed. A store failure is logged at `error` and answered with `500`.
//!
//! The read-then-write sequence is not atomic, so under concurrency a caller
//! can overshoot its limit by roughly the number of its in-flight requests.
//!
//! ## Storage Backends
//!
//! - [`MemoryStore`]: in-process DashMap, for single instances and tests
//! - [`RedisStore`]: shared across instances (feature `redis-storage`, on by
//!   default)
//!
//! Any other backend can be plugged in by implementing [`CounterStore`].
//!
//! ## Configuration
//!
//! [`ThrottleConfig::from_env`] reads the limits, the trusted token, the
//! store address and the bind address from environment variables. See the
//! [`infrastructure::config`] module for the full table.
//!
//! ## Observability
//!
//! ```rust,no_run
//! # use http_throttle::{MemoryStore, ThrottleLayer};
//! # let throttle = ThrottleLayer::builder(MemoryStore::new()).build().unwrap();
//! let snapshot = throttle.metrics().snapshot();
//! println!("allowed: {}", snapshot.requests_allowed);
//! println!("denied: {}", snapshot.requests_denied);
//! println!("denial rate: {:.2}%", snapshot.denial_rate() * 100.0);
//! ```

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    identity::{strip_port, Identity, IdentityClass, IdentityResolver},
    policy::{ClassLimits, LimitPolicy, PolicyError, MAX_DURATION_SECS},
};

pub use application::{
    limiter::{AdmissionError, LimitDecision, RateLimiter},
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, CounterStore, StoreError},
};

pub use infrastructure::{
    clock::SystemClock,
    config::{ConfigError, ThrottleConfig},
    layer::{
        BuildError, ThrottleLayer, ThrottleLayerBuilder, ThrottleService, REJECTION_BODY,
    },
    storage::MemoryStore,
};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_storage::{RedisStore, RedisStoreConfig};
