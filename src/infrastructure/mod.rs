//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Counting stores (in-process DashMap, Redis)
//! - HTTP integration (tower Layer) and environment configuration

pub mod clock;
pub mod config;
pub mod layer;
pub mod storage;

#[cfg(feature = "redis-storage")]
pub mod redis_storage;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// http-throttle = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
