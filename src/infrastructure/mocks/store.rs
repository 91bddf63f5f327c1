//! Counting store that is always down.

use crate::application::ports::{CounterStore, StoreError};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Error returned by every [`FailingStore`] operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unreachable;

impl fmt::Display for Unreachable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection refused")
    }
}

impl std::error::Error for Unreachable {}

/// Store whose every call fails with a backend error.
///
/// Counts calls so tests can assert how far a decision got.
#[derive(Debug, Clone, Default)]
pub struct FailingStore {
    calls: Arc<AtomicU64>,
}

impl FailingStore {
    /// Create a new failing store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations attempted so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(StoreError::backend(Unreachable))
    }
}

#[async_trait]
impl CounterStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        self.fail()
    }

    async fn set_with_expiry(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<(), StoreError> {
        self.fail()
    }

    async fn increment(&self, _key: &str) -> Result<i64, StoreError> {
        self.fail()
    }
}
