//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use async_trait::async_trait;
use std::error::Error;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Failure talking to the counting store.
///
/// A missing key is not an error: [`CounterStore::get`] reports it as `Ok(None)`.
#[derive(Debug)]
pub enum StoreError {
    /// Transport or protocol failure in the backend
    Backend(Box<dyn Error + Send + Sync>),
    /// `increment` hit a value that is not an integer
    NotNumeric {
        /// Key holding the bad value
        key: String,
    },
}

impl StoreError {
    /// Wrap a backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(e) => write!(f, "counting store failure: {}", e),
            StoreError::NotNumeric { key } => {
                write!(f, "value at '{}' is not an integer", key)
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Backend(e) => Some(e.as_ref()),
            StoreError::NotNumeric { .. } => None,
        }
    }
}

/// Port for the shared counting store.
///
/// Keys expire on the store side; the application never deletes or sweeps.
/// Infrastructure provides concrete implementations (MemoryStore, RedisStore).
#[async_trait]
pub trait CounterStore: Send + Sync + Debug {
    /// Read the value at `key`.
    ///
    /// # Returns
    /// `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Create or overwrite `key` with a time-to-live.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration)
        -> Result<(), StoreError>;

    /// Atomically increment the integer at `key` and return the new value.
    ///
    /// A missing key is created with value 1 and no expiry.
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;
}

#[async_trait]
impl<T> CounterStore for Arc<T>
where
    T: CounterStore + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        (**self).set_with_expiry(key, value, ttl).await
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        (**self).increment(key).await
    }
}

/// Port for obtaining current time.
///
/// This abstraction lets the in-process store evaluate expiry without
/// depending on the system clock. Infrastructure provides concrete
/// implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}
