//! Admission decision engine.
//!
//! The rate limiter decides whether a request from an identity is admitted,
//! using two records in the counting store:
//! - the counter at `identity.key()`, seeded with the window as its TTL
//! - the cool-down marker at `identity.block_key()`, seeded with the block
//!   duration as its TTL
//!
//! Both records expire on the store side. Per identity the store encodes a
//! small state machine: fresh, counting, blocked, and back to fresh once the
//! relevant TTL runs out.
//!
//! The read-check-increment sequence is not atomic across concurrent requests
//! for the same identity. Under concurrency the limit can be overshot by a
//! small amount bounded by the number of in-flight requests.

use crate::application::metrics::Metrics;
use crate::application::ports::{CounterStore, StoreError};
use crate::domain::identity::Identity;
use crate::domain::policy::{ClassLimits, LimitPolicy};
use std::fmt;
use std::sync::Arc;

/// Value written when a counter or block marker is created.
const SEED_VALUE: &str = "1";

/// Verdict for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDecision {
    /// Forward the request downstream
    Allow,
    /// Reject the request with 429
    Deny,
}

impl LimitDecision {
    /// Check if this decision is Allow.
    pub fn is_allow(&self) -> bool {
        matches!(self, LimitDecision::Allow)
    }

    /// Check if this decision is Deny.
    pub fn is_deny(&self) -> bool {
        matches!(self, LimitDecision::Deny)
    }
}

/// A decision could not be made because the store failed.
#[derive(Debug)]
pub enum AdmissionError {
    /// Store operation on `key` failed
    Store {
        /// Key being read or written
        key: String,
        /// Underlying store failure
        source: StoreError,
    },
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::Store { key, source } => {
                write!(f, "admission check failed on '{}': {}", key, source)
            }
        }
    }
}

impl std::error::Error for AdmissionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AdmissionError::Store { source, .. } => Some(source),
        }
    }
}

fn on_key(key: &str) -> impl FnOnce(StoreError) -> AdmissionError + '_ {
    move |source| AdmissionError::Store {
        key: key.to_string(),
        source,
    }
}

/// Coordinates admission decisions against a counting store.
#[derive(Debug, Clone)]
pub struct RateLimiter<S> {
    store: S,
    policy: Arc<LimitPolicy>,
    metrics: Metrics,
}

impl<S> RateLimiter<S>
where
    S: CounterStore,
{
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// * `store` - Shared counting store
    /// * `policy` - Per-class limits, immutable for the limiter's lifetime
    /// * `metrics` - Metrics tracker
    pub fn new(store: S, policy: Arc<LimitPolicy>, metrics: Metrics) -> Self {
        Self {
            store,
            policy,
            metrics,
        }
    }

    /// Decide whether a request from `identity` is admitted.
    ///
    /// # Returns
    /// A `LimitDecision`. Denial is a normal outcome, not an error.
    ///
    /// # Errors
    /// Returns `AdmissionError` when the store fails. A counter holding a
    /// non-numeric value is not an error: it is logged and the request is
    /// allowed.
    pub async fn check(&self, identity: &Identity) -> Result<LimitDecision, AdmissionError> {
        let result = self.decide(identity).await;

        match &result {
            Ok(LimitDecision::Allow) => self.metrics.record_allowed(),
            Ok(LimitDecision::Deny) => self.metrics.record_denied(),
            Err(_) => self.metrics.record_store_error(),
        }

        result
    }

    async fn decide(&self, identity: &Identity) -> Result<LimitDecision, AdmissionError> {
        let block_key = identity.block_key();
        if self
            .store
            .get(&block_key)
            .await
            .map_err(on_key(&block_key))?
            .is_some()
        {
            tracing::debug!(identity = %identity, "request denied during cool-down");
            return Ok(LimitDecision::Deny);
        }

        let key = identity.key();
        let limits = self.policy.limits(identity.class());

        let Some(raw) = self.store.get(key).await.map_err(on_key(key))? else {
            self.store
                .set_with_expiry(key, SEED_VALUE, limits.window())
                .await
                .map_err(on_key(key))?;
            return Ok(LimitDecision::Allow);
        };

        let count = match raw.trim().parse::<i64>() {
            Ok(count) => count,
            Err(e) => {
                self.metrics.record_malformed();
                tracing::warn!(
                    identity = %identity,
                    value = %raw,
                    error = %e,
                    "stored request counter is not an integer, allowing request"
                );
                return Ok(LimitDecision::Allow);
            }
        };

        if count >= i64::from(limits.max_requests()) {
            self.trigger_block(identity, &block_key, limits).await?;
            return Ok(LimitDecision::Deny);
        }

        let updated = self.store.increment(key).await.map_err(on_key(key))?;
        if updated == 1 {
            // Counter expired between the read and the increment; the store
            // recreated it without a TTL.
            self.store
                .set_with_expiry(key, SEED_VALUE, limits.window())
                .await
                .map_err(on_key(key))?;
        }

        Ok(LimitDecision::Allow)
    }

    async fn trigger_block(
        &self,
        identity: &Identity,
        block_key: &str,
        limits: ClassLimits,
    ) -> Result<(), AdmissionError> {
        self.store
            .set_with_expiry(block_key, SEED_VALUE, limits.block())
            .await
            .map_err(on_key(block_key))?;

        self.metrics.record_block();
        tracing::info!(
            identity = %identity,
            class = %identity.class(),
            limit = limits.max_requests(),
            block_secs = limits.block().as_secs(),
            "request budget exhausted, identity blocked"
        );

        Ok(())
    }

    /// Get a reference to the policy.
    pub fn policy(&self) -> &LimitPolicy {
        &self.policy
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
