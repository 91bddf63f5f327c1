//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic against the counting store:
//! - Rate limiter (admission decisions)
//! - Metrics (decision counters)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod limiter;
pub mod metrics;
pub mod ports;
