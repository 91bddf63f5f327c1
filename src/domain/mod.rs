//! Domain layer - pure admission concepts with no I/O.
//!
//! - Caller identities and how they are derived from a request
//! - Per-class limit policy
//!
//! All types in this layer are pure and easily testable.

pub mod identity;
pub mod policy;
