//! Resilience helpers for optimistic concurrency.
//!
//! # Data Flow
//! ```text
//! Manager::optimistic_update:
//!     → read (version, value) → compute → conditional replace
//!     → on Conflict: retries.rs (attempt budget, jittered exponential wait) → again
//! ```
//!
//! # Design Decisions
//! - Conflicts are the only retryable failure
//! - Retry budget is small by default (3 attempts)

pub mod retries;

pub use retries::RetryPolicy;
