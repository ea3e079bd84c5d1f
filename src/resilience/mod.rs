//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Forward to owner fails:
//!     → retries.rs (connect failure? empty body? owner changed?)
//!     → one retry against the re-resolved owner, or the original error
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every forward and upstream round trip has a deadline
//! - A single retry at most; unbounded retries cascade load across the cluster

pub mod retries;
