//! Admin subsystem.
//!
//! # Routes
//! ```text
//! /health                      always 200
//! /ready                       200 once joined, 503 before and while shutting down
//! /metrics                     Prometheus text from the process recorder
//! /status/{provider}/{*rest}   StatusProvider registered under {provider}
//! ```
//!
//! # Design Decisions
//! - Components expose read-only JSON; the admin server never mutates state
//! - Unknown providers and paths are 404

pub mod handlers;
pub mod server;
pub mod status;

pub use server::{AdminServer, Readiness};
pub use status::StatusProvider;
