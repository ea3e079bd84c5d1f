//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! config bind addresses
//!     → addr.rs (parse, derive advertise addresses)
//!     → listener.rs (bind TCP/UDP, fatal on failure)
//!     → hand off to proxy, admin and gossip servers
//!
//! connection.rs: IDs for upstream sessions, in-flight counts for drains
//! ```

pub mod addr;
pub mod connection;
pub mod listener;
