//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → args.rs (command-line flags override file values)
//!     → validation.rs (semantic checks, all errors at once)
//!     → ServerConfig (validated, immutable)
//!     → lifecycle::Server binds listeners and builds subsystems from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod args;
pub mod loader;
pub mod schema;
pub mod validation;

pub use args::Args;
pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, ClusterConfig, GossipConfig, LifecycleConfig, LogConfig, ProxyConfig,
    ServerConfig,
};
pub use validation::{validate_config, ValidationError};
