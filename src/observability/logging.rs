//! Structured logging.
//!
//! Builds the `tracing` subscriber from `--log.level` and `--log.subsystems`.
//! `RUST_LOG` replaces the computed filter when set.

use std::str::FromStr;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Subsystem names accepted by `--log.subsystems` and the module targets they
/// enable at `trace`.
pub const SUBSYSTEMS: &[(&str, &[&str])] = &[
    ("netmap", &["cluster_proxy::netmap"]),
    ("gossip", &["cluster_proxy::gossip"]),
    ("proxy", &["cluster_proxy::routing", "cluster_proxy::http"]),
    ("upstream", &["cluster_proxy::upstream"]),
    ("admin", &["cluster_proxy::admin"]),
    ("lifecycle", &["cluster_proxy::lifecycle"]),
    ("config", &["cluster_proxy::config"]),
];

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("unknown log level: {0:?}")]
    UnknownLevel(String),
    #[error("unknown log subsystem: {0:?}")]
    UnknownSubsystem(String),
    #[error("invalid log filter: {0}")]
    Filter(String),
}

pub fn is_known_level(level: &str) -> bool {
    LevelFilter::from_str(level).is_ok()
}

pub fn is_known_subsystem(name: &str) -> bool {
    SUBSYSTEMS.iter().any(|(known, _)| *known == name)
}

/// Filter directives for the given level and subsystems.
pub fn directives(level: &str, subsystems: &[String]) -> Result<String, LoggingError> {
    if !is_known_level(level) {
        return Err(LoggingError::UnknownLevel(level.to_string()));
    }
    let mut directives = vec![level.to_lowercase()];
    for name in subsystems {
        let (_, targets) = SUBSYSTEMS
            .iter()
            .find(|(known, _)| *known == name.as_str())
            .ok_or_else(|| LoggingError::UnknownSubsystem(name.clone()))?;
        directives.extend(targets.iter().map(|target| format!("{target}=trace")));
    }
    Ok(directives.join(","))
}

/// Install the global subscriber.
pub fn init(level: &str, subsystems: &[String]) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directives(level, subsystems)?)
            .map_err(|e| LoggingError::Filter(e.to_string()))?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| LoggingError::Filter(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystems_enable_trace_for_their_modules() {
        let d = directives("warn", &["gossip".into(), "proxy".into()]).unwrap();
        assert_eq!(
            d,
            "warn,cluster_proxy::gossip=trace,cluster_proxy::routing=trace,cluster_proxy::http=trace"
        );
    }

    #[test]
    fn rejects_unknown_names() {
        assert!(matches!(
            directives("loud", &[]),
            Err(LoggingError::UnknownLevel(_))
        ));
        assert!(matches!(
            directives("info", &["disk".into()]),
            Err(LoggingError::UnknownSubsystem(_))
        ));
    }
}
