//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges (timeouts > 0, probe timeout below
//!   probe interval)
//! - Validate identifiers and log settings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before any listener is bound

use std::fmt;

use crate::config::schema::ServerConfig;
use crate::net::addr::{parse_bind_addr, split_host_port, validate_advertise_addr};
use crate::netmap::is_valid_node_id;
use crate::observability::logging;

/// One semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `gossip.fanout`.
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

#[derive(Default)]
struct Errors(Vec<ValidationError>);

impl Errors {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(ValidationError {
            field,
            message: message.into(),
        });
    }

    fn positive(&mut self, field: &'static str, value: u64) {
        if value == 0 {
            self.push(field, "must be greater than zero");
        }
    }

    fn bind_addr(&mut self, field: &'static str, addr: &str) {
        if let Err(e) = parse_bind_addr(addr) {
            self.push(field, e.to_string());
        }
    }

    fn advertise_addr(&mut self, field: &'static str, addr: Option<&str>) {
        if let Some(Err(e)) = addr.map(validate_advertise_addr) {
            self.push(field, e.to_string());
        }
    }
}

/// Check every semantic rule, reporting all violations.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Errors::default();

    let proxy = &config.proxy;
    errors.bind_addr("proxy.bind_addr", &proxy.bind_addr);
    errors.advertise_addr("proxy.advertise_addr", proxy.advertise_addr.as_deref());
    errors.positive("proxy.gateway_timeout_secs", proxy.gateway_timeout_secs);
    errors.positive("proxy.max_body_bytes", proxy.max_body_bytes as u64);

    let admin = &config.admin;
    errors.bind_addr("admin.bind_addr", &admin.bind_addr);
    errors.advertise_addr("admin.advertise_addr", admin.advertise_addr.as_deref());

    let gossip = &config.gossip;
    errors.bind_addr("gossip.bind_addr", &gossip.bind_addr);
    errors.advertise_addr("gossip.advertise_addr", gossip.advertise_addr.as_deref());
    errors.positive("gossip.interval_ms", gossip.interval_ms);
    errors.positive("gossip.fanout", gossip.fanout as u64);
    errors.positive("gossip.probe_interval_ms", gossip.probe_interval_ms);
    errors.positive("gossip.probe_timeout_ms", gossip.probe_timeout_ms);
    errors.positive("gossip.suspicion_timeout_ms", gossip.suspicion_timeout_ms);
    errors.positive("gossip.reap_delay_ms", gossip.reap_delay_ms);
    errors.positive("gossip.join_timeout_ms", gossip.join_timeout_ms);
    if gossip.probe_timeout_ms >= gossip.probe_interval_ms {
        errors.push(
            "gossip.probe_timeout_ms",
            "must be less than gossip.probe_interval_ms",
        );
    }

    if let Some(id) = &config.cluster.node_id {
        if !is_valid_node_id(id) {
            errors.push(
                "cluster.node_id",
                format!("{id:?} must be 1-64 characters of [A-Za-z0-9._-]"),
            );
        }
    }
    for entry in &config.cluster.join {
        if let Err(e) = split_host_port(entry, 1) {
            errors.push("cluster.join", e.to_string());
        }
    }

    errors.positive(
        "server.graceful_shutdown_timeout_secs",
        config.server.graceful_shutdown_timeout_secs,
    );

    if !logging::is_known_level(&config.log.level) {
        errors.push("log.level", format!("unknown level {:?}", config.log.level));
    }
    for name in &config.log.subsystems {
        if !logging::is_known_subsystem(name) {
            errors.push("log.subsystems", format!("unknown subsystem {name:?}"));
        }
    }

    if errors.0.is_empty() {
        Ok(())
    } else {
        Err(errors.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = ServerConfig::default();
        config.proxy.bind_addr = "nope".into();
        config.proxy.gateway_timeout_secs = 0;
        config.gossip.fanout = 0;
        config.gossip.probe_timeout_ms = config.gossip.probe_interval_ms;
        config.cluster.node_id = Some("bad id".into());
        config.cluster.join = vec!["".into()];
        config.log.level = "chatty".into();
        config.log.subsystems = vec!["disk".into()];

        let fields: Vec<&str> = validate_config(&config)
            .unwrap_err()
            .iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(
            fields,
            [
                "proxy.bind_addr",
                "proxy.gateway_timeout_secs",
                "gossip.fanout",
                "gossip.probe_timeout_ms",
                "cluster.node_id",
                "cluster.join",
                "log.level",
                "log.subsystems",
            ]
        );
    }

    #[test]
    fn advertise_addr_needs_a_port() {
        let mut config = ServerConfig::default();
        config.gossip.advertise_addr = Some("10.0.0.5".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "gossip.advertise_addr");
    }
}
