//! Cluster proxy node.
//!
//! ```text
//!                 ┌──────────────────────── node ────────────────────────┐
//!  downstream ───▶│ proxy listener ──▶ router ──▶ local upstream session │◀── upstream (WS)
//!                 │                      │                               │
//!                 │                      └──forward (one hop)──▶ owner   │
//!                 │                                                      │
//!  peers ◀──UDP──▶│ gossip ◀──▶ network map ◀── registrations            │
//!                 │                                                      │
//!  operators ────▶│ admin: /health /ready /metrics /status               │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::process::ExitCode;

use cluster_proxy::config::{load_config, Args};
use cluster_proxy::lifecycle::signals;
use cluster_proxy::observability::logging;
use cluster_proxy::Server;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid config: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.log.level, &config.log.subsystems) {
        eprintln!("invalid config: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cluster-proxy starting");

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    match server.run(signals::terminate()).await {
        Ok(()) => {
            tracing::info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "node failed");
            ExitCode::FAILURE
        }
    }
}
