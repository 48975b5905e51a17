//! RBAC reverse-proxy gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                              ┌───────────────────────────────────────────────────┐
//!                              │                   RBAC GATEWAY                     │
//!     Client Request           │  ┌─────────┐    ┌───────────┐    ┌────────────┐    │
//!     ─────────────────────────┼─▶│  http   │───▶│   auth    │───▶│    rbac    │    │
//!                              │  │ server  │    │ extractor │    │ evaluator  │    │
//!                              │  └─────────┘    └───────────┘    └─────┬──────┘    │
//!                              │                                        │ allow     │
//!                              │                                        ▼           │
//!     Client Response          │  ┌─────────┐    ┌───────────┐    ┌────────────┐    │
//!     ◀────────────────────────┼──│  proxy  │◀───│  decoding │◀───│  upstream  │◀───┼──── Upstream
//!                              │  │ engine  │    │ transport │    │   target   │    │
//!                              │  └────┬────┘    └───────────┘    └────────────┘    │
//!                              │       ▼                                            │
//!                              │  one access event per request (observability)      │
//!                              └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use rbac_gateway::config::load_config;
use rbac_gateway::observability::{logging, metrics};
use rbac_gateway::{HttpServer, Shutdown};

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "rbac-gateway", version, about = "Reverse proxy enforcing role-based access")]
struct Cli {
    /// Path to the configuration file (YAML or TOML).
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::dispatcher::with_default(&logging::bootstrap_dispatch(), || {
                tracing::error!(path = %cli.config.display(), error = %e, "Failed to load configuration");
            });
            std::process::exit(1);
        }
    };

    let logger = logging::build_dispatch(&config.observability);
    tracing::dispatcher::set_global_default(logger.clone())?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        target = %config.target,
        rules = config.rbac.rules.len(),
        "Configuration loaded"
    );
    if config.rbac.rules.is_empty() {
        tracing::warn!("No access rules configured; every request will be denied");
    }

    if config.observability.metrics_enabled {
        // Validation guarantees the address parses.
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();

    let server = HttpServer::new(config, logger)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
