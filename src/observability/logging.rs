//! Structured logging.
//!
//! # Responsibilities
//! - Build the logger from configuration as a `tracing::Dispatch`
//! - JSON (one flattened object per line) or human-readable output on stderr
//! - Log level from config, overridable with `RUST_LOG`
//!
//! # Design Decisions
//! - The dispatch is a value: the binary installs it globally and the proxy
//!   engine keeps its own handle to emit access events under it

use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;

/// Build the logger writing to stderr.
pub fn build_dispatch(config: &ObservabilityConfig) -> Dispatch {
    build_dispatch_with_writer(config, std::io::stderr)
}

/// Build the logger writing to an arbitrary sink.
pub fn build_dispatch_with_writer<W>(config: &ObservabilityConfig, writer: W) -> Dispatch
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=debug", config.log_level)));

    if config.json_logging {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_env_filter(filter)
            .with_writer(writer)
            .finish();
        Dispatch::new(subscriber)
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .finish();
        Dispatch::new(subscriber)
    }
}

/// Logger used before configuration is available.
pub fn bootstrap_dispatch() -> Dispatch {
    build_dispatch(&ObservabilityConfig::default())
}
