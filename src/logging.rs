//! Tracing subscriber setup.
//!
//! Logs go to stderr so `liveindex ask` can print answers on stdout.
//! `RUST_LOG` takes precedence over the `--log-level` flag.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(log_level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow!("Invalid log filter '{}': {}", log_level, e))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init()
    };
    installed.map_err(|e| anyhow!("Failed to init logging: {}", e))
}
