//! Logging setup
//!
//! Structured `tracing` output filtered by `RUST_LOG`, falling back to the
//! given default directive.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const DEFAULT_FILTER: &str = "risk_console=info";

pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

pub fn init_tracing(default_filter: &str) -> Result<()> {
    Registry::default()
        .with(env_filter(default_filter))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .context("Failed to install tracing subscriber")
}
