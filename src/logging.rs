//! tracing subscriber setup.
//!
//! Diagnostics go to stderr so the summary on stdout stays parseable.

use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "sneakr=info";

/// Install the global subscriber. `verbose` lowers the fallback to debug.
pub fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let fallback = if verbose { "sneakr=debug" } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
