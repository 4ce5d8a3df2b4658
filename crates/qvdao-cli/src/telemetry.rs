//! `tracing` subscriber setup for the CLI.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Output goes to stderr so reports on stdout
/// stay machine-readable.
pub fn init_telemetry(directive: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(directive)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("installing log subscriber: {}", e))
}
