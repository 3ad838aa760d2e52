//! Logging setup shared by the host and agent binaries.
//!
//! Logs always go to stderr: the agent hook's stdout carries its verdict and
//! the host's `replay` command prints the transcript there.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directives for a binary: its own crate and `parley_core` at `level`.
pub fn default_filter(binary_crate: &str, level: &str) -> String {
    format!("{binary_crate}={level},parley_core={level}")
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set. With `log_json` every
/// event is one JSON object per line.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let (json, plain) = if log_json {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json(),
            ),
            None,
        )
    } else {
        (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(plain)
        .init();
}
