//! Tracing setup for harness binaries.
//!
//! Diagnostics from failed probes are emitted under the
//! `surface_probe::diagnostic` target, so they can be filtered separately
//! from harness chatter (e.g. `RUST_LOG=warn,surface_probe::diagnostic=info`).

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the filter: `RUST_LOG` when set, otherwise `level` for everything
/// with probe diagnostics always at least `info`.
pub fn default_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let diagnostic_level = if level > Level::INFO { level } else { Level::INFO };
        EnvFilter::new(format!(
            "{},surface_probe::diagnostic={}",
            level.as_str().to_ascii_lowercase(),
            diagnostic_level.as_str().to_ascii_lowercase()
        ))
    })
}

/// Install the global subscriber. `json` switches to newline-delimited JSON.
///
/// Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = default_filter(level);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json().with_writer(std::io::stderr))
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
