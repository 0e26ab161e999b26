//! Terminal logging setup
//!
//! `RUST_LOG` wins when set; otherwise `level` applies to this crate and the
//! engine. Examples:
//!
//! ```bash
//! RUST_LOG=des=trace car_wash            # every event dispatch
//! RUST_LOG=car_wash=debug car_wash       # arrivals, grants and departures
//! ```
//!
//! Logs go to stderr so that `--json` output on stdout stays machine-readable.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_logging(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("car_wash={level},des={level}")));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .try_init()
        .is_ok()
}
