//! Tracing setup shared by the tick runtime and the CLI.
//!
//! Two sinks behind one `EnvFilter`: human-readable lines on stdout and
//! daily-rotated NDJSON files under the configured log directory. A set
//! `RUST_LOG` overrides the configured level.

use std::path::Path;

use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Calling it again is a no-op, so tests
/// and embedded callers can both run through it.
pub fn init_logger<P: AsRef<Path>>(log_dir: P, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Rotates as `voxrank.log.YYYY-MM-DD`.
    let file_sink = rolling::daily(log_dir, "voxrank.log");

    let console = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_ansi(true);
    let file = fmt::layer().json().with_ansi(false).with_writer(file_sink);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init();
}
