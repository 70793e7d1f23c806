//! Tracing setup

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global tracing subscriber
///
/// `RUST_LOG` wins when set and valid; otherwise `level` is used as the filter.
/// Calling this more than once is harmless.
pub fn init_tracing(level: &str) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
