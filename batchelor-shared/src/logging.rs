//! Tracing initialization shared by every Batchelor binary.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global tracing subscriber. Reads `RUST_LOG` (default `info`)
/// and switches to JSON formatting when `BATCHELOR_LOG_FORMAT=json`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("BATCHELOR_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}
