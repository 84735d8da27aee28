//! Tracing/logging initialization.
//!
//! JSON logs with timestamps; the filter comes from `RUST_LOG` or from the
//! caller. [`json_subscriber`] builds the subscriber without installing it,
//! so tests and embedding processes can scope it with
//! `tracing::subscriber::with_default`.

use tracing_subscriber::EnvFilter;

/// Build (but do not install) the JSON subscriber.
pub fn json_subscriber(filter: EnvFilter) -> impl ::tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .finish()
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    install(filter);
}

/// Initialize with explicit directives (e.g. `"forgepay_infra=debug,info"`).
///
/// Falls back to `info` if the directives do not parse.
pub fn init_with_filter(directives: &str) {
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));
    install(filter);
}

fn install(filter: EnvFilter) {
    let _ = ::tracing::subscriber::set_global_default(json_subscriber(filter));
}
