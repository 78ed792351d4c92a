//! `tracing` subscriber setup for binaries and tests.

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (for example `"info"` or `"waylink=debug"`).
///
/// Does nothing if a global subscriber is already installed.
pub fn init(default_directive: &str) {
    let _ = try_init(default_directive);
}

/// Like [`init`], but reports whether this call installed the subscriber.
pub fn try_init(default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
