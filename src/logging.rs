//! Tracing initialization helper.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a global `tracing` subscriber honoring `RUST_LOG`, defaulting
/// to `info`. Safe to call multiple times; later calls are no-ops. Library
/// consumers with their own subscriber should simply not call this.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}
