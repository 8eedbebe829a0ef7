//! Process-level tracing setup for binaries and long-running transports.
//!
//! Library code only emits `tracing` events; installing a subscriber is
//! the embedding process's call. `init` wires the conventional
//! `RUST_LOG`-filtered formatter and is safe to call more than once.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
