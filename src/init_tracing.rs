//! A single opt-in entry point for wiring up structured logging, so an
//! embedding host doesn't have to know which subscriber crate this workspace
//! uses. Every crate below this one logs through `tracing` directly; this
//! just installs a global subscriber for those events to reach.

use tracing_subscriber::EnvFilter;

/// Install a `tracing_subscriber::fmt` subscriber honoring `RUST_LOG` (or
/// `info` if unset). Safe to call more than once; later calls are ignored.
///
/// Not required — an embedding host that already runs its own subscriber
/// should skip this and let `tracing` events flow to it directly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
