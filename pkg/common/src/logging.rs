use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a process-wide `tracing` subscriber reading its filter from
/// `RUST_LOG`, defaulting to `info` when unset.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init_default() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init();
    });
}
