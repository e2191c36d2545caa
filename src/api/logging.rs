// Process-wide tracing bootstrap for applications embedding the loader.

use std::sync::Once;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::DEFAULT_LOG_FILTER;

static INSTALL: Once = Once::new();

/// Install the fmt subscriber with [`DEFAULT_LOG_FILTER`]. `RUST_LOG` wins when set.
pub fn init_tracing() -> bool {
    init_tracing_with(DEFAULT_LOG_FILTER)
}

/// Install the fmt subscriber once per process.
///
/// Returns `true` only for the call that installed it. A subscriber set up
/// elsewhere by the host application is left alone.
pub fn init_tracing_with(default_filter: &str) -> bool {
    let mut installed = false;
    INSTALL.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
        installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok();
        if installed {
            info!(filter = default_filter, "photo loader logging ready");
        }
    });
    installed
}
