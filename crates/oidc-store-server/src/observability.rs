//! Log output for the host binary.
//!
//! The subscriber starts at `info` (or `RUST_LOG`) before the config file is
//! read, then switches to `[logging] level` once it is known.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Filter for a configured level, falling back to `info` on a bad directive.
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter("info"));
    let (filter, handle) = reload::Layer::new(filter);
    if FILTER.set(handle).is_err() {
        return;
    }
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// Switch to the configured level. `RUST_LOG` keeps precedence when set.
///
/// Returns `true` if the filter changed.
pub fn apply_logging_level(level: &str) -> bool {
    if std::env::var_os("RUST_LOG").is_some() {
        return false;
    }
    FILTER
        .get()
        .is_some_and(|handle| handle.reload(level_filter(level)).is_ok())
}
