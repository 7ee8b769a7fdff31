// Tracing initialization with a configurable and reloadable log level.
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    // Prefer RUST_LOG from env, otherwise use provided level string.
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let installed = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init();

    match installed {
        // Only the installed subscriber's handle can change its level
        Ok(()) => {
            if LOG_RELOAD_HANDLE.set(handle).is_err() {
                tracing::warn!("log reload handle already set; keeping the first one");
            }
        }
        Err(e) => tracing::warn!(error = %e, "tracing subscriber already installed"),
    }
}

/// Apply the configured logging level unless RUST_LOG is set.
///
/// Returns whether the level was applied.
pub fn apply_logging_level(level: &str) -> bool {
    if std::env::var_os("RUST_LOG").is_some() {
        return false;
    }
    let Some(handle) = LOG_RELOAD_HANDLE.get() else {
        tracing::warn!(level, "tracing not initialized; logging level not applied");
        return false;
    };
    match handle.modify(|f| {
        *f = EnvFilter::new(level);
    }) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(level, error = %e, "failed to apply logging level");
            false
        }
    }
}
