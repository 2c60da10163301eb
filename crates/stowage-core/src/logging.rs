//! Logging setup built on `tracing-subscriber`.
//!
//! Library code only emits `tracing` events; binaries and tests decide where
//! they go by calling one of the `init` functions below once.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,stowage=debug";

/// Values for the `system` field attached to every event, so a sink can
/// enable or silence whole subsystems.
pub mod systems {
    /// Resource caches, loaders and the scope registry.
    pub const RESOURCE_MANAGER: &str = "resource_manager";
    /// Scope lifecycle orchestration.
    pub const SCOPE_CLEANUP: &str = "scope_cleanup";
}

/// Install the global subscriber with [`DEFAULT_FILTER`].
pub fn init() {
    init_with_filter(DEFAULT_FILTER);
}

/// Install the global subscriber with a custom filter directive.
///
/// `RUST_LOG` takes precedence over `filter` when it is set.
pub fn init_with_filter(filter: &str) {
    if let Err(e) = try_init_with_filter(filter) {
        tracing::warn!("Logging already initialized: {}", e);
    }
}

/// Fallible variant of [`init_with_filter`].
pub fn try_init_with_filter(
    filter: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(filter))
        .with_target(true)
        .try_init()
}

/// Install a subscriber that writes through the test harness capture.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("debug"))
        .with_test_writer()
        .try_init();
}

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_for_tests_is_idempotent() {
        init_for_tests();
        init_for_tests();
        tracing::info!(system = systems::RESOURCE_MANAGER, "logging ready");
    }

    #[test]
    fn test_second_install_fails() {
        init_for_tests();
        assert!(try_init_with_filter("warn").is_err());
    }
}
