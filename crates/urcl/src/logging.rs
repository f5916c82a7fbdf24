//! Log output for applications and tests.
//!
//! The core only emits `tracing` events. These helpers install a formatted
//! subscriber; installing twice is harmless and the second call reports
//! `false`.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `urcl_core=debug`.
pub const ENV_LOG: &str = "URCL_LOG";

/// Filter used when `URCL_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "warn";

/// Install a subscriber with the given filter directives.
pub fn init(filter: &str) -> bool {
    install(EnvFilter::new(filter))
}

/// Install a subscriber using `URCL_LOG`, falling back to [`DEFAULT_FILTER`].
pub fn init_from_env() -> bool {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter)
}

/// Install a subscriber that writes through the test harness.
pub fn init_for_tests() -> bool {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .is_ok()
}

fn install(filter: EnvFilter) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        init("urcl=debug");
        assert!(!init("urcl=debug"));
    }
}
