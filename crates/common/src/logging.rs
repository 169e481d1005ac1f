//! Process-wide logging init, shared by every binary that embeds Bottles.
//!
//! Honors `BOTTLES_LOG_LEVEL` as a default filter when the caller hasn't
//! already set `RUST_LOG` — `RUST_LOG`, when present, always wins.
use std::env;

/// Initialize the global logger. Safe to call more than once (subsequent
/// calls are no-ops via `try_init`), so library code and its own test
/// suites can both call this without coordinating.
pub fn init() {
    if env::var("RUST_LOG").is_err() {
        if let Ok(level) = env::var("BOTTLES_LOG_LEVEL") {
            if matches!(level.as_str(), "error" | "warn" | "info" | "debug" | "trace") {
                env::set_var("RUST_LOG", &level);
            }
        }
    }
    let _ = env_logger::try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn bottles_log_level_seeds_rust_log_when_unset() {
        env::remove_var("RUST_LOG");
        env::set_var("BOTTLES_LOG_LEVEL", "warn");
        init();
        assert_eq!(env::var("RUST_LOG").as_deref(), Ok("warn"));
        env::remove_var("BOTTLES_LOG_LEVEL");
        env::remove_var("RUST_LOG");
    }

    #[test]
    #[serial_test::serial]
    fn unrecognized_level_is_ignored() {
        env::remove_var("RUST_LOG");
        env::set_var("BOTTLES_LOG_LEVEL", "verbose");
        init();
        assert!(env::var("RUST_LOG").is_err());
        env::remove_var("BOTTLES_LOG_LEVEL");
    }
}
