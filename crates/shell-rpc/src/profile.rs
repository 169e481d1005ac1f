//! The closed set of timeout profiles the core ships.
//!
//! CI budgets are multiplied per-tool: pip 3x, uv 1x, discovered
//! empirically. Multipliers are overridable via
//! `BOTTLES_CI_MULTIPLIER_<TOOL>` (e.g. `BOTTLES_CI_MULTIPLIER_PIP=3`).

use std::time::Duration;

use crate::timeout::{Action, PatternAction, Stream, TimeoutConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutProfile {
    Quick,
    VenvCreate,
    Install,
    SyncResolve,
    Complex,
}

fn default_ci_multiplier(tool: &str) -> f64 {
    match tool {
        "pip" => 3.0,
        "uv" => 1.0,
        _ => 1.0,
    }
}

/// Multiplier applied to every timer in a profile when running in CI
/// (detected by the presence of a `CI` environment variable, matching the
/// common convention most CI providers set).
fn ci_multiplier(tool: &str) -> f64 {
    let env_key = format!("BOTTLES_CI_MULTIPLIER_{}", tool.to_uppercase());
    if let Ok(raw) = std::env::var(&env_key) {
        if let Ok(value) = raw.trim().parse::<f64>() {
            return value;
        }
    }
    if std::env::var("CI").is_ok() {
        default_ci_multiplier(tool)
    } else {
        1.0
    }
}

fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::from_secs_f64(duration.as_secs_f64() * factor)
}

impl TimeoutProfile {
    /// Build the concrete `TimeoutConfig` for this profile, scaled for the
    /// named tool's CI multiplier. `tool` is e.g. `"pip"` or `"uv"`.
    pub fn config_for(&self, tool: &str) -> TimeoutConfig {
        let factor = ci_multiplier(tool);
        let (base, grace, absolute_max, patterns) = match self {
            TimeoutProfile::Quick => (5, 2, 15, vec![]),
            TimeoutProfile::VenvCreate => (15, 5, 60, vec![]),
            TimeoutProfile::Install => (
                30,
                15,
                600,
                vec![
                    PatternAction::new(
                        "Collecting|Downloading|Installing|Building wheel|Resolved|Installed",
                        Some(Stream::Stdout),
                        Action::Reset,
                    ),
                    PatternAction::new(
                        r"^ERROR:|Could not find a version|Failed building wheel|^error:",
                        None,
                        Action::Terminate,
                    ),
                ],
            ),
            TimeoutProfile::SyncResolve => (30, 15, 240, vec![]),
            TimeoutProfile::Complex => (30, 15, 120, vec![]),
        };
        TimeoutConfig {
            base_timeout: scale(Duration::from_secs(base), factor),
            activity_extension: scale(Duration::from_secs(5), factor),
            grace: scale(Duration::from_secs(grace), factor),
            absolute_max: scale(Duration::from_secs(absolute_max), factor),
            patterns,
        }
    }
}
