//! Environment Manager: a process-wide singleton that detects which
//! package-related tools are present on the host, once, and caches the
//! result as an immutable [`EnvironmentInfo`].
//!
//! Hard invariant: adapters and the Volume Controller accept
//! `EnvironmentInfo` by parameter and never call detection themselves —
//! this was historically the number-one source of coupling in systems
//! like this one.

use bottles_common::{EnvironmentInfo, OsFamily, ToolInfo};
use once_cell::sync::Lazy;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::RwLock;

/// The set of tools probed by default detection (at least python, pip,
/// uv, node, npm).
const CANDIDATE_TOOLS: &[&str] = &["python", "python3", "pip", "pip3", "uv", "node", "npm"];

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("[EnvironmentManager] detection failed: {0}")]
    DetectionFailed(String),
}

static CACHE: Lazy<RwLock<Option<EnvironmentInfo>>> = Lazy::new(|| RwLock::new(None));

/// Process-wide detector. Stateless by design — all state lives in the
/// module-level `CACHE` so the manager behaves as a singleton while
/// remaining trivially injectable (callers hold no handle to a manager
/// instance, only the `EnvironmentInfo` it produces).
pub struct EnvironmentManager;

impl EnvironmentManager {
    /// Return the cached `EnvironmentInfo`, running detection on first call.
    ///
    /// A caller may preempt live detection entirely by setting
    /// `BOTTLES_ENV_JSON` to a serialized `EnvironmentInfo` (see the schema
    /// documented on that type) — useful for CI runs that already know the
    /// answer and want to skip spawning `which`/`--version` probes.
    pub async fn get_environment() -> Result<EnvironmentInfo, EnvironmentError> {
        if let Some(info) = CACHE.read().await.clone() {
            return Ok(info);
        }
        let mut guard = CACHE.write().await;
        if let Some(info) = guard.clone() {
            return Ok(info);
        }
        let info = detect().await?;
        *guard = Some(info.clone());
        Ok(info)
    }

    /// Test-only reset of the cached environment. Production code has no
    /// path to this — it is not a reachable no-op, it simply doesn't exist
    /// outside `#[cfg(test)]`/the `test-util` feature.
    #[cfg(any(test, feature = "test-util"))]
    pub async fn reset() {
        *CACHE.write().await = None;
    }
}

async fn detect() -> Result<EnvironmentInfo, EnvironmentError> {
    if let Ok(raw) = std::env::var("BOTTLES_ENV_JSON") {
        return serde_json::from_str(&raw)
            .map_err(|e| EnvironmentError::DetectionFailed(format!("BOTTLES_ENV_JSON: {e}")));
    }

    let mut tools = std::collections::BTreeMap::new();
    let probes = CANDIDATE_TOOLS.iter().map(|name| probe_tool(name));
    let results = futures::future::join_all(probes).await;
    for (name, info) in CANDIDATE_TOOLS.iter().zip(results) {
        tools.insert(name.to_string(), info);
    }
    // Fold the "python"/"python3" and "pip"/"pip3" aliases into a single
    // canonical entry each, preferring whichever resolved first.
    merge_alias(&mut tools, "python", "python3");
    merge_alias(&mut tools, "pip", "pip3");

    let os_family = OsFamily::current();
    Ok(EnvironmentInfo {
        shell: os_family.default_shell().to_string(),
        os_family,
        tools,
    })
}

fn merge_alias(
    tools: &mut std::collections::BTreeMap<String, ToolInfo>,
    canonical: &str,
    alias: &str,
) {
    let canonical_available = tools.get(canonical).map(|t| t.available).unwrap_or(false);
    if !canonical_available {
        if let Some(alias_info) = tools.get(alias).cloned() {
            if alias_info.available {
                tools.insert(canonical.to_string(), alias_info);
            }
        }
    }
    tools.remove(alias);
}

/// Resolve one tool's absolute path and version string. Never returns an
/// error: an unresolvable tool is represented as `{available: false}` —
/// detection failures are logged, not raised.
async fn probe_tool(name: &str) -> ToolInfo {
    let path = match which::which(name) {
        Ok(p) => p,
        Err(_) => {
            log::debug!("[EnvironmentManager] tool not found on PATH: {name}");
            return ToolInfo::unavailable();
        }
    };
    let version = probe_version(&path).await;
    ToolInfo::found(path, version)
}

async fn probe_version(path: &PathBuf) -> Option<String> {
    let output = Command::new(path).arg("--version").output().await.ok()?;
    let text = if !output.stdout.is_empty() {
        output.stdout
    } else {
        output.stderr
    };
    let text = String::from_utf8_lossy(&text).trim().to_string();
    if text.is_empty() {
        None
    } else {
        // Tools format `--version` output inconsistently (`Python 3.11.4`,
        // `pip 24.0 from ...`, `uv 0.4.0`); keep the first line verbatim
        // and let callers extract a semantic version if they need one.
        text.lines().next().map(|s| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn detection_never_errors_on_missing_tools() {
        let _ = env_logger::try_init();
        EnvironmentManager::reset().await;
        std::env::remove_var("BOTTLES_ENV_JSON");
        let info = EnvironmentManager::get_environment().await.unwrap();
        // Every candidate family resolves to *some* entry, available or not.
        assert!(info.tools.contains_key("python") || !info.is_available("python"));
    }

    #[tokio::test]
    #[serial]
    async fn cached_across_calls_until_reset() {
        EnvironmentManager::reset().await;
        std::env::remove_var("BOTTLES_ENV_JSON");
        let a = EnvironmentManager::get_environment().await.unwrap();
        let b = EnvironmentManager::get_environment().await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    #[serial]
    async fn bottles_env_json_short_circuits_detection() {
        EnvironmentManager::reset().await;
        let json = r#"{"tools":{"python":{"available":true,"path":"/usr/bin/python3","version":"3.11.4"}},"os_family":"linux","shell":"bash"}"#;
        std::env::set_var("BOTTLES_ENV_JSON", json);
        let info = EnvironmentManager::get_environment().await.unwrap();
        std::env::remove_var("BOTTLES_ENV_JSON");
        assert!(info.is_available("python"));
        assert_eq!(info.tool("python").version.as_deref(), Some("3.11.4"));
    }
}
