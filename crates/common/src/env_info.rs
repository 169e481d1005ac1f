//! `EnvironmentInfo`: the frozen, process-wide record of what package
//! tooling is available on the host.
//!
//! Produced once by `bottles-env`'s `EnvironmentManager`; every other
//! component receives it by injection and never mutates it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Host OS family, used to pick a default shell and PATH layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    Macos,
    Windows,
}

impl OsFamily {
    /// Detect the family of the host this process is running on.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            OsFamily::Windows
        } else if cfg!(target_os = "macos") {
            OsFamily::Macos
        } else {
            OsFamily::Linux
        }
    }

    /// Default interactive shell executable for this family.
    pub fn default_shell(&self) -> &'static str {
        match self {
            OsFamily::Linux | OsFamily::Macos => "bash",
            OsFamily::Windows => "powershell.exe",
        }
    }
}

/// Detection result for a single tool (python, pip, uv, node, npm, ...).
///
/// Invariant: if `available` is true, `path` resolved to a real executable
/// at detection time. A missing tool is `{available: false, path: None,
/// version: None}` — never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub available: bool,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
}

impl ToolInfo {
    pub fn unavailable() -> Self {
        Self {
            available: false,
            path: None,
            version: None,
        }
    }

    pub fn found(path: PathBuf, version: Option<String>) -> Self {
        Self {
            available: true,
            path: Some(path),
            version,
        }
    }
}

/// Immutable, process-wide snapshot of detected tooling.
///
/// Serializes to and from the `BOTTLES_ENV_JSON` schema documented here:
/// `{"tools": {"python": {"available":true,"path":"/usr/bin/python3","version":"3.11.4"}, ...},
///   "os_family":"linux", "shell":"/bin/bash"}`. A caller may set
/// `BOTTLES_ENV_JSON` to this shape to skip live detection (useful in CI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub tools: BTreeMap<String, ToolInfo>,
    pub os_family: OsFamily,
    pub shell: String,
}

impl EnvironmentInfo {
    pub fn tool(&self, name: &str) -> ToolInfo {
        self.tools.get(name).cloned().unwrap_or_else(ToolInfo::unavailable)
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.tools.get(name).map(|t| t.available).unwrap_or(false)
    }
}
