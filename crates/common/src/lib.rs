//! Shared value types for the Bottles package-manager isolation substrate.
//!
//! Nothing in this crate spawns a process or touches the filesystem beyond
//! what [`paths`] needs to compute a path. Components that do I/O (shell-rpc,
//! volume, adapters) depend on this crate, never the other way around.

pub mod env_info;
pub mod logging;
pub mod manifest;
pub mod paths;

pub use env_info::{EnvironmentInfo, OsFamily, ToolInfo};
pub use manifest::{InstalledPackage, Manifest, VersionSpec};
