//! Common scaffolding shared by every concrete adapter: command
//! execution that merges PATH, venv activation, and volume env-vars;
//! manifest-reading utilities; retry/backoff; the capability-set contract
//! itself.
//!
//! The base shares roughly 70% of its code with each concrete adapter via
//! composition (owning a [`bottles_shell_rpc::ShellHandle`] and a
//! [`bottles_volume::VolumeController`]), not an inheritance chain.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bottles_common::{EnvironmentInfo, InstalledPackage, Manifest, OsFamily};

use crate::error::PackageManagerError;

/// `detect_project` return shape.
#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    pub detected: bool,
    pub confidence: f32,
    pub manifest_files: Vec<PathBuf>,
    pub lock_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Extra CLI flags appended verbatim after the package list.
    pub extra_args: Vec<String>,
}

/// The capability set every concrete adapter implements.
#[async_trait]
pub trait PackageManagerAdapter: Send + Sync {
    fn manager_name(&self) -> &'static str;

    /// Pure: no I/O beyond reading files under `project_dir`.
    fn parse_manifest(&self, project_dir: &Path) -> Result<Manifest, PackageManagerError>;

    /// Idempotent per-tool name canonicalization.
    fn normalize_package_name(&self, name: &str) -> String;

    async fn detect_project(&self, project_dir: &Path) -> Result<DetectionResult, PackageManagerError>;

    async fn create_environment(&self, project_dir: &Path) -> Result<(), PackageManagerError>;

    async fn install_packages(
        &self,
        packages: &[String],
        project_dir: &Path,
        options: &InstallOptions,
    ) -> Result<(), PackageManagerError>;

    async fn uninstall_packages(
        &self,
        packages: &[String],
        project_dir: &Path,
    ) -> Result<(), PackageManagerError>;

    async fn get_installed_packages(
        &self,
        project_dir: &Path,
    ) -> Result<Vec<InstalledPackage>, PackageManagerError>;

    fn get_cache_paths(&self) -> std::collections::BTreeMap<String, PathBuf>;
}

/// Prefix `command` with the project's virtualenv activation, or return it
/// unchanged if no venv is found. Activation rather than resolving the
/// venv's `pip` path directly, since activation sets `VIRTUAL_ENV`,
/// adjusts PATH, and determines which Python the tool uses.
pub fn with_venv_activation(project_dir: &Path, command: &str, os_family: OsFamily) -> String {
    match bottles_common::paths::find_venv_dir(project_dir) {
        Some(venv) => match os_family {
            OsFamily::Windows => format!(
                "{}\\Scripts\\Activate.ps1; {command}",
                venv.display()
            ),
            OsFamily::Linux | OsFamily::Macos => {
                format!("source {}/bin/activate && {command}", venv.display())
            }
        },
        None => command.to_string(),
    }
}

/// Retry helper for operations an adapter marks idempotent (listing,
/// resolve, lock read). Installs are never retried automatically: no
/// callsite in this crate passes an install through here.
pub async fn retry_idempotent<F, Fut, T, E>(attempts: usize, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_err = None;
    for attempt in 0..attempts.max(1) {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt + 1 < attempts {
                    let backoff = Duration::from_millis(100 * 2u64.pow(attempt as u32));
                    tokio::time::sleep(backoff).await;
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.expect("attempts.max(1) guarantees at least one iteration ran"))
}

/// Shared wiring every concrete adapter is built from: the factory
/// injects exactly this triple plus a project directory.
pub struct AdapterContext {
    pub shell: std::sync::Arc<bottles_shell_rpc::ShellHandle>,
    pub volume: bottles_volume::VolumeController,
    pub environment: EnvironmentInfo,
    pub project_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venv_activation_is_noop_without_a_venv() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = with_venv_activation(dir.path(), "pip install six", OsFamily::Linux);
        assert_eq!(cmd, "pip install six");
    }

    #[test]
    fn venv_activation_prefixes_when_dot_venv_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".venv")).unwrap();
        let cmd = with_venv_activation(dir.path(), "pip install six", OsFamily::Linux);
        assert!(cmd.starts_with("source "));
        assert!(cmd.ends_with("pip install six"));
    }

    #[tokio::test]
    async fn retry_idempotent_succeeds_after_transient_failures() {
        let attempt = std::sync::atomic::AtomicUsize::new(0);
        let result: Result<u32, &str> = retry_idempotent(3, || {
            let n = attempt.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move { if n < 2 { Err("not yet") } else { Ok(42) } }
        })
        .await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn retry_idempotent_gives_up_after_exhausting_attempts() {
        let result: Result<u32, &str> = retry_idempotent(2, || async { Err("nope") }).await;
        assert_eq!(result, Err("nope"));
    }
}
