//! uv adapter: `pyproject.toml` + `uv.lock` project recognition,
//! venv lifecycle via `uv venv`, install/uninstall via `uv pip`, and
//! listing installed packages via `uv pip list --format=json`.

pub mod lock;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bottles_common::{EnvironmentInfo, InstalledPackage, Manifest};
use bottles_shell_rpc::{ShellHandle, TimeoutProfile};
use bottles_volume::VolumeController;

use crate::base::{with_venv_activation, DetectionResult, InstallOptions, PackageManagerAdapter};
use crate::error::{ErrorKind, PackageManagerError};
use crate::normalize::normalize_pep503;
use crate::pip::pyproject::parse_pyproject;

const COMPONENT: &str = "UvAdapter";

pub struct UvAdapter {
    pub shell: Arc<ShellHandle>,
    pub volume: VolumeController,
    pub environment: EnvironmentInfo,
    pub project_dir: PathBuf,
}

impl UvAdapter {
    pub fn new(
        shell: Arc<ShellHandle>,
        volume: VolumeController,
        environment: EnvironmentInfo,
        project_dir: PathBuf,
    ) -> Self {
        Self {
            shell,
            volume,
            environment,
            project_dir,
        }
    }

    fn activated(&self, command: &str) -> String {
        with_venv_activation(&self.project_dir, command, self.environment.os_family)
    }

    async fn run(
        &self,
        command: &str,
        profile: TimeoutProfile,
    ) -> Result<bottles_shell_rpc::CommandResult, PackageManagerError> {
        let cache_env = self.volume.environment_variables();
        let prefix = cache_env
            .iter()
            .map(|(k, v)| format!("{k}={v} "))
            .collect::<String>();
        let command = format!("{prefix}{}", self.activated(command));
        self.shell
            .execute(&command, profile, "uv")
            .await
            .map_err(PackageManagerError::from)
    }
}

#[async_trait]
impl PackageManagerAdapter for UvAdapter {
    fn manager_name(&self) -> &'static str {
        "uv"
    }

    fn normalize_package_name(&self, name: &str) -> String {
        normalize_pep503(name)
    }

    fn parse_manifest(&self, project_dir: &Path) -> Result<Manifest, PackageManagerError> {
        let mut manifest = parse_pyproject(&project_dir.join("pyproject.toml"))?
            .ok_or_else(|| {
                PackageManagerError::new(
                    COMPONENT,
                    ErrorKind::NotFound,
                    format!(
                        "no [project] table in {}/pyproject.toml",
                        project_dir.display()
                    ),
                )
            })?;

        let lock_path = project_dir.join("uv.lock");
        if lock_path.is_file() {
            let locked = lock::parse_uv_lock(&lock_path)?;
            let pinned = lock::locked_packages_to_dependencies(&locked);
            // The lockfile pins the resolved graph; where it disagrees with
            // the declared range in pyproject.toml, the pin wins — the
            // lockfile is the source of truth for what is actually
            // installed.
            for (name, spec) in pinned {
                manifest.dependencies.insert(name, spec);
            }
        }

        Ok(manifest)
    }

    async fn detect_project(&self, project_dir: &Path) -> Result<DetectionResult, PackageManagerError> {
        let mut manifest_files = Vec::new();
        let mut lock_files = Vec::new();

        if project_dir.join("pyproject.toml").is_file() {
            manifest_files.push(PathBuf::from("pyproject.toml"));
        }
        if project_dir.join("uv.lock").is_file() {
            lock_files.push(PathBuf::from("uv.lock"));
        }

        // uv.lock alone is the strongest signal: no other manager emits
        // that filename.
        let detected = !manifest_files.is_empty() || !lock_files.is_empty();
        let confidence = match (manifest_files.is_empty(), lock_files.is_empty()) {
            (false, false) => 1.0,
            (false, true) => 0.4,
            (true, false) => 0.9,
            (true, true) => 0.0,
        };

        Ok(DetectionResult {
            detected,
            confidence,
            manifest_files,
            lock_files,
        })
    }

    async fn create_environment(&self, project_dir: &Path) -> Result<(), PackageManagerError> {
        let command = format!("cd {} && uv venv", project_dir.display());
        let result = self
            .shell
            .execute(&command, TimeoutProfile::VenvCreate, "uv")
            .await
            .map_err(PackageManagerError::from)?;
        if !result.success() {
            return Err(PackageManagerError::new(
                COMPONENT,
                ErrorKind::Unknown,
                format!("uv venv failed: {}", result.stderr),
            ));
        }
        Ok(())
    }

    async fn install_packages(
        &self,
        packages: &[String],
        project_dir: &Path,
        options: &InstallOptions,
    ) -> Result<(), PackageManagerError> {
        let uses_lock = project_dir.join("uv.lock").is_file() && packages.is_empty();
        let mut args = vec!["uv".to_string()];
        if uses_lock {
            args.push("sync".to_string());
        } else {
            args.extend(["pip".to_string(), "install".to_string()]);
            args.extend(packages.iter().cloned());
        }
        args.extend(options.extra_args.iter().cloned());
        let command = format!("cd {} && {}", project_dir.display(), args.join(" "));
        let profile = if uses_lock {
            TimeoutProfile::SyncResolve
        } else {
            TimeoutProfile::Install
        };
        let result = self.run(&command, profile).await?;
        if result.timed_out {
            return Err(PackageManagerError::timeout(
                COMPONENT,
                result.timeout_reason.expect("timed_out implies a reason"),
            ));
        }
        if !result.success() {
            return Err(PackageManagerError::new(
                COMPONENT,
                ErrorKind::Conflict,
                format!("uv install failed: {}", result.stderr),
            ));
        }
        Ok(())
    }

    async fn uninstall_packages(
        &self,
        packages: &[String],
        project_dir: &Path,
    ) -> Result<(), PackageManagerError> {
        let command = format!(
            "cd {} && uv pip uninstall {}",
            project_dir.display(),
            packages.join(" ")
        );
        let result = self.run(&command, TimeoutProfile::Complex).await?;
        if !result.success() {
            return Err(PackageManagerError::new(
                COMPONENT,
                ErrorKind::Unknown,
                format!("uv uninstall failed: {}", result.stderr),
            ));
        }
        Ok(())
    }

    async fn get_installed_packages(
        &self,
        project_dir: &Path,
    ) -> Result<Vec<InstalledPackage>, PackageManagerError> {
        if !project_dir.join("pyproject.toml").is_file() && !project_dir.join("uv.lock").is_file() {
            log::warn!(
                "[UvAdapter] no pyproject.toml or uv.lock under {}; reporting no installed packages",
                project_dir.display()
            );
            return Ok(Vec::new());
        }

        let command = format!("cd {} && uv pip list --format=json", project_dir.display());
        let result = crate::base::retry_idempotent(3, || self.run(&command, TimeoutProfile::Quick))
            .await?;
        if !result.success() {
            return Err(PackageManagerError::new(
                COMPONENT,
                ErrorKind::Unknown,
                format!("uv pip list failed: {}", result.stderr),
            ));
        }

        #[derive(serde::Deserialize)]
        struct Entry {
            name: String,
            version: String,
        }
        let entries: Vec<Entry> = serde_json::from_str(result.stdout.trim()).map_err(|e| {
            PackageManagerError::new(
                COMPONENT,
                ErrorKind::Unknown,
                format!("failed to parse uv pip list output: {e}"),
            )
        })?;

        let site_packages = bottles_common::paths::find_venv_dir(project_dir)
            .map(|venv| venv.join("lib").join("site-packages"))
            .unwrap_or_else(|| project_dir.join("site-packages"));

        Ok(entries
            .into_iter()
            .map(|e| InstalledPackage {
                name: normalize_pep503(&e.name),
                version: e.version,
                location: site_packages.clone(),
                metadata: None,
            })
            .collect())
    }

    fn get_cache_paths(&self) -> BTreeMap<String, PathBuf> {
        self.volume.cache_paths()
    }
}
