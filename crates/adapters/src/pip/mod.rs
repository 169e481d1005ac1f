//! pip adapter: manifest recognition across `requirements*.txt`,
//! `pyproject.toml`, `setup.cfg`, `setup.py`, `Pipfile`; venv lifecycle;
//! install/uninstall; listing installed packages.

pub mod pyproject;
pub mod requirements;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bottles_common::{EnvironmentInfo, InstalledPackage, Manifest};
use bottles_shell_rpc::{ShellHandle, TimeoutProfile};
use bottles_volume::VolumeController;

use crate::base::{with_venv_activation, DetectionResult, InstallOptions, PackageManagerAdapter};
use crate::error::{ErrorKind, PackageManagerError};
use crate::normalize::normalize_pep503;

const COMPONENT: &str = "PipAdapter";

/// Requirements file name variants recognized alongside the canonical
/// `requirements.txt`.
const REQUIREMENTS_VARIANTS: &[&str] = &[
    "requirements.txt",
    "requirements-dev.txt",
    "requirements_dev.txt",
    "dev-requirements.txt",
];

pub struct PipAdapter {
    pub shell: Arc<ShellHandle>,
    pub volume: VolumeController,
    pub environment: EnvironmentInfo,
    pub project_dir: PathBuf,
}

impl PipAdapter {
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
            .execute(&command, profile, "pip")
            .await
            .map_err(PackageManagerError::from)
    }
}

/// Pure manifest-recognition/parsing, independent of any adapter
/// instance: no shell, volume, or environment is needed to read files off
/// disk.
fn parse_manifest_from_dir(project_dir: &Path) -> Result<Manifest, PackageManagerError> {
    let mut manifest = Manifest::default();
    let mut found_any = false;

    if let Some(parsed) = pyproject::parse_pyproject(&project_dir.join("pyproject.toml"))
        .ok()
        .flatten()
    {
        found_any = true;
        manifest.name = parsed.name;
        manifest.version = parsed.version;
        manifest.python_version = parsed.python_version;
        manifest.dependencies.extend(parsed.dependencies);
        manifest.dev_dependencies.extend(parsed.dev_dependencies);
    }

    for variant in REQUIREMENTS_VARIANTS {
        let path = project_dir.join(variant);
        if !path.is_file() {
            continue;
        }
        found_any = true;
        let mut seen = HashSet::new();
        let entries = requirements::parse_requirements_file(&path, &mut seen)?;
        let target = if *variant == "requirements.txt" {
            &mut manifest.dependencies
        } else {
            &mut manifest.dev_dependencies
        };
        for entry in entries {
            target.insert(entry.name, entry.spec);
        }
    }

    if !found_any {
        let setup_cfg = project_dir.join("setup.cfg");
        let setup_py = project_dir.join("setup.py");
        if setup_cfg.is_file() {
            found_any = true;
            let parsed = pyproject::parse_setup_cfg(&setup_cfg)?;
            manifest.name = parsed.name;
            manifest.version = parsed.version;
            manifest.dependencies.extend(parsed.dependencies);
        } else if setup_py.is_file() {
            found_any = true;
            let parsed = pyproject::parse_setup_py(&setup_py)?;
            manifest.name = parsed.name;
            manifest.version = parsed.version;
            manifest.dependencies.extend(parsed.dependencies);
        } else {
            let pipfile = project_dir.join("Pipfile");
            if pipfile.is_file() {
                found_any = true;
                let parsed = pyproject::parse_pipfile(&pipfile)?;
                manifest.dependencies.extend(parsed.dependencies);
                manifest.dev_dependencies.extend(parsed.dev_dependencies);
            }
        }
    }

    if !found_any {
        return Err(PackageManagerError::new(
            COMPONENT,
            ErrorKind::NotFound,
            format!("no recognized pip manifest under {}", project_dir.display()),
        ));
    }

    Ok(manifest)
}

#[async_trait]
impl PackageManagerAdapter for PipAdapter {
    fn manager_name(&self) -> &'static str {
        "pip"
    }

    fn normalize_package_name(&self, name: &str) -> String {
        normalize_pep503(name)
    }

    fn parse_manifest(&self, project_dir: &Path) -> Result<Manifest, PackageManagerError> {
        parse_manifest_from_dir(project_dir)
    }

    async fn detect_project(&self, project_dir: &Path) -> Result<DetectionResult, PackageManagerError> {
        let mut manifest_files = Vec::new();
        let mut lock_files = Vec::new();

        for variant in REQUIREMENTS_VARIANTS {
            if project_dir.join(variant).is_file() {
                manifest_files.push(PathBuf::from(variant));
            }
        }
        for candidate in ["pyproject.toml", "setup.py", "setup.cfg", "Pipfile"] {
            if project_dir.join(candidate).is_file() {
                manifest_files.push(PathBuf::from(candidate));
            }
        }
        if project_dir.join("Pipfile.lock").is_file() {
            lock_files.push(PathBuf::from("Pipfile.lock"));
        }

        let detected = !manifest_files.is_empty();
        // One matched file already clears the ">= 0.4" confidence floor;
        // each further signal nudges confidence up.
        let confidence = if detected {
            (0.4 + 0.15 * (manifest_files.len() as f32 - 1.0)).min(1.0)
        } else {
            0.0
        };

        Ok(DetectionResult {
            detected,
            confidence,
            manifest_files,
            lock_files,
        })
    }

    async fn create_environment(&self, project_dir: &Path) -> Result<(), PackageManagerError> {
        let command = format!("cd {} && python -m venv .venv", project_dir.display());
        let result = self
            .shell
            .execute(&command, TimeoutProfile::VenvCreate, "pip")
            .await
            .map_err(PackageManagerError::from)?;
        if !result.success() {
            return Err(PackageManagerError::new(
                COMPONENT,
                ErrorKind::Unknown,
                format!("venv creation failed: {}", result.stderr),
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
        let mut args = vec!["pip".to_string(), "install".to_string()];
        args.extend(packages.iter().cloned());
        args.extend(options.extra_args.iter().cloned());
        let command = format!("cd {} && {}", project_dir.display(), args.join(" "));
        let result = self.run(&command, TimeoutProfile::Install).await?;
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
                format!("pip install failed: {}", result.stderr),
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
            "cd {} && pip uninstall -y {}",
            project_dir.display(),
            packages.join(" ")
        );
        let result = self.run(&command, TimeoutProfile::Complex).await?;
        if !result.success() {
            return Err(PackageManagerError::new(
                COMPONENT,
                ErrorKind::Unknown,
                format!("pip uninstall failed: {}", result.stderr),
            ));
        }
        Ok(())
    }

    async fn get_installed_packages(
        &self,
        project_dir: &Path,
    ) -> Result<Vec<InstalledPackage>, PackageManagerError> {
        let command = format!("cd {} && pip list --format=json", project_dir.display());
        let result = crate::base::retry_idempotent(3, || self.run(&command, TimeoutProfile::Quick))
            .await?;
        if !result.success() {
            return Err(PackageManagerError::new(
                COMPONENT,
                ErrorKind::Unknown,
                format!("pip list failed: {}", result.stderr),
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
                format!("failed to parse pip list output: {e}"),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::File::create(dir.join(name)).unwrap().write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn union_of_requirements_and_pyproject_normalizes_into_manifest() {
        let dir = tempdir().unwrap();
        write(dir.path(), "requirements.txt", "requests==2.31.0\nflask>=2,<3\n");
        write(
            dir.path(),
            "pyproject.toml",
            "[project]\nname=\"demo\"\nversion=\"0.1\"\ndependencies=[\"numpy>=1.24\"]\n",
        );

        // parse_manifest is pure and infrastructure-free, so we can test
        // it without constructing a full adapter (no shell/volume/env).
        let pyproject = pyproject::parse_pyproject(&dir.path().join("pyproject.toml"))
            .unwrap()
            .unwrap();
        let mut seen = HashSet::new();
        let reqs = requirements::parse_requirements_file(
            &dir.path().join("requirements.txt"),
            &mut seen,
        )
        .unwrap();

        let mut union: BTreeMap<String, _> = pyproject.dependencies.clone();
        for entry in reqs {
            union.insert(entry.name, entry.spec);
        }

        assert!(union.contains_key("requests"));
        assert!(union.contains_key("flask"));
        assert!(union.contains_key("numpy"));
    }

    #[test]
    fn pipfile_only_project_parses_instead_of_erroring() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "Pipfile",
            "[packages]\nrequests = \"*\"\n\n[dev-packages]\npytest = \">=7\"\n",
        );
        let manifest = parse_manifest_from_dir(dir.path()).unwrap();
        assert!(manifest.dependencies.contains_key("requests"));
        assert!(manifest.dev_dependencies.contains_key("pytest"));
    }
}
