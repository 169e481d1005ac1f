//! Volume Controller: per-bottle, per-manager cache directories whose
//! paths are injected into a tool via its well-known cache-path env-var,
//! persisting across bottle lifecycles so CI runs hit warm caches.

use bottles_common::paths::bottle_cache_dir;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("[VolumeController] permission denied creating cache dir: {path}")]
    PermissionDenied { path: PathBuf },
    #[error("[VolumeController] mount not found for manager `{manager}`")]
    NotFound { manager: String },
    #[error("[VolumeController] manager `{manager}` is already mounted")]
    AlreadyMounted { manager: String },
}

/// A single manager's cache-directory mount within a bottle.
#[derive(Debug, Clone)]
pub struct VolumeMount {
    pub manager: String,
    pub cache_path: PathBuf,
    pub mounted: bool,
}

impl VolumeMount {
    /// The env-var contribution for this manager, per the bit-exact
    /// contract (`PIP_CACHE_DIR`, `UV_CACHE_DIR`, ...).
    pub fn env_var(&self) -> Option<(&'static str, String)> {
        let key = match self.manager.as_str() {
            "pip" => "PIP_CACHE_DIR",
            "uv" => "UV_CACHE_DIR",
            _ => return None,
        };
        Some((key, self.cache_path.to_string_lossy().to_string()))
    }
}

/// Bound to a single bottle id; manages one mount per manager of interest.
///
/// Managers of interest come from an explicit list passed at construction
/// — never auto-detected: auto-detecting in the constructor caused test
/// pollution historically.
pub struct VolumeController {
    bottle_root: PathBuf,
    mounts: BTreeMap<String, VolumeMount>,
}

impl VolumeController {
    pub fn new(project_dir: &Path, bottle_id: &str, package_managers: &[String]) -> Self {
        let bottle_root = bottle_cache_dir(project_dir, bottle_id);
        let mounts = package_managers
            .iter()
            .map(|manager| {
                (
                    manager.clone(),
                    VolumeMount {
                        manager: manager.clone(),
                        cache_path: bottle_root.join(manager),
                        mounted: false,
                    },
                )
            })
            .collect();
        Self { bottle_root, mounts }
    }

    /// Idempotent: creates the bottle's cache root if absent.
    pub fn initialize(&self) -> Result<(), VolumeError> {
        create_dir(&self.bottle_root)
    }

    /// Create (if absent) and record the mount for `manager`.
    pub fn mount(&mut self, manager: &str) -> Result<&VolumeMount, VolumeError> {
        let entry = self
            .mounts
            .get_mut(manager)
            .ok_or_else(|| VolumeError::NotFound {
                manager: manager.to_string(),
            })?;
        if entry.mounted {
            return Err(VolumeError::AlreadyMounted {
                manager: manager.to_string(),
            });
        }
        create_dir(&entry.cache_path)?;
        entry.mounted = true;
        Ok(entry)
    }

    pub fn unmount(&mut self, manager: &str) -> Result<(), VolumeError> {
        let entry = self
            .mounts
            .get_mut(manager)
            .ok_or_else(|| VolumeError::NotFound {
                manager: manager.to_string(),
            })?;
        entry.mounted = false;
        Ok(())
    }

    /// Remove the cache directory's contents but keep it mounted.
    pub fn clear(&self, manager: &str) -> Result<(), VolumeError> {
        let mount = self
            .mounts
            .get(manager)
            .ok_or_else(|| VolumeError::NotFound {
                manager: manager.to_string(),
            })?;
        if mount.cache_path.is_dir() {
            let listing = std::fs::read_dir(&mount.cache_path).map_err(|_| {
                VolumeError::PermissionDenied {
                    path: mount.cache_path.clone(),
                }
            })?;
            for dir_entry in listing.flatten() {
                let path = dir_entry.path();
                if path.is_dir() {
                    let _ = std::fs::remove_dir_all(&path);
                } else {
                    let _ = std::fs::remove_file(&path);
                }
            }
        }
        Ok(())
    }

    pub fn clear_all(&self) -> Result<(), VolumeError> {
        for manager in self.mounts.keys().cloned().collect::<Vec<_>>() {
            self.clear(&manager)?;
        }
        Ok(())
    }

    /// Unmount everything. Directories are left on disk for cache warmth
    /// across runs — only `clear`/`clear_all` delete content.
    pub fn cleanup(&mut self) {
        for entry in self.mounts.values_mut() {
            entry.mounted = false;
        }
    }

    /// Union of env-var contributions across every currently-mounted
    /// manager. Empty once `cleanup()` has run.
    pub fn environment_variables(&self) -> BTreeMap<String, String> {
        self.mounts
            .values()
            .filter(|m| m.mounted)
            .filter_map(|m| m.env_var())
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    pub fn cache_paths(&self) -> BTreeMap<String, PathBuf> {
        self.mounts
            .iter()
            .map(|(manager, mount)| (manager.clone(), mount.cache_path.clone()))
            .collect()
    }
}

fn create_dir(path: &Path) -> Result<(), VolumeError> {
    std::fs::create_dir_all(path).map_err(|_| VolumeError::PermissionDenied {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn managers() -> Vec<String> {
        vec!["pip".to_string(), "uv".to_string()]
    }

    #[test]
    fn mount_creates_writable_directory() {
        let dir = tempdir().unwrap();
        let mut vc = VolumeController::new(dir.path(), "bottle-1", &managers());
        vc.initialize().unwrap();
        let mount = vc.mount("pip").unwrap();
        assert!(mount.cache_path.is_dir());
        assert!(mount.mounted);
    }

    #[test]
    fn mounting_unknown_manager_is_not_found() {
        let dir = tempdir().unwrap();
        let mut vc = VolumeController::new(dir.path(), "bottle-1", &managers());
        vc.initialize().unwrap();
        assert!(matches!(vc.mount("poetry"), Err(VolumeError::NotFound { .. })));
    }

    #[test]
    fn env_var_contract_matches_manager() {
        let dir = tempdir().unwrap();
        let mut vc = VolumeController::new(dir.path(), "bottle-1", &managers());
        vc.initialize().unwrap();
        vc.mount("pip").unwrap();
        vc.mount("uv").unwrap();
        let env = vc.environment_variables();
        assert_eq!(
            env.get("PIP_CACHE_DIR").unwrap(),
            &vc.cache_paths()["pip"].to_string_lossy().to_string()
        );
        assert_eq!(
            env.get("UV_CACHE_DIR").unwrap(),
            &vc.cache_paths()["uv"].to_string_lossy().to_string()
        );
    }

    #[test]
    fn cleanup_empties_environment_variables_but_keeps_directory() {
        let dir = tempdir().unwrap();
        let mut vc = VolumeController::new(dir.path(), "bottle-1", &managers());
        vc.initialize().unwrap();
        let mount = vc.mount("pip").unwrap().cache_path.clone();
        vc.cleanup();
        assert!(vc.environment_variables().is_empty());
        assert!(mount.is_dir());
    }

    #[test]
    fn distinct_bottles_get_distinct_subpaths() {
        let dir = tempdir().unwrap();
        let mut a = VolumeController::new(dir.path(), "bottle-a", &managers());
        let mut b = VolumeController::new(dir.path(), "bottle-b", &managers());
        a.initialize().unwrap();
        b.initialize().unwrap();
        let a_mount = a.mount("pip").unwrap().cache_path.clone();
        let b_mount = b.mount("pip").unwrap().cache_path.clone();
        assert_ne!(a_mount, b_mount);
    }
}
