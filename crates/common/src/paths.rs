//! Path conventions for the bottle cache root:
//!
//! ```text
//! <cacheRoot>/<bottleId>/
//!     pip/         # PIP_CACHE_DIR content
//!     uv/          # UV_CACHE_DIR content
//! <projectDir>/
//!     .venv/       # owned by the project, not the cache
//! ```

use std::path::{Path, PathBuf};

pub const DEFAULT_CACHE_ROOT: &str = ".bottles-cache";
pub const VENV_DIR_CANDIDATES: [&str; 3] = [".venv", "venv", "env"];

/// Root directory under which every bottle's per-manager mounts live.
///
/// Overridable via `BOTTLES_CACHE_ROOT`; defaults to a project-local
/// directory so it survives across test runs and CI invocations without
/// coordination.
pub fn cache_root(project_dir: &Path) -> PathBuf {
    if let Ok(root) = std::env::var("BOTTLES_CACHE_ROOT") {
        let trimmed = root.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    project_dir.join(DEFAULT_CACHE_ROOT)
}

/// The cache subdirectory for a single bottle, parent of each manager mount.
pub fn bottle_cache_dir(project_dir: &Path, bottle_id: &str) -> PathBuf {
    cache_root(project_dir).join(bottle_id)
}

/// Locate an existing virtualenv directory under `project_dir`, checking
/// candidates in the documented order used for venv activation.
pub fn find_venv_dir(project_dir: &Path) -> Option<PathBuf> {
    VENV_DIR_CANDIDATES
        .iter()
        .map(|name| project_dir.join(name))
        .find(|candidate| candidate.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn cache_root_defaults_under_project_dir() {
        let dir = tempdir().unwrap();
        std::env::remove_var("BOTTLES_CACHE_ROOT");
        let root = cache_root(dir.path());
        assert_eq!(root, dir.path().join(DEFAULT_CACHE_ROOT));
    }

    #[test]
    fn bottle_cache_dir_nests_under_root() {
        let dir = tempdir().unwrap();
        std::env::remove_var("BOTTLES_CACHE_ROOT");
        let bottle = bottle_cache_dir(dir.path(), "bottle-abc");
        assert_eq!(bottle, dir.path().join(DEFAULT_CACHE_ROOT).join("bottle-abc"));
    }

    #[test]
    fn find_venv_dir_prefers_dot_venv() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".venv")).unwrap();
        std::fs::create_dir(dir.path().join("venv")).unwrap();
        assert_eq!(find_venv_dir(dir.path()), Some(dir.path().join(".venv")));
    }

    #[test]
    fn find_venv_dir_none_when_absent() {
        let dir = tempdir().unwrap();
        assert_eq!(find_venv_dir(dir.path()), None);
    }
}
