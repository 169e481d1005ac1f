//! Adapter Factory: the single place that wires a Shell-RPC handle,
//! a Volume Controller, and an `EnvironmentInfo` into a concrete
//! [`PackageManagerAdapter`].
//!
//! `create` takes every dependency explicitly and errors rather than
//! silently constructing its own — the same injection discipline
//! `bottles-env`'s Environment Manager follows. `create_with_defaults` is
//! the convenience path most callers use: it acquires a shell from the
//! pool, builds a `VolumeController`, and calls the Environment Manager
//! itself.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bottles_adapters::{PackageManagerAdapter, PipAdapter, UvAdapter};
use bottles_common::EnvironmentInfo;
use bottles_shell_rpc::ShellHandle;
use bottles_volume::VolumeController;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("[AdapterFactory] unknown package manager `{0}`")]
    UnknownManager(String),
    #[error("[AdapterFactory] missing required dependency: {0}")]
    MissingDependency(&'static str),
    #[error("[AdapterFactory] shell pool error: {0}")]
    ShellPool(#[from] bottles_shell_rpc::ShellRpcError),
    #[error("[AdapterFactory] environment detection error: {0}")]
    Environment(#[from] bottles_env::EnvironmentError),
}

/// Every dependency a concrete adapter needs, supplied by the caller.
/// `create` never reaches into global state to fill in a missing field —
/// a caller that forgets one gets a `MissingDependency` error, not a
/// factory-constructed default.
pub struct AdapterDependencies {
    pub shell: Option<Arc<ShellHandle>>,
    pub volume: Option<VolumeController>,
    pub environment: Option<EnvironmentInfo>,
    pub project_dir: PathBuf,
}

/// Construct a concrete adapter for `manager` from explicitly supplied
/// dependencies. Supported managers: `"pip"`, `"uv"`.
pub fn create(
    manager: &str,
    deps: AdapterDependencies,
) -> Result<Box<dyn PackageManagerAdapter>, FactoryError> {
    let shell = deps.shell.ok_or(FactoryError::MissingDependency("shell"))?;
    let volume = deps.volume.ok_or(FactoryError::MissingDependency("volume"))?;
    let environment = deps
        .environment
        .ok_or(FactoryError::MissingDependency("environment"))?;

    match manager {
        "pip" => Ok(Box::new(PipAdapter::new(shell, volume, environment, deps.project_dir))),
        "uv" => Ok(Box::new(UvAdapter::new(shell, volume, environment, deps.project_dir))),
        other => Err(FactoryError::UnknownManager(other.to_string())),
    }
}

/// Convenience wrapper: acquires a shell from the process-wide pool keyed
/// by `bottle_id`, builds a fresh `VolumeController` scoped to `manager`,
/// and asks the Environment Manager for the current `EnvironmentInfo`.
pub async fn create_with_defaults(
    manager: &str,
    project_dir: &Path,
    bottle_id: &str,
) -> Result<Box<dyn PackageManagerAdapter>, FactoryError> {
    let environment = bottles_env::EnvironmentManager::get_environment().await?;
    let shell = bottles_shell_rpc::pool::acquire(bottle_id, None, project_dir, &environment).await?;
    let mut volume = VolumeController::new(project_dir, bottle_id, &[manager.to_string()]);
    volume
        .initialize()
        .and_then(|_| volume.mount(manager))
        .map_err(|e| {
            log::warn!("[AdapterFactory] volume setup failed for `{manager}`: {e}");
            e
        })
        .ok();

    create(
        manager,
        AdapterDependencies {
            shell: Some(shell),
            volume: Some(volume),
            environment: Some(environment),
            project_dir: project_dir.to_path_buf(),
        },
    )
}

/// Release an adapter built via `create_with_defaults`: returns its shell
/// to the pool and unmounts (but does not clear) its volume cache so the
/// next bottle with the same id gets a warm cache.
pub async fn dispose(manager: &str, bottle_id: &str, shell: Arc<ShellHandle>, mut volume: VolumeController) {
    volume.cleanup();
    let _ = manager;
    bottles_shell_rpc::pool::release(bottle_id, shell).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bottles_common::OsFamily;
    use std::collections::BTreeMap;

    fn test_env() -> EnvironmentInfo {
        EnvironmentInfo {
            tools: BTreeMap::new(),
            os_family: OsFamily::current(),
            shell: "bash".to_string(),
        }
    }

    #[tokio::test]
    async fn create_errors_on_unknown_manager() {
        let dir = tempfile::tempdir().unwrap();
        let shell_dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(
            ShellHandle::spawn(None, shell_dir.path(), Default::default(), &test_env())
                .await
                .unwrap(),
        );
        let volume = VolumeController::new(dir.path(), "bottle-x", &["poetry".to_string()]);
        let result = create(
            "poetry",
            AdapterDependencies {
                shell: Some(shell),
                volume: Some(volume),
                environment: Some(test_env()),
                project_dir: dir.path().to_path_buf(),
            },
        );
        assert!(matches!(result, Err(FactoryError::UnknownManager(_))));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn create_with_defaults_acquires_from_the_pool() {
        bottles_shell_rpc::pool::clear().await;
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("BOTTLES_ENV_JSON", r#"{"tools":{},"os_family":"linux","shell":"bash"}"#);

        let adapter = create_with_defaults("pip", dir.path(), "bottle-defaults")
            .await
            .unwrap();
        assert_eq!(adapter.manager_name(), "pip");

        std::env::remove_var("BOTTLES_ENV_JSON");
        bottles_shell_rpc::pool::clear().await;
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn create_then_dispose_releases_shell_back_to_pool() {
        bottles_shell_rpc::pool::clear().await;
        let dir = tempfile::tempdir().unwrap();
        let env = test_env();
        let shell = bottles_shell_rpc::pool::acquire("bottle-dispose", None, dir.path(), &env)
            .await
            .unwrap();
        // Two independently constructed controllers for the same bottle id
        // resolve to the same cache paths (`VolumeController::new` is pure),
        // so the adapter and the `dispose` call can each own one.
        let adapter_volume = VolumeController::new(dir.path(), "bottle-dispose", &["pip".to_string()]);
        let dispose_volume = VolumeController::new(dir.path(), "bottle-dispose", &["pip".to_string()]);

        let adapter = create(
            "pip",
            AdapterDependencies {
                shell: Some(shell.clone()),
                volume: Some(adapter_volume),
                environment: Some(env),
                project_dir: dir.path().to_path_buf(),
            },
        )
        .unwrap();
        assert_eq!(adapter.manager_name(), "pip");

        assert_eq!(bottles_shell_rpc::pool::size("bottle-dispose").await, 0);
        dispose("pip", "bottle-dispose", shell, dispose_volume).await;
        assert_eq!(bottles_shell_rpc::pool::size("bottle-dispose").await, 1);

        bottles_shell_rpc::pool::clear().await;
    }

    #[test]
    fn create_errors_on_missing_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let result = create(
            "pip",
            AdapterDependencies {
                shell: None,
                volume: None,
                environment: None,
                project_dir: dir.path().to_path_buf(),
            },
        );
        assert!(matches!(result, Err(FactoryError::MissingDependency("shell"))));
    }
}
