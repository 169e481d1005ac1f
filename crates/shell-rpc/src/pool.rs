//! Shell Pool: a process-wide singleton keyed by a stable caller
//! identifier (e.g. a bottle id or test name), reusing idle shells up to
//! `max_size` per key, with a manager enforcing the cap and draining idle
//! entries.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bottles_common::EnvironmentInfo;
use once_cell::sync::Lazy;
use tokio::sync::Mutex;

use crate::error::ShellRpcError;
use crate::shell::ShellHandle;

#[derive(Debug, Clone)]
pub struct ShellPoolConfig {
    pub max_size: usize,
}

impl Default for ShellPoolConfig {
    fn default() -> Self {
        let max_size = std::env::var("SHELL_POOL_SIZE")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(5);
        Self { max_size }
    }
}

struct KeyedPool {
    idle: Vec<Arc<ShellHandle>>,
    total: usize,
}

/// Process-wide pool of shell handles, keyed by caller-supplied string.
///
/// Invariant: `size(key) <= max_size` for pooled handles; callers that
/// exceed the cap get a transient, non-pooled shell instead of being
/// blocked.
pub struct ShellPool {
    config: ShellPoolConfig,
    pools: Mutex<HashMap<String, KeyedPool>>,
}

static GLOBAL: Lazy<ShellPool> = Lazy::new(|| ShellPool::new(ShellPoolConfig::default()));

/// Acquire a handle from the process-wide pool, keyed by `key`.
pub async fn acquire(
    key: &str,
    shell_exe: Option<&str>,
    cwd: &Path,
    env_info: &EnvironmentInfo,
) -> Result<Arc<ShellHandle>, ShellRpcError> {
    GLOBAL.acquire(key, shell_exe, cwd, env_info).await
}

/// Return a handle to the pool under `key`. Idempotent to call at most
/// once per acquire; calling it on a handle the pool doesn't track is a
/// no-op (it was a transient, over-cap shell and simply gets dropped).
pub async fn release(key: &str, handle: Arc<ShellHandle>) {
    GLOBAL.release(key, handle).await
}

/// Destroy every pooled handle. Called at process exit on a best-effort
/// basis and by tests that need a clean slate.
pub async fn clear() {
    GLOBAL.clear().await
}

pub async fn size(key: &str) -> usize {
    GLOBAL.size(key).await
}

impl ShellPool {
    pub fn new(config: ShellPoolConfig) -> Self {
        Self {
            config,
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(
        &self,
        key: &str,
        shell_exe: Option<&str>,
        cwd: &Path,
        env_info: &EnvironmentInfo,
    ) -> Result<Arc<ShellHandle>, ShellRpcError> {
        {
            let mut pools = self.pools.lock().await;
            let pool = pools.entry(key.to_string()).or_insert_with(|| KeyedPool {
                idle: Vec::new(),
                total: 0,
            });
            while let Some(candidate) = pool.idle.pop() {
                if candidate.is_alive() {
                    candidate.mark_in_use();
                    return Ok(candidate);
                }
                pool.total = pool.total.saturating_sub(1);
            }
            if pool.total < self.config.max_size {
                pool.total += 1;
            } else {
                log::debug!(
                    "[ShellPool] key `{key}` at capacity ({}), spawning a transient shell",
                    self.config.max_size
                );
                drop(pools);
                let handle = ShellHandle::spawn(shell_exe, cwd, HashMap::new(), env_info).await?;
                handle.mark_in_use();
                return Ok(Arc::new(handle));
            }
        }
        let handle = ShellHandle::spawn(shell_exe, cwd, HashMap::new(), env_info).await?;
        handle.mark_in_use();
        Ok(Arc::new(handle))
    }

    pub async fn release(&self, key: &str, handle: Arc<ShellHandle>) {
        handle.mark_idle();
        handle.touch().await;
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get_mut(key) {
            if pool.idle.len() < self.config.max_size && handle.is_alive() {
                pool.idle.push(handle);
                return;
            }
        }
        // Over the tracked cap, or pool has since been cleared: this
        // handle was transient or is stale, let it drop and die.
        handle.kill().await;
    }

    pub async fn clear(&self) {
        let mut pools = self.pools.lock().await;
        for pool in pools.values_mut() {
            for handle in pool.idle.drain(..) {
                handle.kill().await;
            }
            pool.total = 0;
        }
        pools.clear();
    }

    pub async fn size(&self, key: &str) -> usize {
        self.pools
            .lock()
            .await
            .get(key)
            .map(|p| p.idle.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bottles_common::OsFamily;
    use serial_test::serial;
    use std::collections::BTreeMap;

    fn test_env() -> EnvironmentInfo {
        EnvironmentInfo {
            tools: BTreeMap::new(),
            os_family: OsFamily::current(),
            shell: "bash".to_string(),
        }
    }

    #[tokio::test]
    #[serial]
    async fn acquire_release_acquire_returns_same_handle() {
        clear().await;
        let dir = tempfile::tempdir().unwrap();
        let env = test_env();
        let h1 = acquire("test-key-a", None, dir.path(), &env).await.unwrap();
        let id1 = h1.shell_id.clone();
        release("test-key-a", h1).await;
        let h2 = acquire("test-key-a", None, dir.path(), &env).await.unwrap();
        assert_eq!(h2.shell_id, id1);
        release("test-key-a", h2).await;
        clear().await;
    }

    #[tokio::test]
    #[serial]
    async fn clear_empties_every_pool() {
        clear().await;
        let dir = tempfile::tempdir().unwrap();
        let env = test_env();
        let h = acquire("test-key-b", None, dir.path(), &env).await.unwrap();
        release("test-key-b", h).await;
        assert_eq!(size("test-key-b").await, 1);
        clear().await;
        assert_eq!(size("test-key-b").await, 0);
    }
}
