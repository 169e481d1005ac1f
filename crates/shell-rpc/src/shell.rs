//! A single persistent interactive shell child process, framed command
//! execution, and the termination path for timed-out commands.
//!
//! Commands are framed between an implicit start (the command is simply
//! written to stdin) and a pair of end markers — one on stdout carrying
//! the exit code, one on stderr — each tagged with a random per-spawn
//! nonce plus a monotone per-shell command id, so a marker can never
//! collide with ordinary output in practice.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bottles_common::EnvironmentInfo;
use rand::Rng;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::command::CommandResult;
use crate::error::ShellRpcError;
use crate::profile::TimeoutProfile;
use crate::timeout::{ChunkDecision, State, Stream, TimeoutStateMachine};

/// Essentials kept even when `EnvironmentInfo` found nothing — PATH is
/// rebuilt from scratch per spawn, never inherited wholesale: inheritance
/// leaked host variables that broke test commands historically. This is a
/// hard rule, not a convenience default.
#[cfg(unix)]
const SYSTEM_ESSENTIALS: &[&str] = &["/usr/local/bin", "/usr/bin", "/bin", "/usr/sbin", "/sbin"];
#[cfg(windows)]
const SYSTEM_ESSENTIALS: &[&str] = &["C:\\Windows\\System32", "C:\\Windows"];

/// Gate for verbose per-chunk timeout tracing.
fn debug_enabled() -> bool {
    std::env::var("DEBUG_SHELL_RPC").is_ok()
}

fn rebuild_path(env_info: &EnvironmentInfo) -> String {
    let sep = if cfg!(windows) { ';' } else { ':' };
    let mut dirs: Vec<String> = Vec::new();
    for tool in env_info.tools.values() {
        if let Some(path) = &tool.path {
            if let Some(parent) = path.parent() {
                let parent = parent.to_string_lossy().to_string();
                if !dirs.contains(&parent) {
                    dirs.push(parent);
                }
            }
        }
    }
    for essential in SYSTEM_ESSENTIALS {
        let essential = essential.to_string();
        if !dirs.contains(&essential) {
            dirs.push(essential);
        }
    }
    dirs.join(&sep.to_string())
}

/// A chunk of raw output read off the child's stdout or stderr pipe.
type ReaderMsg = (Stream, Vec<u8>);

struct ShellIo {
    stdin: ChildStdin,
    rx: mpsc::UnboundedReceiver<ReaderMsg>,
}

/// Owned by at most one bottle at a time, returned to the pool on release.
pub struct ShellHandle {
    pub shell_id: String,
    child: Mutex<Child>,
    io: Mutex<ShellIo>,
    nonce: String,
    next_command_id: AtomicU64,
    alive: Arc<AtomicBool>,
    in_use: AtomicBool,
    last_used: Mutex<Instant>,
    pub cwd: PathBuf,
}

impl ShellHandle {
    /// Spawn a new persistent shell. `shell_exe` overrides the OS-family
    /// default shell selection; pass `None` to use `env_info.shell`.
    pub async fn spawn(
        shell_exe: Option<&str>,
        cwd: &Path,
        extra_env: HashMap<String, String>,
        env_info: &EnvironmentInfo,
    ) -> Result<Self, ShellRpcError> {
        let shell = shell_exe.unwrap_or(&env_info.shell);
        let mut command = Command::new(shell);
        if !cfg!(windows) {
            command.arg("-s");
        }
        command
            .current_dir(cwd)
            .env_clear()
            .env("PATH", rebuild_path(env_info))
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PIP_DISABLE_PIP_VERSION_CHECK", "1")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &extra_env {
            command.env(key, value);
        }
        #[cfg(unix)]
        {
            // New process group so a timeout can signal the whole group
            // (shell + any foreground child it forked) without a pty.
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|e| ShellRpcError::SpawnFailed(e.to_string()))?;

        let stdin = child.stdin.take().ok_or_else(|| {
            ShellRpcError::SpawnFailed("child stdin was not piped".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ShellRpcError::SpawnFailed("child stdout was not piped".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            ShellRpcError::SpawnFailed("child stderr was not piped".to_string())
        })?;

        let alive = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_reader(stdout, Stream::Stdout, tx.clone(), alive.clone());
        spawn_reader(stderr, Stream::Stderr, tx, alive.clone());

        let nonce: u64 = rand::thread_rng().gen();
        Ok(Self {
            shell_id: uuid::Uuid::new_v4().to_string(),
            child: Mutex::new(child),
            io: Mutex::new(ShellIo { stdin, rx }),
            nonce: format!("{nonce:016x}"),
            next_command_id: AtomicU64::new(0),
            alive,
            in_use: AtomicBool::new(false),
            last_used: Mutex::new(Instant::now()),
            cwd: cwd.to_path_buf(),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn mark_in_use(&self) {
        self.in_use.store(true, Ordering::SeqCst);
    }

    pub fn mark_idle(&self) {
        self.in_use.store(false, Ordering::SeqCst);
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::SeqCst)
    }

    pub async fn touch(&self) {
        *self.last_used.lock().await = Instant::now();
    }

    pub async fn last_used(&self) -> Instant {
        *self.last_used.lock().await
    }

    /// Run `command` to completion or until its timeout profile fires.
    /// Exactly one command executes per shell at a time: concurrent
    /// callers queue on the internal `io` mutex in FIFO order.
    pub async fn execute(
        &self,
        command: &str,
        profile: TimeoutProfile,
        tool: &str,
    ) -> Result<CommandResult, ShellRpcError> {
        if !self.is_alive() {
            return Err(ShellRpcError::ShellDead);
        }
        self.touch().await;

        let command_id = self.next_command_id.fetch_add(1, Ordering::SeqCst);
        let tag = format!("{}_{command_id}", self.nonce);
        let stdout_marker = Regex::new(&format!(
            r"___BOTTLES_END_{}_(-?\d+)___",
            regex::escape(&tag)
        ))
        .expect("marker regex is well-formed");
        let stderr_marker =
            Regex::new(&format!(r"___BOTTLES_END_{}___", regex::escape(&tag)))
                .expect("marker regex is well-formed");

        let framed = format!(
            "{command}\nprintf '___BOTTLES_END_{tag}_%s___\\n' \"$?\"\nprintf '___BOTTLES_END_{tag}___\\n' 1>&2\n"
        );

        let config = profile.config_for(tool);
        let mut io = self.io.lock().await;
        io.stdin
            .write_all(framed.as_bytes())
            .await
            .map_err(|e| ShellRpcError::WriteFailed(e.to_string()))?;
        io.stdin
            .flush()
            .await
            .map_err(|e| ShellRpcError::WriteFailed(e.to_string()))?;

        let start = Instant::now();
        let mut machine = TimeoutStateMachine::start(config, start);
        let mut stdout_buf = String::new();
        let mut stderr_buf = String::new();
        let mut exit_code: Option<i32> = None;
        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut reason = None;

        'outer: loop {
            let primary_deadline = machine.primary_deadline();
            let grace_deadline = machine.grace_deadline();
            let absolute_deadline = machine.absolute_deadline();

            tokio::select! {
                biased;

                maybe_msg = io.rx.recv() => {
                    match maybe_msg {
                        Some((stream, bytes)) => {
                            let text = String::from_utf8_lossy(&bytes).to_string();
                            let now = Instant::now();
                            match stream {
                                Stream::Stdout => {
                                    stdout_buf.push_str(&text);
                                    if let Some(caps) = stdout_marker.captures(&stdout_buf.clone()) {
                                        exit_code = caps.get(1).and_then(|m| m.as_str().parse().ok());
                                        stdout_buf = stdout_marker.replace(&stdout_buf, "").to_string();
                                        stdout_done = true;
                                    }
                                }
                                Stream::Stderr => {
                                    stderr_buf.push_str(&text);
                                    if stderr_marker.is_match(&stderr_buf) {
                                        stderr_buf = stderr_marker.replace(&stderr_buf, "").to_string();
                                        stderr_done = true;
                                    }
                                }
                            }
                            let decision = machine.on_chunk(stream, &text, now);
                            if debug_enabled() {
                                log::trace!(
                                    "[ShellRpc] command {command_id} chunk on {stream:?}, state={:?}, decision={decision:?}",
                                    machine.state()
                                );
                            }
                            if let ChunkDecision::Terminate(r) = decision {
                                reason = Some(r);
                                self.terminate().await;
                                drain(&mut io.rx, &mut stdout_buf, &mut stderr_buf).await;
                                break 'outer;
                            }
                            if stdout_done && stderr_done {
                                break 'outer;
                            }
                        }
                        None => {
                            self.alive.store(false, Ordering::SeqCst);
                            return Err(ShellRpcError::MarkerLost {
                                command_id: command_id.to_string(),
                            });
                        }
                    }
                }

                _ = tokio::time::sleep_until(primary_deadline), if machine.state() == State::Active => {
                    machine.on_primary_expired(Instant::now());
                }

                _ = tokio::time::sleep_until(grace_deadline.unwrap_or(absolute_deadline)),
                    if machine.state() == State::Grace => {
                    reason = Some(machine.on_grace_expired());
                    self.terminate().await;
                    drain(&mut io.rx, &mut stdout_buf, &mut stderr_buf).await;
                    break 'outer;
                }

                _ = tokio::time::sleep_until(absolute_deadline) => {
                    reason = Some(machine.on_absolute_expired());
                    self.terminate().await;
                    drain(&mut io.rx, &mut stdout_buf, &mut stderr_buf).await;
                    break 'outer;
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        Ok(CommandResult {
            stdout: stdout_buf,
            stderr: stderr_buf,
            exit_code,
            duration_ms,
            timed_out: reason.is_some(),
            timeout_reason: reason,
        })
    }

    /// Send the termination signal to the shell's whole process group.
    /// Every caller that reaches this point unconditionally clears its
    /// timers afterward by virtue of returning from `execute` — timeout
    /// cleanup must never leak.
    async fn terminate(&self) {
        #[cfg(unix)]
        {
            let child = self.child.lock().await;
            if let Some(pid) = child.id() {
                use nix::sys::signal::{killpg, Signal};
                use nix::unistd::Pid;
                let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }
        #[cfg(windows)]
        {
            // No job-object tree kill without pulling in windows-sys here;
            // best effort matches spec's documented Windows approximation.
            let mut child = self.child.lock().await;
            let _ = child.start_kill();
        }
    }

    /// Force-destroy the shell, e.g. when the pool evicts it.
    pub async fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
    }
}

/// Drain any further output for a short fixed window (~100ms) after
/// termination.
async fn drain(
    rx: &mut mpsc::UnboundedReceiver<ReaderMsg>,
    stdout_buf: &mut String,
    stderr_buf: &mut String,
) {
    let deadline = Instant::now() + std::time::Duration::from_millis(100);
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            maybe = rx.recv() => {
                match maybe {
                    Some((Stream::Stdout, bytes)) => {
                        stdout_buf.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some((Stream::Stderr, bytes)) => {
                        stderr_buf.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    None => break,
                }
            }
        }
    }
}

fn spawn_reader(
    mut stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    kind: Stream,
    tx: mpsc::UnboundedSender<ReaderMsg>,
    alive: Arc<AtomicBool>,
) {
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => {
                    alive.store(false, Ordering::SeqCst);
                    break;
                }
                Ok(n) => {
                    if tx.send((kind, buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("[ShellRpc] read error on {kind:?}: {e}");
                    alive.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimeoutReason;
    use bottles_common::{EnvironmentInfo, OsFamily};
    use std::collections::BTreeMap;

    fn test_env() -> EnvironmentInfo {
        EnvironmentInfo {
            tools: BTreeMap::new(),
            os_family: OsFamily::current(),
            shell: "bash".to_string(),
        }
    }

    #[tokio::test]
    async fn executes_simple_command_and_captures_exit_code() {
        let _ = env_logger::try_init();
        let dir = tempfile::tempdir().unwrap();
        let shell = ShellHandle::spawn(None, dir.path(), HashMap::new(), &test_env())
            .await
            .unwrap();
        let result = shell
            .execute("echo hello", TimeoutProfile::Quick, "pip")
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("hello"));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn sequential_commands_do_not_bleed_output() {
        let dir = tempfile::tempdir().unwrap();
        let shell = ShellHandle::spawn(None, dir.path(), HashMap::new(), &test_env())
            .await
            .unwrap();
        let first = shell
            .execute("echo one", TimeoutProfile::Quick, "pip")
            .await
            .unwrap();
        let second = shell
            .execute("echo two", TimeoutProfile::Quick, "pip")
            .await
            .unwrap();
        assert!(first.stdout.contains("one"));
        assert!(!first.stdout.contains("two"));
        assert!(second.stdout.contains("two"));
        assert!(!second.stdout.contains("one"));
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let shell = ShellHandle::spawn(None, dir.path(), HashMap::new(), &test_env())
            .await
            .unwrap();
        let result = shell
            .execute("exit 7", TimeoutProfile::Quick, "pip")
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(7));
    }

    /// Output that merely looks like an end marker (wrong nonce/command
    /// id) must not be mistaken for the real one — only the tag unique to
    /// this spawn and command closes the command.
    #[tokio::test]
    async fn marker_lookalike_in_output_does_not_close_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let shell = ShellHandle::spawn(None, dir.path(), HashMap::new(), &test_env())
            .await
            .unwrap();
        let result = shell
            .execute(
                "printf '___BOTTLES_END_deadbeef_0_0___\\n'; echo real",
                TimeoutProfile::Quick,
                "pip",
            )
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("___BOTTLES_END_deadbeef_0_0___"));
        assert!(result.stdout.contains("real"));
    }

    /// A terminate pattern on stderr kills the command well before its
    /// base timeout. Shrinks the Install profile's
    /// timers via the CI multiplier override so the test runs in
    /// milliseconds instead of the profile's real 30s/600s durations.
    #[tokio::test]
    #[serial_test::serial]
    async fn timeout_pattern_terminate_kills_command_promptly() {
        std::env::set_var("BOTTLES_CI_MULTIPLIER_PIP", "0.01");
        let dir = tempfile::tempdir().unwrap();
        let shell = ShellHandle::spawn(None, dir.path(), HashMap::new(), &test_env())
            .await
            .unwrap();
        let start = std::time::Instant::now();
        let result = shell
            .execute(
                "printf 'Collecting foo\\n'; sleep 0.05; printf 'ERROR: conflicting dependencies\\n' 1>&2; sleep 5",
                TimeoutProfile::Install,
                "pip",
            )
            .await
            .unwrap();
        std::env::remove_var("BOTTLES_CI_MULTIPLIER_PIP");

        assert!(result.timed_out);
        assert_eq!(result.timeout_reason, Some(TimeoutReason::Pattern));
        assert_ne!(result.exit_code, Some(0));
        assert!(start.elapsed() < std::time::Duration::from_secs(2));
    }

    /// Output arriving mid-grace recovers the command to `Active` instead
    /// of letting the grace timer expire it.
    #[tokio::test]
    #[serial_test::serial]
    async fn grace_period_recovery_completes_without_timeout() {
        std::env::set_var("BOTTLES_CI_MULTIPLIER_PIP", "0.1");
        let dir = tempfile::tempdir().unwrap();
        let shell = ShellHandle::spawn(None, dir.path(), HashMap::new(), &test_env())
            .await
            .unwrap();
        // Quick profile scaled by 0.1: base=500ms, grace=200ms. Sleeping
        // 600ms lands the second chunk squarely mid-grace (primary fires at
        // 500ms, grace expires at 700ms).
        let result = shell
            .execute(
                "printf 'burst\\n'; sleep 0.6; printf 'still here\\n'; exit 0",
                TimeoutProfile::Quick,
                "pip",
            )
            .await
            .unwrap();
        std::env::remove_var("BOTTLES_CI_MULTIPLIER_PIP");

        assert!(!result.timed_out);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("still here"));
    }
}
