//! Error taxonomy for the Shell-RPC engine.
//!
//! Shell-RPC never swallows an error: every `execute` either completes with
//! an exit code or fails with one of these typed kinds. It performs no
//! retries itself — retry policy belongs to the adapter, because correct
//! retry depends on tool semantics.

use thiserror::Error;

/// Why a command's primary/grace/absolute timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutReason {
    /// Primary timer expired with no activity to push into grace.
    Base,
    /// Grace period elapsed with no recovering activity.
    Silence,
    /// The absolute ceiling fired regardless of activity.
    Absolute,
    /// A `terminate` pattern matched on the output stream.
    Pattern,
}

impl std::fmt::Display for TimeoutReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimeoutReason::Base => "base",
            TimeoutReason::Silence => "silence",
            TimeoutReason::Absolute => "absolute",
            TimeoutReason::Pattern => "pattern",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
pub enum ShellRpcError {
    #[error("[ShellRpc] failed to spawn shell: {0}")]
    SpawnFailed(String),

    #[error("[ShellRpc] failed to write to shell stdin: {0}")]
    WriteFailed(String),

    #[error("[ShellRpc] stream closed before end marker for command {command_id}")]
    MarkerLost { command_id: String },

    #[error("[ShellRpc] command timed out ({reason})")]
    Timeout { reason: TimeoutReason },

    #[error("[ShellRpc] shell process is no longer alive")]
    ShellDead,
}
