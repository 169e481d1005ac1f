//! Request/response shapes for a single `execute` call.

use crate::error::TimeoutReason;
use crate::timeout::TimeoutConfig;

/// A command submitted to a shell handle. `command_id` is monotone per
/// shell and used to frame the command's markers.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: String,
    pub timeout: TimeoutConfig,
    pub command_id: String,
}

/// Result of running a command to completion or to a timeout.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub timeout_reason: Option<TimeoutReason>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}
