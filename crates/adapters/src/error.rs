//! Error taxonomy shared by every adapter. Every adapter method fails with
//! this type; low-level `ShellRpcError`/`VolumeError` values are
//! translated into it with the original attached as `details`.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidManifest,
    NetworkFailure,
    ToolMissing,
    Timeout,
    Conflict,
    Permission,
    Unknown,
}

#[derive(Debug, Error)]
#[error("[{component}] {message}")]
pub struct PackageManagerError {
    pub kind: ErrorKind,
    pub component: String,
    pub message: String,
    #[source]
    pub details: Option<anyhow::Error>,
}

impl PackageManagerError {
    pub fn new(component: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            component: component.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<anyhow::Error>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn tool_missing(component: &str, tool: &str, searched: &[String]) -> Self {
        Self::new(
            component,
            ErrorKind::ToolMissing,
            format!("tool `{tool}` not found; searched: {}", searched.join(", ")),
        )
    }

    pub fn timeout(component: &str, reason: bottles_shell_rpc::TimeoutReason) -> Self {
        Self::new(component, ErrorKind::Timeout, format!("timed out ({reason})"))
    }
}

impl From<bottles_shell_rpc::ShellRpcError> for PackageManagerError {
    fn from(err: bottles_shell_rpc::ShellRpcError) -> Self {
        let kind = match &err {
            bottles_shell_rpc::ShellRpcError::Timeout { .. } => ErrorKind::Timeout,
            bottles_shell_rpc::ShellRpcError::ShellDead => ErrorKind::Unknown,
            _ => ErrorKind::Unknown,
        };
        PackageManagerError::new("ShellRpc", kind, err.to_string()).with_details(err)
    }
}

impl From<bottles_volume::VolumeError> for PackageManagerError {
    fn from(err: bottles_volume::VolumeError) -> Self {
        let kind = match &err {
            bottles_volume::VolumeError::PermissionDenied { .. } => ErrorKind::Permission,
            bottles_volume::VolumeError::NotFound { .. } => ErrorKind::NotFound,
            bottles_volume::VolumeError::AlreadyMounted { .. } => ErrorKind::Conflict,
        };
        PackageManagerError::new("VolumeController", kind, err.to_string()).with_details(err)
    }
}
