//! Shell-RPC Engine: turns a persistent interactive shell into a
//! request/response executor with strong command demarcation and a
//! resilient timeout discipline.
//!
//! This is the densest sub-module of the Bottles core. [`timeout`] holds
//! the pure decision logic, [`shell`] drives it against a real child
//! process, and [`pool`] amortizes shell spawn cost across bottles.

pub mod command;
pub mod error;
pub mod pool;
pub mod profile;
pub mod shell;
pub mod timeout;

pub use command::{CommandRequest, CommandResult};
pub use error::{ShellRpcError, TimeoutReason};
pub use profile::TimeoutProfile;
pub use shell::ShellHandle;
pub use timeout::{Action, PatternAction, Stream, TimeoutConfig};
