//! Error types for running commands.
//!
//! All errors are plain values: a launch failure, an abnormal termination or
//! a refused operation is returned from the call that detected it and also
//! recorded in the runner status. Nothing in the workspace panics on a
//! failed process.
//!
//! ```rust
//! use hsu_common::{ProcessError, ProcessResult};
//!
//! fn spawn() -> ProcessResult<u32> {
//!     Err(ProcessError::spawn_failed("ls", "No such file or directory"))
//! }
//!
//! match spawn() {
//!     Err(ProcessError::SpawnFailed { id, .. }) => assert_eq!(id, "ls"),
//!     _ => unreachable!(),
//! }
//! ```

use thiserror::Error;

/// Errors produced while launching, observing or waiting for a command.
///
/// `Clone` so the runner can keep the terminal error inside every status
/// snapshot it hands out. The `id` field is the command name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("Process spawn failed: {id} - {reason}")]
    SpawnFailed { id: String, reason: String },

    #[error("Process terminated by signal: {id} - {signal}")]
    Signaled { id: String, signal: String },

    #[error("Process wait failed: {id} - {reason}")]
    WaitFailed { id: String, reason: String },

    #[error("Process timeout: {id} - {operation}")]
    Timeout { id: String, operation: String },

    #[error("Process operation cancelled: {id} - {operation}")]
    Cancelled { id: String, operation: String },

    #[error("Process operation not allowed: {id} - {operation} (state: {state})")]
    OperationNotAllowed {
        id: String,
        operation: String,
        state: String,
    },

    #[error("Process configuration error: {id} - {reason}")]
    Configuration { id: String, reason: String },

    #[error("Task panicked for process '{id}': {message}")]
    TaskPanic { id: String, message: String },
}

impl ProcessError {
    pub fn spawn_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn signaled(id: impl Into<String>, signal: impl Into<String>) -> Self {
        Self::Signaled {
            id: id.into(),
            signal: signal.into(),
        }
    }

    pub fn wait_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WaitFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout {
            id: id.into(),
            operation: operation.into(),
        }
    }

    pub fn cancelled(id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Cancelled {
            id: id.into(),
            operation: operation.into(),
        }
    }

    pub fn operation_not_allowed(
        id: impl Into<String>,
        operation: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self::OperationNotAllowed {
            id: id.into(),
            operation: operation.into(),
            state: state.into(),
        }
    }

    pub fn configuration(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn task_panic(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TaskPanic {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Whether waiting was abandoned rather than the process failing.
    pub fn is_wait_abandoned(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled { .. })
    }
}

/// Result type for process operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_error_construction() {
        let error = ProcessError::spawn_failed("missing-binary", "No such file or directory");
        assert!(matches!(error, ProcessError::SpawnFailed { .. }));
        assert_eq!(
            format!("{}", error),
            "Process spawn failed: missing-binary - No such file or directory"
        );

        let error = ProcessError::signaled("sleep", "SIGKILL");
        assert!(format!("{}", error).contains("terminated by signal"));
    }

    #[test]
    fn test_operation_not_allowed_message() {
        let error = ProcessError::operation_not_allowed("ls", "add_hook", "started");
        assert_eq!(
            error.to_string(),
            "Process operation not allowed: ls - add_hook (state: started)"
        );
    }

    #[test]
    fn test_wait_abandoned() {
        assert!(ProcessError::timeout("ls", "wait").is_wait_abandoned());
        assert!(ProcessError::cancelled("ls", "wait").is_wait_abandoned());
        assert!(!ProcessError::spawn_failed("ls", "boom").is_wait_abandoned());
    }

    #[test]
    fn test_errors_compare_by_value() {
        let status_error = ProcessError::wait_failed("ls", "interrupted");
        let snapshot = status_error.clone();
        assert_eq!(status_error, snapshot);
    }
}
