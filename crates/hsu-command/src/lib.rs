//! # HSU Command
//!
//! Run an external command while a hook consumes its output, and wait for
//! both with a single call.
//!
//! This crate provides:
//! - [`Cmd`] - the coordinator: start the hook, spawn the process, join both
//! - [`Hook`] - what a hook function receives: live output channels, status
//!   and its completion signal
//! - [`Options`] - buffered and/or streaming output capture
//! - [`hooks`] - printing, tracing and collecting hooks
//! - [`config`] - YAML run configuration

pub mod cmd;
pub mod config;
pub mod hook;
pub mod hooks;
pub mod options;

#[cfg(all(test, unix))]
mod cmd_tests;

// Re-export main types
pub use cmd::{Cmd, START_POLL_INTERVAL};
pub use config::CmdConfig;
pub use hook::{Hook, OutputLine};
pub use options::Options;

pub use hsu_common::{ProcessError, ProcessResult};
pub use hsu_process::{
    CompletionSignal, ProcessRunner, RunnerOptions, Status, StreamType, DEFAULT_STREAM_CHANNEL_SIZE,
};
pub use tokio_util::sync::CancellationToken;
