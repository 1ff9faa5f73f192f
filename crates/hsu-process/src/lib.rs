//! # HSU Process
//!
//! Process runner for the HSU command coordinator.
//!
//! This crate provides:
//! - [`ProcessRunner`] - spawns one command and tracks it
//! - [`Status`] - snapshot of exit code, timestamps, error and buffered output
//! - Per-line stdout/stderr channels that close at end-of-file
//! - [`CompletionSignal`] - one-shot, close-to-notify, many waiters
//! - Process existence checks and command validation

pub mod check;
pub mod runner;
pub mod signal;
pub mod status;
pub mod validation;

// Re-export main types
pub use check::process_exists;
pub use runner::{ProcessRunner, RunnerOptions, DEFAULT_STREAM_CHANNEL_SIZE};
pub use signal::{completion_pair, CompletionSignal, CompletionTrigger};
pub use status::{Status, StreamType, EXIT_UNKNOWN};
pub use validation::{validate_command, validate_working_directory};
