//! # HSU Common
//!
//! Error types shared by the process runner and the command coordinator.
//!
//! Every fallible operation in the workspace returns a [`ProcessResult`],
//! so callers match on a single [`ProcessError`] enum whichever layer
//! detected the failure.

pub mod errors;

// Re-export commonly used items
pub use errors::{ProcessError, ProcessResult};
