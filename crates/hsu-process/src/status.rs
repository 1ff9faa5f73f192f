//! Runner status snapshots.

use chrono::{DateTime, Utc};
use hsu_common::ProcessError;
use std::fmt;

/// Exit code reported while a command has not exited normally.
pub const EXIT_UNKNOWN: i32 = -1;

/// Output stream of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Stdout => write!(f, "stdout"),
            StreamType::Stderr => write!(f, "stderr"),
        }
    }
}

/// Point-in-time view of a command.
///
/// `stdout` and `stderr` hold the buffered lines when the runner was built
/// with `buffered: true`; they are empty otherwise. Snapshots taken while the
/// command runs contain the lines read so far.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    /// Command name as given to the runner.
    pub name: String,
    /// OS process id, 0 until spawned.
    pub pid: u32,
    /// True once the command exited on its own (any exit code). False when it
    /// was never started, is still running, failed to launch or was stopped.
    pub complete: bool,
    /// Exit code, [`EXIT_UNKNOWN`] until a normal exit.
    pub exit: i32,
    /// Terminal error, if any.
    pub error: Option<ProcessError>,
    /// Set when the spawn was attempted (also on launch failure).
    pub start_ts: Option<DateTime<Utc>>,
    /// Set once the command is finished.
    pub stop_ts: Option<DateTime<Utc>>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl Status {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pid: 0,
            complete: false,
            exit: EXIT_UNKNOWN,
            error: None,
            start_ts: None,
            stop_ts: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    /// Whether the spawn has happened.
    pub fn is_started(&self) -> bool {
        self.start_ts.is_some()
    }

    /// Whether the runner is finished with the command, whatever the outcome.
    pub fn is_finished(&self) -> bool {
        self.stop_ts.is_some()
    }

    /// Time between start and stop, or until now while still running.
    /// Zero if never started.
    pub fn runtime(&self) -> chrono::Duration {
        match (self.start_ts, self.stop_ts) {
            (Some(start), Some(stop)) => stop - start,
            (Some(start), None) => Utc::now() - start,
            _ => chrono::Duration::zero(),
        }
    }

    pub(crate) fn lines_mut(&mut self, stream: StreamType) -> &mut Vec<String> {
        match stream {
            StreamType::Stdout => &mut self.stdout,
            StreamType::Stderr => &mut self.stderr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_status_is_idle() {
        let status = Status::new("ls");
        assert_eq!(status.name, "ls");
        assert_eq!(status.exit, EXIT_UNKNOWN);
        assert!(!status.is_started());
        assert!(!status.is_finished());
        assert_eq!(status.runtime(), chrono::Duration::zero());
    }

    #[test]
    fn test_runtime_uses_stop_timestamp() {
        let mut status = Status::new("ls");
        let start = Utc::now();
        status.start_ts = Some(start);
        status.stop_ts = Some(start + chrono::Duration::milliseconds(250));
        assert_eq!(status.runtime(), chrono::Duration::milliseconds(250));
    }

    #[test]
    fn test_lines_by_stream() {
        let mut status = Status::new("ls");
        status.lines_mut(StreamType::Stderr).push("oops".to_string());
        assert!(status.stdout.is_empty());
        assert_eq!(status.stderr, vec!["oops".to_string()]);
        assert_eq!(StreamType::Stderr.to_string(), "stderr");
    }
}
