//! Output hooks.
//!
//! A hook is a caller-supplied async function that consumes a running
//! command's output. It receives a [`Hook`] holding the live stdout/stderr
//! receivers, a back-reference to the runner (for status and identity) and
//! the closing end of the hook's completion signal.
//!
//! The completion signal closes when the hook calls [`Hook::close`] or when
//! the `Hook` is dropped, so a hook that simply returns (or panics) never
//! leaves `Cmd::wait` hanging.
//!
//! ```rust,no_run
//! use hsu_command::{Cmd, Hook, Options, StreamType};
//!
//! async fn print(mut hook: Hook) {
//!     while let Some(line) = hook.next_line().await {
//!         match line.stream {
//!             StreamType::Stdout => println!("{}", line.text),
//!             StreamType::Stderr => eprintln!("{}", line.text),
//!         }
//!     }
//!     hook.close();
//! }
//!
//! # async fn run() -> hsu_common::ProcessResult<()> {
//! let mut cmd = Cmd::new(Options { buffered: false, streaming: true }, "ls", ["-l", "/"]);
//! cmd.add_hook(print)?;
//! cmd.start()?;
//! let exit_code = cmd.wait().await?;
//! # Ok(())
//! # }
//! ```

use futures::future::BoxFuture;
use hsu_process::{CompletionSignal, CompletionTrigger, ProcessRunner, Status, StreamType};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Boxed hook function as stored by the coordinator.
pub(crate) type HookFn = Box<dyn FnOnce(Hook) -> BoxFuture<'static, ()> + Send + 'static>;

pub(crate) fn boxed_hook<F, Fut>(f: F) -> HookFn
where
    F: FnOnce(Hook) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move |hook| Box::pin(f(hook)))
}

/// A hook attached to a command but not started yet.
pub(crate) struct PendingHook {
    pub(crate) func: HookFn,
    pub(crate) done: CompletionTrigger,
    pub(crate) signal: CompletionSignal,
    pub(crate) panicked: Arc<AtomicBool>,
}

/// One line of output with the stream it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: StreamType,
    pub text: String,
}

/// Handle passed to a hook function.
pub struct Hook {
    /// Stdout lines, `None` when streaming is off or once closed by
    /// [`next_line`](Self::next_line).
    pub stdout: Option<mpsc::Receiver<String>>,
    /// Stderr lines, `None` when streaming is off or once closed by
    /// [`next_line`](Self::next_line).
    pub stderr: Option<mpsc::Receiver<String>>,
    runner: Arc<ProcessRunner>,
    done: Option<CompletionTrigger>,
    panicked: Arc<AtomicBool>,
}

impl Hook {
    pub(crate) fn new(
        runner: Arc<ProcessRunner>,
        done: CompletionTrigger,
        panicked: Arc<AtomicBool>,
    ) -> Self {
        Self {
            stdout: runner.take_stdout(),
            stderr: runner.take_stderr(),
            runner,
            done: Some(done),
            panicked,
        }
    }

    /// Command name.
    pub fn name(&self) -> &str {
        self.runner.name()
    }

    /// Command arguments.
    pub fn args(&self) -> &[String] {
        self.runner.args()
    }

    /// Current status of the command.
    pub fn status(&self) -> Status {
        self.runner.status()
    }

    /// The runner this hook observes.
    pub fn runner(&self) -> &Arc<ProcessRunner> {
        &self.runner
    }

    /// Wait until the command itself is finished.
    ///
    /// Useful after draining, to report the exit code: the output channels
    /// close at end-of-file, which can come slightly before the exit.
    pub async fn wait_process(&self) {
        // The hook task is spawned just before the runner starts.
        loop {
            if let Some(done) = self.runner.done() {
                done.wait().await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Next line from whichever stream produces first.
    ///
    /// Returns `None` once both streams are closed (or were never open).
    /// There is no ordering between stdout and stderr lines; lines of one
    /// stream arrive in the order the command wrote them.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        loop {
            if self.stdout.is_none() && self.stderr.is_none() {
                return None;
            }

            tokio::select! {
                line = recv_line(&mut self.stdout) => match line {
                    Some(text) => return Some(OutputLine { stream: StreamType::Stdout, text }),
                    None => self.stdout = None,
                },
                line = recv_line(&mut self.stderr) => match line {
                    Some(text) => return Some(OutputLine { stream: StreamType::Stderr, text }),
                    None => self.stderr = None,
                },
            }
        }
    }

    /// Close the hook's completion signal. Dropping the hook does the same.
    pub fn close(self) {}
}

impl Drop for Hook {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.panicked.store(true, Ordering::SeqCst);
        }
        if let Some(done) = self.done.take() {
            done.close();
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("command", &self.runner.name())
            .field("stdout_open", &self.stdout.is_some())
            .field("stderr_open", &self.stderr.is_some())
            .finish()
    }
}

/// Receive from an optional channel; a missing channel never yields.
async fn recv_line(rx: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsu_process::{completion_pair, RunnerOptions};

    fn streaming_runner() -> Arc<ProcessRunner> {
        Arc::new(ProcessRunner::new(
            RunnerOptions {
                streaming: true,
                ..Default::default()
            },
            "unused",
            ["a", "b"],
        ))
    }

    #[tokio::test]
    async fn test_next_line_merges_streams_until_both_close() {
        let runner = streaming_runner();
        let (trigger, _signal) = completion_pair();
        let mut hook = Hook::new(Arc::clone(&runner), trigger, Arc::new(AtomicBool::new(false)));

        // Replace the runner's channels with ones the test controls.
        let (out_tx, out_rx) = mpsc::channel(8);
        let (err_tx, err_rx) = mpsc::channel(8);
        hook.stdout = Some(out_rx);
        hook.stderr = Some(err_rx);

        out_tx.send("first".to_string()).await.unwrap();
        err_tx.send("oops".to_string()).await.unwrap();
        out_tx.send("second".to_string()).await.unwrap();
        drop(out_tx);
        drop(err_tx);

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(line) = hook.next_line().await {
            match line.stream {
                StreamType::Stdout => stdout.push(line.text),
                StreamType::Stderr => stderr.push(line.text),
            }
        }

        assert_eq!(stdout, vec!["first", "second"]);
        assert_eq!(stderr, vec!["oops"]);
        assert!(hook.stdout.is_none());
        assert!(hook.stderr.is_none());
    }

    #[tokio::test]
    async fn test_next_line_without_streams_returns_none() {
        let runner = Arc::new(ProcessRunner::new(
            RunnerOptions::default(),
            "unused",
            Vec::<String>::new(),
        ));
        let (trigger, _signal) = completion_pair();
        let mut hook = Hook::new(runner, trigger, Arc::new(AtomicBool::new(false)));

        let line = tokio::time::timeout(Duration::from_millis(100), hook.next_line())
            .await
            .expect("no streams means nothing to wait for");
        assert!(line.is_none());
    }

    #[tokio::test]
    async fn test_close_and_drop_close_the_signal() {
        let runner = streaming_runner();

        let (trigger, signal) = completion_pair();
        let hook = Hook::new(Arc::clone(&runner), trigger, Arc::new(AtomicBool::new(false)));
        assert_eq!(hook.name(), "unused");
        assert_eq!(hook.args(), ["a".to_string(), "b".to_string()]);
        assert!(!signal.is_closed());
        hook.close();
        assert!(signal.is_closed());

        let (trigger, signal) = completion_pair();
        let hook = Hook::new(runner, trigger, Arc::new(AtomicBool::new(false)));
        drop(hook);
        assert!(signal.is_closed());
    }

    #[test]
    fn test_panicking_hook_is_flagged() {
        let runner = streaming_runner();
        let (trigger, signal) = completion_pair();
        let panicked = Arc::new(AtomicBool::new(false));
        let hook = Hook::new(runner, trigger, Arc::clone(&panicked));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _hook = hook;
            panic!("hook blew up");
        }));

        assert!(result.is_err());
        assert!(panicked.load(Ordering::SeqCst));
        assert!(signal.is_closed());
    }
}
