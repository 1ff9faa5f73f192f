//! Command coordinator.
//!
//! [`Cmd`] joins three concurrent actors: the OS process, an optional hook
//! task consuming its output, and the caller waiting for both.
//!
//! Protocol:
//! 1. `start` spawns the hook task first, then the process, so the hook is
//!    already draining when the first line is written.
//! 2. `wait` awaits the process completion signal, then the hook completion
//!    signal, then returns the exit code (or the terminal error).
//!
//! `wait` before `start` never completes; use [`Cmd::wait_timeout`] or
//! [`Cmd::wait_with_cancel`] when an unbounded wait is not acceptable.

use crate::config::CmdConfig;
use crate::hook::{boxed_hook, Hook, PendingHook};
use crate::options::Options;
use hsu_common::{ProcessError, ProcessResult};
use hsu_process::{completion_pair, CompletionSignal, ProcessRunner, RunnerOptions, Status};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Interval between status checks in [`Cmd::wait_started`].
pub const START_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// State recorded by `start`.
struct Started {
    process_done: CompletionSignal,
    hook: Option<StartedHook>,
}

struct StartedHook {
    done: CompletionSignal,
    panicked: Arc<AtomicBool>,
    task: Mutex<HookTask>,
}

#[derive(Default)]
struct HookTask {
    handle: Option<JoinHandle<()>>,
    /// Outcome of the first check, returned to every later waiter.
    outcome: Option<Result<(), String>>,
}

/// A command with an optional output hook.
pub struct Cmd {
    runner: Arc<ProcessRunner>,
    hook: Option<PendingHook>,
    started: Option<Started>,
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cmd")
            .field("runner", &self.runner)
            .field("has_hook", &self.has_hook())
            .field("started", &self.is_started())
            .finish()
    }
}

impl Cmd {
    /// Build a command. Nothing is validated or spawned here; a missing
    /// executable is reported by [`start`](Self::start).
    pub fn new<I, S>(options: Options, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_runner_options(options.into(), command, args)
    }

    /// Build a command with the full runner option set (working directory,
    /// environment, channel capacity).
    pub fn with_runner_options<I, S>(
        options: RunnerOptions,
        command: impl Into<String>,
        args: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            runner: Arc::new(ProcessRunner::new(options, command, args)),
            hook: None,
            started: None,
        }
    }

    /// Build a command from a loaded configuration.
    pub fn from_config(config: &CmdConfig) -> Self {
        Self::with_runner_options(
            config.runner_options(),
            config.command.clone(),
            config.args.iter().cloned(),
        )
    }

    /// Attach the hook run when the command starts.
    ///
    /// Before `start`, a second call replaces the first hook. After `start`
    /// the hook task is already running and attaching is refused.
    pub fn add_hook<F, Fut>(&mut self, f: F) -> ProcessResult<()>
    where
        F: FnOnce(Hook) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.started.is_some() {
            return Err(ProcessError::operation_not_allowed(
                self.name(),
                "add_hook",
                "started",
            ));
        }

        if self.hook.is_some() {
            warn!(command = %self.name(), "Replacing previously attached hook");
        }

        let (done, signal) = completion_pair();
        self.hook = Some(PendingHook {
            func: boxed_hook(f),
            done,
            signal,
            panicked: Arc::new(AtomicBool::new(false)),
        });
        Ok(())
    }

    /// Start the hook (if any), then spawn the process. Returns without
    /// waiting for the process.
    ///
    /// Returns the launch error when the spawn failed. Must be called from
    /// within a Tokio runtime, and only once.
    pub fn start(&mut self) -> ProcessResult<()> {
        if self.started.is_some() {
            return Err(ProcessError::operation_not_allowed(
                self.name(),
                "start",
                "started",
            ));
        }

        let hook = self.hook.take().map(|pending| {
            let hook = Hook::new(
                Arc::clone(&self.runner),
                pending.done,
                Arc::clone(&pending.panicked),
            );
            debug!(command = %self.name(), "Starting hook before spawning process");
            let handle = tokio::spawn((pending.func)(hook));
            StartedHook {
                done: pending.signal,
                panicked: pending.panicked,
                task: Mutex::new(HookTask {
                    handle: Some(handle),
                    outcome: None,
                }),
            }
        });

        if hook.is_none() {
            // Nobody consumes the stream channels: release them so the
            // readers keep draining instead of blocking on a full channel.
            drop(self.runner.take_stdout());
            drop(self.runner.take_stderr());
        }

        let process_done = self.runner.start();
        self.started = Some(Started { process_done, hook });

        match self.runner.error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Wait until the process has actually been started by the OS.
    ///
    /// For fire-and-forget use, where the caller may exit right after
    /// `start`. Polls the status every [`START_POLL_INTERVAL`]; the runner
    /// exposes no dedicated start event. Returns the status error once
    /// started, which includes a launch failure. Never returns if `start`
    /// was not called.
    pub async fn wait_started(&self) -> ProcessResult<()> {
        while !self.runner.is_started() {
            tokio::time::sleep(START_POLL_INTERVAL).await;
        }
        match self.runner.error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Wait for the process to finish and, if a hook is attached, for the
    /// hook to close its completion signal.
    ///
    /// Returns the exit code of a process that exited on its own, whatever
    /// the code. Returns the terminal error for a launch failure or a
    /// process killed by a signal, and `TaskPanic` if the hook panicked.
    /// Never returns if `start` was not called.
    pub async fn wait(&self) -> ProcessResult<i32> {
        let started = match &self.started {
            Some(started) => started,
            None => {
                warn!(command = %self.name(), "wait called before start, blocking forever");
                return std::future::pending().await;
            }
        };

        started.process_done.wait().await;

        if let Some(hook) = &started.hook {
            debug!(command = %self.name(), "Process finished, waiting for hook");
            hook.done.wait().await;
            self.check_hook(hook).await?;
        }

        let result = self.runner.exit_result();
        debug!(command = %self.name(), result = ?result, "Command finished");
        result
    }

    /// [`wait`](Self::wait) bounded by `timeout`. The process keeps running
    /// on timeout; call [`stop`](Self::stop) to end it.
    pub async fn wait_timeout(&self, timeout: Duration) -> ProcessResult<i32> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(command = %self.name(), ?timeout, "Timed out waiting for command");
                Err(ProcessError::timeout(
                    self.name(),
                    format!("wait exceeded {:?}", timeout),
                ))
            }
        }
    }

    /// [`wait`](Self::wait) abandoned when `token` is cancelled. The process
    /// keeps running on cancellation.
    pub async fn wait_with_cancel(&self, token: &CancellationToken) -> ProcessResult<i32> {
        tokio::select! {
            result = self.wait() => result,
            _ = token.cancelled() => {
                info!(command = %self.name(), "Wait cancelled");
                Err(ProcessError::cancelled(self.name(), "wait"))
            }
        }
    }

    /// Status of the underlying runner.
    pub fn status(&self) -> Status {
        self.runner.status()
    }

    /// The underlying runner.
    pub fn runner(&self) -> &Arc<ProcessRunner> {
        &self.runner
    }

    /// Kill the process. `wait` then returns the signal error.
    pub fn stop(&self) -> ProcessResult<()> {
        self.runner.stop()
    }

    pub fn name(&self) -> &str {
        self.runner.name()
    }

    pub fn args(&self) -> &[String] {
        self.runner.args()
    }

    /// Whether a hook is attached (pending or started).
    pub fn has_hook(&self) -> bool {
        self.hook.is_some()
            || self
                .started
                .as_ref()
                .map_or(false, |started| started.hook.is_some())
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    /// Report a panicked hook task. The hook records the panic while
    /// unwinding, before its completion signal closes.
    ///
    /// Decided once, on the first wait. A hook that closes its signal and
    /// panics afterwards is past the point `wait` observes and is not
    /// reported.
    async fn check_hook(&self, hook: &StartedHook) -> ProcessResult<()> {
        let mut task = hook.task.lock().await;

        if task.outcome.is_none() {
            let handle = task.handle.take();
            let finished = handle.as_ref().map_or(false, |h| h.is_finished());
            let outcome = match handle {
                Some(handle) if hook.panicked.load(Ordering::SeqCst) || finished => {
                    match handle.await {
                        Ok(()) => Ok(()),
                        Err(e) if e.is_panic() => Err(panic_message(e.into_panic())),
                        Err(e) => Err(e.to_string()),
                    }
                }
                _ => Ok(()),
            };
            task.outcome = Some(outcome);
        }

        match &task.outcome {
            Some(Err(message)) => Err(ProcessError::task_panic(self.name(), message.clone())),
            _ => Ok(()),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "hook panicked".to_string()
    }
}
