//! Process runner.
//!
//! [`ProcessRunner`] spawns one command and tracks it:
//! - a [`Status`] accessor that can be read at any time from any task,
//! - optional buffering of every output line into the status,
//! - optional streaming of output lines on two bounded channels, one per
//!   stream, each closed at end-of-file,
//! - a [`CompletionSignal`] closed once the command is finished and all of
//!   its output has been read.
//!
//! Stdout and stderr are read by one task each, and a monitor task reaps the
//! child. The completion signal only closes after both readers have finished,
//! so a buffered status observed after completion is always whole.

use crate::check::process_exists;
use crate::signal::{completion_pair, CompletionSignal, CompletionTrigger};
use crate::status::{Status, StreamType, EXIT_UNKNOWN};
use chrono::Utc;
use hsu_common::{ProcessError, ProcessResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of each streaming channel, in lines.
pub const DEFAULT_STREAM_CHANNEL_SIZE: usize = 1000;

/// Runner behaviour.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Keep every output line in the status.
    pub buffered: bool,
    /// Send every output line on the stdout/stderr channels.
    pub streaming: bool,
    /// Capacity of each streaming channel. A full channel pauses reading,
    /// which eventually blocks the child on its own writes.
    pub stream_channel_size: usize,
    pub working_directory: Option<PathBuf>,
    /// Added to the inherited environment.
    pub environment: HashMap<String, String>,
}

impl RunnerOptions {
    /// Whether the child's output is piped at all.
    pub fn captures_output(&self) -> bool {
        self.buffered || self.streaming
    }
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            buffered: false,
            streaming: false,
            stream_channel_size: DEFAULT_STREAM_CHANNEL_SIZE,
            working_directory: None,
            environment: HashMap::new(),
        }
    }
}

/// Streaming channel ends. Senders move into the reader tasks on start,
/// receivers are taken by whoever consumes the output.
#[derive(Default)]
struct StreamChannels {
    stdout_tx: Option<mpsc::Sender<String>>,
    stderr_tx: Option<mpsc::Sender<String>>,
    stdout_rx: Option<mpsc::Receiver<String>>,
    stderr_rx: Option<mpsc::Receiver<String>>,
}

#[derive(Default)]
struct Control {
    done: Option<CompletionSignal>,
    stop_tx: Option<oneshot::Sender<()>>,
}

/// Spawns and tracks a single command.
pub struct ProcessRunner {
    name: String,
    args: Vec<String>,
    options: RunnerOptions,
    status: Arc<RwLock<Status>>,
    channels: Mutex<StreamChannels>,
    control: Mutex<Control>,
}

impl fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("options", &self.options)
            .field("started", &self.control.lock().done.is_some())
            .finish()
    }
}

impl ProcessRunner {
    /// Create a runner. Nothing is checked or spawned until [`start`](Self::start).
    pub fn new<I, S>(options: RunnerOptions, name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let mut channels = StreamChannels::default();
        if options.streaming {
            let capacity = options.stream_channel_size.max(1);
            let (stdout_tx, stdout_rx) = mpsc::channel(capacity);
            let (stderr_tx, stderr_rx) = mpsc::channel(capacity);
            channels = StreamChannels {
                stdout_tx: Some(stdout_tx),
                stderr_tx: Some(stderr_tx),
                stdout_rx: Some(stdout_rx),
                stderr_rx: Some(stderr_rx),
            };
        }

        Self {
            status: Arc::new(RwLock::new(Status::new(&name))),
            name,
            args: args.into_iter().map(Into::into).collect(),
            options,
            channels: Mutex::new(channels),
            control: Mutex::new(Control::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> Status {
        self.status.read().clone()
    }

    /// Whether the spawn has happened (successfully or not).
    pub fn is_started(&self) -> bool {
        self.status.read().is_started()
    }

    /// Current terminal error, without copying the buffered output.
    pub fn error(&self) -> Option<ProcessError> {
        self.status.read().error.clone()
    }

    /// Exit code and terminal error, without copying the buffered output.
    pub fn exit_result(&self) -> ProcessResult<i32> {
        let status = self.status.read();
        match &status.error {
            Some(e) => Err(e.clone()),
            None => Ok(status.exit),
        }
    }

    /// Take the stdout line receiver. `None` when streaming is off or the
    /// receiver was already taken.
    pub fn take_stdout(&self) -> Option<mpsc::Receiver<String>> {
        self.channels.lock().stdout_rx.take()
    }

    /// Take the stderr line receiver. `None` when streaming is off or the
    /// receiver was already taken.
    pub fn take_stderr(&self) -> Option<mpsc::Receiver<String>> {
        self.channels.lock().stderr_rx.take()
    }

    /// Completion signal, once started.
    pub fn done(&self) -> Option<CompletionSignal> {
        self.control.lock().done.clone()
    }

    /// Spawn the command and return its completion signal.
    ///
    /// The spawn itself is synchronous: when this returns, the status either
    /// has a pid and a start timestamp, or a launch error (with start and
    /// stop timestamps set and the signal already closed). Calling `start`
    /// again returns the same signal without spawning anything.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> CompletionSignal {
        let mut control = self.control.lock();
        if let Some(done) = &control.done {
            debug!(command = %self.name, "Runner already started");
            return done.clone();
        }

        let (trigger, done) = completion_pair();
        control.done = Some(done.clone());

        let (stdout_tx, stderr_tx) = {
            let mut channels = self.channels.lock();
            (channels.stdout_tx.take(), channels.stderr_tx.take())
        };

        let mut cmd = self.build_command();

        match cmd.spawn() {
            Ok(mut child) => {
                let pid = child.id().unwrap_or(0);
                {
                    let mut status = self.status.write();
                    status.pid = pid;
                    status.start_ts = Some(Utc::now());
                }
                info!(command = %self.name, pid, "Process spawned");

                let mut readers = Vec::with_capacity(2);
                if let Some(stdout) = child.stdout.take() {
                    readers.push(self.spawn_reader(stdout, StreamType::Stdout, stdout_tx));
                }
                if let Some(stderr) = child.stderr.take() {
                    readers.push(self.spawn_reader(stderr, StreamType::Stderr, stderr_tx));
                }

                let (stop_tx, stop_rx) = oneshot::channel();
                control.stop_tx = Some(stop_tx);

                tokio::spawn(monitor_exit(
                    child,
                    readers,
                    stop_rx,
                    Arc::clone(&self.status),
                    trigger,
                    self.name.clone(),
                ));
            }
            Err(e) => {
                let now = Utc::now();
                {
                    let mut status = self.status.write();
                    status.start_ts = Some(now);
                    status.stop_ts = Some(now);
                    status.error = Some(ProcessError::spawn_failed(&self.name, e.to_string()));
                }
                warn!(command = %self.name, error = %e, "Failed to spawn process");
                // Dropping the senders closes both streaming channels.
                drop((stdout_tx, stderr_tx));
                trigger.close();
            }
        }

        done
    }

    /// Ask the monitor to kill the command.
    ///
    /// Returns once the request is delivered; wait on the completion signal
    /// for the actual exit. A stopped command ends with `complete == false`.
    /// Stopping a finished command is a no-op.
    pub fn stop(&self) -> ProcessResult<()> {
        let mut control = self.control.lock();
        if control.done.is_none() {
            return Err(ProcessError::operation_not_allowed(
                &self.name,
                "stop",
                "not started",
            ));
        }

        if let Some(stop_tx) = control.stop_tx.take() {
            if stop_tx.send(()).is_err() {
                debug!(command = %self.name, "Stop requested after process exit");
            } else {
                info!(command = %self.name, "Stop requested");
            }
        }
        Ok(())
    }

    /// Whether the spawned process still exists at the OS level.
    pub fn is_alive(&self) -> bool {
        let (pid, finished) = {
            let status = self.status.read();
            (status.pid, status.is_finished())
        };
        if pid == 0 || finished {
            return false;
        }
        process_exists(pid).unwrap_or(false)
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.name);
        cmd.args(&self.args);

        if let Some(ref wd) = self.options.working_directory {
            cmd.current_dir(wd);
        }

        for (key, value) in &self.options.environment {
            cmd.env(key, value);
        }

        let capture = self.options.captures_output();
        cmd.stdin(Stdio::null())
            .stdout(output_stdio(capture))
            .stderr(output_stdio(capture));

        cmd
    }

    fn spawn_reader(
        &self,
        stream: impl AsyncRead + Unpin + Send + 'static,
        stream_type: StreamType,
        tx: Option<mpsc::Sender<String>>,
    ) -> JoinHandle<()> {
        tokio::spawn(read_lines(
            stream,
            stream_type,
            self.options.buffered,
            tx,
            Arc::clone(&self.status),
            self.name.clone(),
        ))
    }
}

fn output_stdio(capture: bool) -> Stdio {
    if capture {
        Stdio::piped()
    } else {
        Stdio::null()
    }
}

/// Read one stream line by line until end-of-file.
async fn read_lines(
    stream: impl AsyncRead + Unpin,
    stream_type: StreamType,
    buffered: bool,
    mut tx: Option<mpsc::Sender<String>>,
    status: Arc<RwLock<Status>>,
    name: String,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut line_num = 0u64;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                line_num += 1;
                let line = decode_line(&buf);

                if buffered {
                    status.write().lines_mut(stream_type).push(line.clone());
                }

                if let Some(sender) = &tx {
                    if sender.send(line).await.is_err() {
                        // Receiver gone: keep draining the pipe so the child never blocks.
                        warn!(
                            command = %name,
                            stream = %stream_type,
                            "Stream receiver dropped, discarding further lines"
                        );
                        tx = None;
                    }
                }
            }
            Err(e) => {
                error!(
                    command = %name,
                    stream = %stream_type,
                    error = %e,
                    "Error reading from stream"
                );
                break;
            }
        }
    }

    debug!(command = %name, stream = %stream_type, lines = line_num, "Stream reader finished");
}

/// Strip one trailing `\n` or `\r\n`; invalid UTF-8 is replaced.
fn decode_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && buf[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Reap the child, wait for both readers, record the outcome, then close the
/// completion signal.
async fn monitor_exit(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    mut stop_rx: oneshot::Receiver<()>,
    status: Arc<RwLock<Status>>,
    trigger: CompletionTrigger,
    name: String,
) {
    let mut stopped = false;

    let wait_result = tokio::select! {
        result = child.wait() => result,
        Ok(()) = &mut stop_rx => {
            stopped = true;
            if let Err(e) = child.start_kill() {
                warn!(command = %name, error = %e, "Failed to kill process");
            }
            child.wait().await
        }
    };

    for reader in readers {
        if let Err(e) = reader.await {
            warn!(command = %name, error = %e, "Stream reader task failed");
        }
    }

    {
        let mut status = status.write();
        status.stop_ts = Some(Utc::now());
        match wait_result {
            Ok(exit_status) => match exit_status.code() {
                Some(code) => {
                    status.exit = code;
                    status.complete = !stopped;
                    if code == 0 {
                        info!(command = %name, exit_code = code, "Process exited");
                    } else {
                        warn!(command = %name, exit_code = code, "Process exited with non-zero status");
                    }
                }
                None => {
                    let signal = describe_signal(&exit_status);
                    warn!(command = %name, signal = %signal, stopped, "Process terminated by signal");
                    status.exit = EXIT_UNKNOWN;
                    status.error = Some(ProcessError::signaled(&name, signal));
                }
            },
            Err(e) => {
                error!(command = %name, error = %e, "Failed to wait for process");
                status.error = Some(ProcessError::wait_failed(&name, e.to_string()));
            }
        }
    }

    trigger.close();
}

#[cfg(unix)]
fn describe_signal(exit_status: &ExitStatus) -> String {
    use nix::sys::signal::Signal;
    use std::os::unix::process::ExitStatusExt;

    match exit_status.signal() {
        Some(raw) => Signal::try_from(raw)
            .map(|signal| signal.as_str().to_string())
            .unwrap_or_else(|_| format!("signal {}", raw)),
        None => exit_status.to_string(),
    }
}

#[cfg(not(unix))]
fn describe_signal(exit_status: &ExitStatus) -> String {
    exit_status.to_string()
}
