//! Ready-made hooks.

use crate::hook::Hook;
use futures::future::BoxFuture;
use hsu_process::StreamType;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Print stdout lines to stdout and stderr lines to stderr, framed by a
/// start banner and the exit code.
pub async fn print_lines(mut hook: Hook) {
    println!("Starting command: {} {}", hook.name(), hook.args().join(" "));

    while let Some(line) = hook.next_line().await {
        match line.stream {
            StreamType::Stdout => println!("{}", line.text),
            StreamType::Stderr => eprintln!("{}", line.text),
        }
    }

    hook.wait_process().await;
    println!("Exit: {}", hook.status().exit);
}

/// Forward every line as a tracing event: stdout at `info`, stderr at `warn`.
pub async fn trace_lines(mut hook: Hook) {
    let command = hook.name().to_string();
    let mut line_num = 0u64;

    while let Some(line) = hook.next_line().await {
        line_num += 1;
        match line.stream {
            StreamType::Stdout => {
                info!(command = %command, stream = %line.stream, line_num, "{}", line.text)
            }
            StreamType::Stderr => {
                warn!(command = %command, stream = %line.stream, line_num, "{}", line.text)
            }
        }
    }
}

/// Caller-owned accumulators filled by a hook.
///
/// ```rust,no_run
/// use hsu_command::{hooks::LineCollector, Cmd, Options};
///
/// # async fn run() -> hsu_common::ProcessResult<()> {
/// let collector = LineCollector::new();
/// let mut cmd = Cmd::new(Options { buffered: false, streaming: true }, "ls", ["/"]);
/// cmd.add_hook(collector.hook())?;
/// cmd.start()?;
/// cmd.wait().await?;
/// println!("{} lines", collector.stdout().len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct LineCollector {
    stdout: Arc<Mutex<Vec<String>>>,
    stderr: Arc<Mutex<Vec<String>>>,
}

impl LineCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook function draining both streams into this collector.
    pub fn hook(&self) -> impl FnOnce(Hook) -> BoxFuture<'static, ()> + Send + 'static {
        let collector = self.clone();
        move |hook| Box::pin(collector.collect(hook))
    }

    /// Drain both streams of `hook` into this collector.
    pub async fn collect(self, mut hook: Hook) {
        while let Some(line) = hook.next_line().await {
            let target = match line.stream {
                StreamType::Stdout => &self.stdout,
                StreamType::Stderr => &self.stderr,
            };
            target.lock().push(line.text);
        }
        hook.close();
    }

    /// Stdout lines collected so far.
    pub fn stdout(&self) -> Vec<String> {
        self.stdout.lock().clone()
    }

    /// Stderr lines collected so far.
    pub fn stderr(&self) -> Vec<String> {
        self.stderr.lock().clone()
    }
}
