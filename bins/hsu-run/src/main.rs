use anyhow::{bail, Result};
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

use hsu_command::config::parse_duration;
use hsu_command::{hooks, CancellationToken, Cmd, CmdConfig, Options, ProcessError};

/// HSU Run - run a command and stream its output
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE", conflicts_with = "command")]
    config: Option<String>,

    /// Keep output in memory and print a line count at the end
    #[arg(long)]
    buffered: bool,

    /// Do not stream output to the terminal
    #[arg(long)]
    no_stream: bool,

    /// Give up waiting after this long (e.g. 500ms, 30s, 2m)
    #[arg(long, value_parser = parse_timeout)]
    timeout: Option<Duration>,

    /// Start the command, make sure it is running, and exit
    #[arg(long)]
    detach: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Command and arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn parse_timeout(s: &str) -> std::result::Result<Duration, String> {
    parse_duration(s)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    initialize_logging(args.debug)?;

    let config = load_config(&args)?;
    info!(command = %config.command, args = ?config.args, "Running command");

    let mut cmd = Cmd::from_config(&config);

    if args.detach {
        cmd.start()?;
        cmd.wait_started().await?;
        info!(command = %cmd.name(), pid = cmd.status().pid, "Command started in background");
        return Ok(ExitCode::SUCCESS);
    }

    if config.options.streaming {
        cmd.add_hook(hooks::print_lines)?;
    }

    if let Err(e) = cmd.start() {
        error!("Failed to start command: {}", e);
        return Ok(ExitCode::from(127));
    }

    // Set up signal handlers for graceful shutdown
    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    let result = match config.wait_timeout {
        Some(timeout) => tokio::select! {
            result = cmd.wait_timeout(timeout) => result,
            _ = token.cancelled() => Err(ProcessError::cancelled(cmd.name(), "wait")),
        },
        None => cmd.wait_with_cancel(&token).await,
    };

    match result {
        Ok(code) => {
            if config.options.buffered {
                let status = cmd.status();
                info!(
                    stdout_lines = status.stdout.len(),
                    stderr_lines = status.stderr.len(),
                    runtime_ms = status.runtime().num_milliseconds(),
                    "Buffered output captured"
                );
            }
            info!(exit_code = code, "Command finished");
            Ok(ExitCode::from(exit_status(code)))
        }
        Err(e) if e.is_wait_abandoned() => {
            warn!("{}, stopping command", e);
            cmd.stop()?;
            if let Err(e) = cmd.wait_timeout(Duration::from_secs(5)).await {
                warn!("Command did not finish after stop: {}", e);
            }
            Ok(ExitCode::from(if matches!(e, ProcessError::Timeout { .. }) { 124 } else { 130 }))
        }
        Err(e) => {
            error!("Command failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn load_config(args: &Args) -> Result<CmdConfig> {
    let mut config = match (&args.config, args.command.split_first()) {
        (Some(path), _) => CmdConfig::load_from_file(path)?,
        (None, Some((command, rest))) => {
            let mut config = CmdConfig::new(command.clone(), rest.iter().cloned());
            config.options = Options {
                buffered: false,
                streaming: true,
            };
            config
        }
        (None, None) => bail!("Either --config or a command is required"),
    };

    // Command line flags override the configuration file
    if args.buffered {
        config.options.buffered = true;
    }
    if args.no_stream {
        config.options.streaming = false;
    }
    if args.timeout.is_some() {
        config.wait_timeout = args.timeout;
    }
    if args.detach {
        // The parent exits right away, nothing may hold the child's pipes.
        config.options = Options::default();
    }

    config.validate()?;
    Ok(config)
}

fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

fn initialize_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

async fn cancel_on_signal(token: CancellationToken) {
    use tokio::signal;

    #[cfg(unix)]
    {
        let (mut sigterm, mut sigint) = match (
            signal::unix::signal(signal::unix::SignalKind::terminate()),
            signal::unix::signal(signal::unix::SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }

    token.cancel();
}
