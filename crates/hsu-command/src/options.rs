//! Output capture options.

use hsu_process::RunnerOptions;
use serde::{Deserialize, Serialize};

/// How a command's output is captured.
///
/// Both flags may be combined. With both off the output is discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Keep every line in memory, readable through `Cmd::status`.
    #[serde(default)]
    pub buffered: bool,
    /// Send every line on the stdout/stderr channels handed to the hook.
    #[serde(default)]
    pub streaming: bool,
}

impl From<Options> for RunnerOptions {
    fn from(options: Options) -> Self {
        RunnerOptions {
            buffered: options.buffered,
            streaming: options.streaming,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_discards_output() {
        let options = Options::default();
        assert!(!options.buffered);
        assert!(!options.streaming);
        assert!(!RunnerOptions::from(options).captures_output());
    }

    #[test]
    fn test_into_runner_options() {
        let runner: RunnerOptions = Options {
            buffered: true,
            streaming: false,
        }
        .into();
        assert!(runner.buffered);
        assert!(!runner.streaming);
        assert_eq!(runner.stream_channel_size, hsu_process::DEFAULT_STREAM_CHANNEL_SIZE);
    }

    #[test]
    fn test_missing_flags_default_to_false() {
        let options: Options = serde_yaml::from_str("streaming: true").unwrap();
        assert_eq!(
            options,
            Options {
                buffered: false,
                streaming: true
            }
        );
    }
}
