//! YAML run configuration.
//!
//! ```yaml
//! command: ls
//! args: ["-l", "/"]
//! working_directory: /tmp
//! environment:
//!   LC_ALL: C
//! options:
//!   buffered: false
//!   streaming: true
//! stream_channel_size: 1000
//! wait_timeout: 30s
//! ```

use crate::options::Options;
use anyhow::{Context, Result};
use hsu_process::{RunnerOptions, DEFAULT_STREAM_CHANNEL_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod validation;

/// One command to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmdConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    /// Added to the inherited environment.
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub options: Options,
    #[serde(default = "default_stream_channel_size")]
    pub stream_channel_size: usize,
    /// Upper bound for waiting on the command; unbounded when absent.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub wait_timeout: Option<Duration>,
}

impl CmdConfig {
    /// Configuration for `command args...` with everything else defaulted.
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_directory: None,
            environment: HashMap::new(),
            options: Options::default(),
            stream_channel_size: default_stream_channel_size(),
            wait_timeout: None,
        }
    }

    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: CmdConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Runner options equivalent to this configuration.
    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            buffered: self.options.buffered,
            streaming: self.options.streaming,
            stream_channel_size: self.stream_channel_size,
            working_directory: self.working_directory.clone(),
            environment: self.environment.clone(),
        }
    }
}

fn default_stream_channel_size() -> usize {
    DEFAULT_STREAM_CHANNEL_SIZE
}

/// Durations as strings with a `ms`, `s` or `m` suffix.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let invalid = || format!("Invalid duration: {}", s);

        // "ms" before "s", it ends with 's' too
        if let Some(num) = s.strip_suffix("ms") {
            num.parse().map(Duration::from_millis).map_err(|_| invalid())
        } else if let Some(num) = s.strip_suffix('s') {
            num.parse().map(Duration::from_secs).map_err(|_| invalid())
        } else if let Some(num) = s.strip_suffix('m') {
            num.parse::<u64>()
                .map(|mins| Duration::from_secs(mins * 60))
                .map_err(|_| invalid())
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}

pub(crate) mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => super::duration_serde::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        opt.map(|s| super::duration_serde::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

pub use duration_serde::parse_duration;
