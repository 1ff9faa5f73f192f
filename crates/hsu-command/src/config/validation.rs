use super::*;
use anyhow::{anyhow, Result};
use hsu_process::{validate_command, validate_working_directory};

/// Validate the complete configuration
pub fn validate_config(config: &CmdConfig) -> Result<()> {
    validate_command(&config.command)?;

    if let Some(ref wd) = config.working_directory {
        validate_working_directory(wd)?;
    }

    for key in config.environment.keys() {
        validate_environment_key(key)?;
    }

    if config.stream_channel_size == 0 {
        return Err(anyhow!("Stream channel size must be greater than 0"));
    }

    if let Some(timeout) = config.wait_timeout {
        if timeout.is_zero() {
            return Err(anyhow!("Wait timeout must be greater than 0"));
        }
    }

    Ok(())
}

fn validate_environment_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(anyhow!("Environment variable name cannot be empty"));
    }

    if key.contains('=') || key.contains('\0') {
        return Err(anyhow!("Invalid environment variable name: {}", key));
    }

    Ok(())
}
