//! Command validation.
//!
//! The runner itself never validates: a bad command surfaces as a launch
//! error at spawn time. These checks are for configuration loading, where
//! failing early gives a better message.

use hsu_common::{ProcessError, ProcessResult};
use std::path::Path;

/// Validate a command name: non-empty, no NUL bytes.
pub fn validate_command(name: &str) -> ProcessResult<()> {
    if name.trim().is_empty() {
        return Err(ProcessError::configuration(
            "validation",
            "Command cannot be empty",
        ));
    }

    if name.contains('\0') {
        return Err(ProcessError::configuration(
            name.replace('\0', "\\0"),
            "Command cannot contain NUL bytes",
        ));
    }

    Ok(())
}

/// Validate that a working directory exists and is a directory.
pub fn validate_working_directory(path: &Path) -> ProcessResult<()> {
    if !path.is_dir() {
        return Err(ProcessError::configuration(
            path.display().to_string(),
            "Working directory does not exist or is not a directory",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_command() {
        assert!(validate_command("ls").is_ok());
        assert!(validate_command("/usr/bin/env").is_ok());
        assert!(validate_command("").is_err());
        assert!(validate_command("   ").is_err());
        assert!(validate_command("l\0s").is_err());
    }

    #[test]
    fn test_validate_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_working_directory(dir.path()).is_ok());

        let file = dir.path().join("plain-file");
        std::fs::write(&file, "x").unwrap();
        assert!(validate_working_directory(&file).is_err());
        assert!(validate_working_directory(&dir.path().join("missing")).is_err());
    }
}
