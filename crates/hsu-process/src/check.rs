//! Process existence checks.

use hsu_common::{ProcessError, ProcessResult};

/// Check whether a process with the given PID exists.
///
/// Sends no signal: `kill(pid, 0)` on Unix, `OpenProcess` on Windows. A
/// process that exists but belongs to another user counts as existing.
///
/// ```rust,no_run
/// use hsu_process::process_exists;
///
/// if process_exists(1234).unwrap() {
///     println!("1234 is running");
/// }
/// ```
pub fn process_exists(pid: u32) -> ProcessResult<bool> {
    #[cfg(unix)]
    {
        process_exists_unix(pid)
    }

    #[cfg(windows)]
    {
        process_exists_windows(pid)
    }
}

#[cfg(unix)]
fn process_exists_unix(pid: u32) -> ProcessResult<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(Errno::EPERM) => Ok(true),
        Err(e) => Err(ProcessError::wait_failed(
            pid.to_string(),
            format!("Failed to check process: {}", e),
        )),
    }
}

#[cfg(windows)]
fn process_exists_windows(pid: u32) -> ProcessResult<bool> {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    const ERROR_INVALID_PARAMETER: u32 = 0x80070057;
    const ERROR_ACCESS_DENIED: u32 = 0x80070005;

    // SAFETY: the handle is only used for CloseHandle right below.
    unsafe {
        match OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) {
            Ok(handle) => {
                let _ = CloseHandle(handle);
                Ok(true)
            }
            Err(e) => {
                let code = e.code().0 as u32;
                if code == ERROR_INVALID_PARAMETER || code == ERROR_ACCESS_DENIED {
                    Ok(false)
                } else {
                    Err(ProcessError::wait_failed(
                        pid.to_string(),
                        format!("Failed to check process: {}", e),
                    ))
                }
            }
        }
    }
}
