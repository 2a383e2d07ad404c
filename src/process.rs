use std::{io, process::Output, thread, time::Duration};

use crate::error::JournalError;

const EXEC_BUSY_RETRY_ATTEMPTS: usize = 20;
const EXEC_BUSY_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Maps a spawn failure, reporting a missing binary by name.
pub(crate) fn map_command_execution_error(binary: &str, error: io::Error) -> JournalError {
    if error.kind() == io::ErrorKind::NotFound {
        return JournalError::ExternalTool {
            tool: binary.to_owned(),
            message: format!("required binary not found: {binary}"),
        };
    }
    JournalError::Io(error)
}

/// Retries `operation` while the kernel reports `ETXTBSY` for a freshly written binary.
pub(crate) fn retry_exec_busy<T, F>(mut operation: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let mut last_error = None;
    for attempt in 0..EXEC_BUSY_RETRY_ATTEMPTS {
        match operation() {
            Ok(value) => return Ok(value),
            Err(error) if is_exec_busy_error(&error) && attempt + 1 < EXEC_BUSY_RETRY_ATTEMPTS => {
                last_error = Some(error);
                thread::sleep(EXEC_BUSY_RETRY_DELAY);
            }
            Err(error) => return Err(error),
        }
    }

    Err(last_error.unwrap_or_else(|| io::Error::other("command execution failed")))
}

fn is_exec_busy_error(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::ExecutableFileBusy || error.raw_os_error() == Some(26)
}

/// Trimmed stderr, or the exit status when stderr is empty.
pub(crate) fn failure_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    if stderr.is_empty() {
        output.status.to_string()
    } else {
        stderr
    }
}
