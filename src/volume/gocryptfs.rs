use std::{
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
    time::Duration,
};

use semver::Version;

use crate::{
    error::{JournalError, Result},
    process::{failure_detail, map_command_execution_error, retry_exec_busy},
};

/// Oldest gocryptfs release whose `-fg` and `-idle` behavior is supported.
pub const MIN_GOCRYPTFS_VERSION: &str = "2.6.1";

const VERSION_PREFIX: &str = "gocryptfs v";
const EXIT_CODE_MOUNT_NOT_EMPTY: i32 = 10;
const EXIT_CODE_PASSWORD_INCORRECT: i32 = 12;
const EXIT_CODE_TERMINATED: i32 = 15;
const SIGTERM_NUMBER: i32 = 15;

/// Arguments for one foreground gocryptfs mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    /// Ciphertext directory.
    pub cipher_dir: PathBuf,
    /// Plaintext mountpoint.
    pub mount_point: PathBuf,
    /// gocryptfs unmounts by itself after this much inactivity.
    pub idle: Duration,
}

/// Thin wrapper around the gocryptfs binary.
#[derive(Debug, Clone)]
pub struct GocryptfsDriver {
    binary: String,
}

impl GocryptfsDriver {
    /// Uses `gocryptfs` from `PATH`.
    pub fn new() -> Self {
        Self::with_binary("gocryptfs")
    }

    /// Uses a specific gocryptfs binary.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Binary this driver runs.
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Starts `gocryptfs -fg -q -idle <idle> <cipher> <mount>` with a piped stdin.
    pub(crate) fn spawn(&self, request: &MountRequest) -> Result<Child> {
        let mut command = Command::new(&self.binary);
        command
            .args(["-fg", "-q", "-idle"])
            .arg(format!("{}s", request.idle.as_secs()))
            .arg(&request.cipher_dir)
            .arg(&request.mount_point)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        retry_exec_busy(|| command.spawn())
            .map_err(|error| map_command_execution_error(&self.binary, error))
    }

    /// Runs `gocryptfs -version` and parses the reported release.
    pub fn version(&self) -> Result<Version> {
        let output = retry_exec_busy(|| Command::new(&self.binary).arg("-version").output())
            .map_err(|error| map_command_execution_error(&self.binary, error))?;
        if !output.status.success() {
            return Err(JournalError::ExternalTool {
                tool: self.binary.clone(),
                message: failure_detail(&output),
            });
        }
        parse_version_output(&String::from_utf8_lossy(&output.stdout))
    }

    /// Fails with [`JournalError::UnsupportedVersion`] below [`MIN_GOCRYPTFS_VERSION`].
    pub fn check_version(&self) -> Result<Version> {
        let found = self.version()?;
        ensure_min_version(&found)?;
        Ok(found)
    }
}

impl Default for GocryptfsDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps an early gocryptfs exit to its error.
///
/// Exit codes are gocryptfs' contract: 12 for a wrong password, 10 for a
/// non-empty mountpoint.
pub fn classify_exit(status: ExitStatus) -> JournalError {
    match status.code() {
        Some(EXIT_CODE_PASSWORD_INCORRECT) => JournalError::AuthenticationFailure,
        Some(EXIT_CODE_MOUNT_NOT_EMPTY) => JournalError::DestinationNotEmpty,
        _ => JournalError::MountFailed { status },
    }
}

/// True when `status` is what a SIGTERM-initiated shutdown looks like.
pub fn is_expected_termination(status: &ExitStatus) -> bool {
    if status.success() || status.code() == Some(EXIT_CODE_TERMINATED) {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal() == Some(SIGTERM_NUMBER)
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Parses `gocryptfs v2.6.1; go-fuse v2.5.0; 2024-...` into a version.
pub fn parse_version_output(output: &str) -> Result<Version> {
    let first = output.split(';').next().unwrap_or_default().trim();
    let literal = first.strip_prefix(VERSION_PREFIX).ok_or_else(|| {
        JournalError::ExternalTool {
            tool: "gocryptfs".to_owned(),
            message: format!("invalid gocryptfs version: {first}"),
        }
    })?;
    parse_lenient(literal).ok_or_else(|| JournalError::ExternalTool {
        tool: "gocryptfs".to_owned(),
        message: format!("unparsable gocryptfs version: {literal}"),
    })
}

/// Fails when `found` is older than [`MIN_GOCRYPTFS_VERSION`].
pub fn ensure_min_version(found: &Version) -> Result<()> {
    let required = Version::new(2, 6, 1);
    if found < &required {
        return Err(JournalError::UnsupportedVersion {
            required: MIN_GOCRYPTFS_VERSION.to_owned(),
            found: format!("v{found}"),
        });
    }
    Ok(())
}

// Pads `2.6` to `2.6.0`; gocryptfs has shipped two-component tags.
fn parse_lenient(literal: &str) -> Option<Version> {
    if let Ok(version) = Version::parse(literal) {
        return Some(version);
    }
    let (core, rest) = match literal.find(['-', '+']) {
        Some(index) => literal.split_at(index),
        None => (literal, ""),
    };
    let padded = match core.split('.').count() {
        1 => format!("{core}.0.0{rest}"),
        2 => format!("{core}.0{rest}"),
        _ => return None,
    };
    Version::parse(&padded).ok()
}
