use std::{io, process::ExitStatus};

use thiserror::Error;

/// Top-level application errors.
#[derive(Debug, Error)]
pub enum JournalError {
    /// gocryptfs rejected the passphrase.
    #[error("incorrect password")]
    AuthenticationFailure,
    /// gocryptfs refused a mount point that already has contents.
    #[error("mount point is not empty")]
    DestinationNotEmpty,
    /// gocryptfs exited before the grace window elapsed for another reason.
    #[error("mount process exited early: {status}")]
    MountFailed {
        /// Exit status reported by the mount process.
        status: ExitStatus,
    },
    /// A mount session is already live.
    #[error("journal is already mounted")]
    AlreadyMounted,
    /// Operation needs the plaintext view but the volume is locked.
    #[error("journal is not mounted")]
    NotMounted,
    /// Installed gocryptfs is older than the supported floor.
    #[error("gocryptfs version {required} is required, found {found}")]
    UnsupportedVersion {
        /// Minimum supported version.
        required: String,
        /// Version reported by the binary.
        found: String,
    },
    /// Search, editor, or version subprocess failed or produced unusable output.
    #[error("{tool} failed: {message}")]
    ExternalTool {
        /// Tool name.
        tool: String,
        /// Failure detail.
        message: String,
    },
    /// The editor cannot be launched in the current environment.
    #[error("cannot open editor: {0}")]
    EditorUnavailable(String),
    /// Input was syntactically valid but semantically unsupported.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Date literal or components do not name a calendar day.
    #[error("{0}")]
    InvalidDate(String),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A typed result used across the crate.
pub type Result<T> = std::result::Result<T, JournalError>;

/// Generic invalid-input error.
pub const ERROR_CODE_INVALID_INPUT: &str = "E100";
/// Date validation error.
pub const ERROR_CODE_INVALID_DATE: &str = "E101";
/// Missing runtime dependency or binary.
pub const ERROR_CODE_MISSING_RUNTIME: &str = "E103";
/// Wrong passphrase.
pub const ERROR_CODE_AUTHENTICATION: &str = "E200";
/// Mount point has contents.
pub const ERROR_CODE_DESTINATION_NOT_EMPTY: &str = "E201";
/// Mount process exited early.
pub const ERROR_CODE_MOUNT_FAILED: &str = "E202";
/// Volume already mounted.
pub const ERROR_CODE_ALREADY_MOUNTED: &str = "E203";
/// Volume not mounted.
pub const ERROR_CODE_NOT_MOUNTED: &str = "E204";
/// gocryptfs is too old.
pub const ERROR_CODE_UNSUPPORTED_VERSION: &str = "E300";
/// External subprocess failed.
pub const ERROR_CODE_EXTERNAL_TOOL: &str = "E301";
/// Editor cannot be launched.
pub const ERROR_CODE_EDITOR: &str = "E302";
/// Filesystem or stream I/O failed.
pub const ERROR_CODE_IO: &str = "E900";

const ERROR_EXPLANATION_E100: &str = r#"E100 invalid input

The arguments or configuration are syntactically valid but semantically unsupported.

Common fixes:
  - Run `journal --help` for exact argument usage.
  - Duration values use a unit suffix (examples: `30s`, `5m`, `1h`).
  - Check `.journal.toml` against the documented sections."#;
const ERROR_EXPLANATION_E101: &str = r#"E101 invalid date

Dates are written as <year>/<month>/<day> and must name a real calendar day.

Examples:
  - Valid: `2024/03/07`, `2024-3-7`
  - Invalid: `2023/02/29`, `07/03/2024`"#;
const ERROR_EXPLANATION_E103: &str = r#"E103 missing runtime dependency

A required binary was not found in PATH.

Recovery:
  - Install the missing binary (`gocryptfs`, `rg`, or `tmux`).
  - Or point `[volume] gocryptfs`, `[search] rg`, `[editor] tmux` at it in `.journal.toml`.
  - Run `journal check` to verify."#;
const ERROR_EXPLANATION_E200: &str = r#"E200 incorrect password

gocryptfs rejected the passphrase for the cipher directory.

Recovery:
  - Retype the passphrase; the prompt does not retry on its own."#;
const ERROR_EXPLANATION_E201: &str = r#"E201 mount point is not empty

gocryptfs refuses to mount over a directory that already has files.

Recovery:
  - Choose another mount directory with `-m <dir>`.
  - Or empty the directory; check that no stale mount is left with `mountpoint <dir>`."#;
const ERROR_EXPLANATION_E202: &str = r#"E202 mount failed

gocryptfs exited before the mount was confirmed.

Recovery:
  - Run gocryptfs by hand with the same cipher and mount directory to read its diagnostics.
  - Check the journal log file for the exit status."#;
const ERROR_EXPLANATION_E203: &str = r#"E203 already mounted

The journal is already unlocked in this process."#;
const ERROR_EXPLANATION_E204: &str = r#"E204 not mounted

The operation needs the decrypted view, but the journal is locked.

Recovery:
  - Unlock the journal with its passphrase first."#;
const ERROR_EXPLANATION_E300: &str = r#"E300 unsupported gocryptfs version

The installed gocryptfs is older than the supported minimum.

Recovery:
  - Upgrade gocryptfs and check with `gocryptfs -version`."#;
const ERROR_EXPLANATION_E301: &str = r#"E301 external tool failure

A helper subprocess (rg, tmux, gocryptfs -version) failed or produced unexpected output.

Recovery:
  - Read the log panel or the journal log file for stderr details."#;
const ERROR_EXPLANATION_E302: &str = r#"E302 editor unavailable

Entries are edited in a tmux window running $EDITOR.

Recovery:
  - Export EDITOR (example: `export EDITOR=nvim`) or set `[editor] command`.
  - Start the journal from inside a tmux session."#;
const ERROR_EXPLANATION_E900: &str = r#"E900 I/O failure

Filesystem or stream operations failed.

Recovery:
  - Verify the mount directory is writable and the volume is still mounted.
  - Check file permissions and available disk space."#;

const KNOWN_ERROR_CODES: [&str; 12] = [
    ERROR_CODE_INVALID_INPUT,
    ERROR_CODE_INVALID_DATE,
    ERROR_CODE_MISSING_RUNTIME,
    ERROR_CODE_AUTHENTICATION,
    ERROR_CODE_DESTINATION_NOT_EMPTY,
    ERROR_CODE_MOUNT_FAILED,
    ERROR_CODE_ALREADY_MOUNTED,
    ERROR_CODE_NOT_MOUNTED,
    ERROR_CODE_UNSUPPORTED_VERSION,
    ERROR_CODE_EXTERNAL_TOOL,
    ERROR_CODE_EDITOR,
    ERROR_CODE_IO,
];

/// Returns the stable error code for a runtime error.
pub fn classify_error_code(error: &JournalError) -> &'static str {
    match error {
        JournalError::AuthenticationFailure => ERROR_CODE_AUTHENTICATION,
        JournalError::DestinationNotEmpty => ERROR_CODE_DESTINATION_NOT_EMPTY,
        JournalError::MountFailed { .. } => ERROR_CODE_MOUNT_FAILED,
        JournalError::AlreadyMounted => ERROR_CODE_ALREADY_MOUNTED,
        JournalError::NotMounted => ERROR_CODE_NOT_MOUNTED,
        JournalError::UnsupportedVersion { .. } => ERROR_CODE_UNSUPPORTED_VERSION,
        JournalError::ExternalTool { message, .. } if is_missing_runtime(message) => {
            ERROR_CODE_MISSING_RUNTIME
        }
        JournalError::ExternalTool { .. } => ERROR_CODE_EXTERNAL_TOOL,
        JournalError::EditorUnavailable(_) => ERROR_CODE_EDITOR,
        JournalError::InvalidInput(message) if is_missing_runtime(message) => {
            ERROR_CODE_MISSING_RUNTIME
        }
        JournalError::InvalidInput(_) => ERROR_CODE_INVALID_INPUT,
        JournalError::InvalidDate(_) => ERROR_CODE_INVALID_DATE,
        JournalError::Io(_) => ERROR_CODE_IO,
    }
}

fn is_missing_runtime(message: &str) -> bool {
    message
        .to_ascii_lowercase()
        .contains("required binary not found")
}

/// Normalizes a user-provided error code for lookups.
pub fn normalize_error_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Returns an explanation block for a known error code.
pub fn explain_error_code(raw: &str) -> Option<&'static str> {
    let normalized = normalize_error_code(raw);
    match normalized.as_str() {
        ERROR_CODE_INVALID_INPUT => Some(ERROR_EXPLANATION_E100),
        ERROR_CODE_INVALID_DATE => Some(ERROR_EXPLANATION_E101),
        ERROR_CODE_MISSING_RUNTIME => Some(ERROR_EXPLANATION_E103),
        ERROR_CODE_AUTHENTICATION => Some(ERROR_EXPLANATION_E200),
        ERROR_CODE_DESTINATION_NOT_EMPTY => Some(ERROR_EXPLANATION_E201),
        ERROR_CODE_MOUNT_FAILED => Some(ERROR_EXPLANATION_E202),
        ERROR_CODE_ALREADY_MOUNTED => Some(ERROR_EXPLANATION_E203),
        ERROR_CODE_NOT_MOUNTED => Some(ERROR_EXPLANATION_E204),
        ERROR_CODE_UNSUPPORTED_VERSION => Some(ERROR_EXPLANATION_E300),
        ERROR_CODE_EXTERNAL_TOOL => Some(ERROR_EXPLANATION_E301),
        ERROR_CODE_EDITOR => Some(ERROR_EXPLANATION_E302),
        ERROR_CODE_IO => Some(ERROR_EXPLANATION_E900),
        _ => None,
    }
}

/// Stable list of explainable error codes.
pub fn known_error_codes() -> &'static [&'static str] {
    &KNOWN_ERROR_CODES
}
