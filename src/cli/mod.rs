mod tui;

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::Command as ProcessCommand,
};

use clap::{Parser, Subcommand};

use crate::{
    config::{
        absolutize_path, parse_duration_literal, resolve_config_path, JournalConfig,
        CIPHER_DIR_ENV_VAR, CONFIG_ENV_VAR,
    },
    error::{explain_error_code, known_error_codes, normalize_error_code, JournalError, Result},
    paths::JournalPaths,
    types::EntryDate,
    volume::{GocryptfsDriver, MIN_GOCRYPTFS_VERSION},
};

const ERROR_CODE_ARG_HELP: &str = "Error code from stderr (example: `E200`).";
const CLI_AFTER_HELP: &str = r#"Examples:
  journal ~/Documents/journal.enc
  JOURNAL_ENC_DIR=~/Documents/journal.enc journal -m /tmp/journal --idle 15m
  journal check
  journal path 2024/03/07
  journal explain E200

Notes:
  Entries are edited in a tmux window running $EDITOR.
  Error codes are shown in stderr output, for example `error[E200]: ...`.
"#;
const CHECK_COMMAND_AFTER_HELP: &str = r#"Examples:
  journal check
  journal --config ./.journal.toml check
"#;
const EXPLAIN_COMMAND_AFTER_HELP: &str = r#"Examples:
  journal explain E200
  journal explain e201
"#;
const PATH_COMMAND_AFTER_HELP: &str = r#"Examples:
  journal path 2024/03/07
  journal -m /tmp/journal path 2024-3-7
"#;

/// Top-level command line parser.
#[derive(Debug, Parser)]
#[command(
    name = "journal",
    version,
    about = "Encrypted day-by-day journal backed by gocryptfs.",
    after_help = CLI_AFTER_HELP,
    next_line_help = true
)]
pub struct Cli {
    /// Config file override path.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Disable config loading and discovery.
    #[arg(long)]
    pub no_config: bool,
    /// Directory where the journal is mounted. Default: `/tmp/journal`.
    #[arg(short = 'm', long = "mount")]
    pub mount: Option<PathBuf>,
    /// Unmount after this much inactivity. Examples: 30s, 5m, 1h. Default: `30m`.
    #[arg(long)]
    pub idle: Option<String>,
    /// Encrypted journal directory.
    #[arg(env = CIPHER_DIR_ENV_VAR)]
    pub cipher_dir: Option<PathBuf>,
    /// Subcommand; the interactive journal opens when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Non-interactive commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Verifies gocryptfs, rg and tmux are usable.
    #[command(after_help = CHECK_COMMAND_AFTER_HELP)]
    Check,
    /// Explains a stable error code with recovery guidance.
    #[command(after_help = EXPLAIN_COMMAND_AFTER_HELP)]
    Explain {
        /// Error code.
        #[arg(help = ERROR_CODE_ARG_HELP)]
        code: String,
    },
    /// Prints where the entry for a date lives under the mount directory.
    #[command(after_help = PATH_COMMAND_AFTER_HELP)]
    Path {
        /// Date as YYYY/MM/DD.
        date: String,
    },
}

/// Runs CLI and returns process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    if let Some(Command::Explain { code }) = &cli.command {
        return run_explain(code);
    }

    let config = load_effective_config(&cli)?;
    match cli.command {
        None => tui::run_journal_ui(&config),
        Some(Command::Check) => run_check(&config),
        Some(Command::Path { date }) => {
            let date = date.parse::<EntryDate>()?;
            let path = JournalPaths::new(&config.mount_dir).entry_path(date);
            print_line(&path.display().to_string())
        }
        Some(Command::Explain { .. }) => Ok(0),
    }
}

fn run_explain(code: &str) -> Result<i32> {
    let Some(explanation) = explain_error_code(code) else {
        return Err(JournalError::InvalidInput(format!(
            "unknown error code `{}`; known codes: {}",
            normalize_error_code(code),
            known_error_codes().join(", ")
        )));
    };
    print_line(explanation)
}

fn run_check(config: &JournalConfig) -> Result<i32> {
    let _log_guard = crate::logging::init_logging(&config.logging, None)?;

    let driver = GocryptfsDriver::with_binary(&config.volume.gocryptfs);
    let version = driver.check_version()?;
    let mut report = vec![format!(
        "gocryptfs: v{version} (>= {MIN_GOCRYPTFS_VERSION})"
    )];

    let mut missing = Vec::new();
    for (label, binary, version_flag) in [
        ("rg", config.search.rg.as_str(), "--version"),
        ("tmux", config.editor.tmux.as_str(), "-V"),
    ] {
        match query_version(binary, version_flag) {
            Some(line) => report.push(format!("{label}: {line}")),
            None => {
                report.push(format!("{label}: missing ({binary})"));
                missing.push(binary);
            }
        }
    }
    match config.cipher_dir.as_deref() {
        Some(dir) if dir.is_dir() => report.push(format!("cipher dir: {}", dir.display())),
        Some(dir) => report.push(format!("cipher dir: {} (not found)", dir.display())),
        None => report.push(format!(
            "cipher dir: unset (pass CIPHER_DIR or set {CIPHER_DIR_ENV_VAR})"
        )),
    }
    report.push(format!("mount dir: {}", config.mount_dir.display()));

    print_line(&report.join("\n"))?;
    if missing.is_empty() {
        return Ok(0);
    }
    tracing::warn!(missing = %missing.join(", "), "required binaries are missing");
    Ok(1)
}

fn query_version(binary: &str, flag: &str) -> Option<String> {
    let output = ProcessCommand::new(binary).arg(flag).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_owned())
}

fn load_effective_config(cli: &Cli) -> Result<JournalConfig> {
    let cwd = std::env::current_dir()?;
    let env_config = read_config_env_var()?;
    let selection = resolve_config_path(
        cli.config.as_deref(),
        env_config.as_deref(),
        cli.no_config,
        &cwd,
    )?;
    let config = JournalConfig::load(&selection)?;
    apply_cli_overrides(cli, config, &cwd)
}

fn apply_cli_overrides(cli: &Cli, mut config: JournalConfig, cwd: &Path) -> Result<JournalConfig> {
    if let Some(cipher_dir) = cli.cipher_dir.as_deref() {
        if cipher_dir.as_os_str().is_empty() {
            return Err(JournalError::InvalidInput(
                "cipher directory cannot be empty".to_owned(),
            ));
        }
        config.cipher_dir = Some(absolutize_path(cipher_dir, cwd));
    }
    if let Some(mount) = cli.mount.as_deref() {
        config.mount_dir = absolutize_path(mount, cwd);
    }
    if let Some(idle) = cli.idle.as_deref() {
        config.idle = parse_duration_literal(idle, "--idle")?;
    }
    Ok(config)
}

fn read_config_env_var() -> Result<Option<String>> {
    match std::env::var(CONFIG_ENV_VAR) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(JournalError::InvalidInput(format!(
            "{CONFIG_ENV_VAR} must be valid UTF-8"
        ))),
    }
}

// A closed stdout ends the command quietly.
fn print_line(line: &str) -> Result<i32> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match handle
        .write_all(line.as_bytes())
        .and_then(|_| handle.write_all(b"\n"))
        .and_then(|_| handle.flush())
    {
        Ok(()) => Ok(0),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(0),
        Err(error) => Err(JournalError::Io(error)),
    }
}
