use std::{
    fs,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    entries::EditorMode,
    error::{JournalError, Result},
};

const CONFIG_VERSION_V1: u32 = 1;
const DEFAULT_MOUNT_DIR: &str = "/tmp/journal";
const DEFAULT_IDLE: &str = "30m";
const DEFAULT_GRACE_WINDOW_MILLIS: u64 = 3_000;
const DEFAULT_UNMOUNT_TIMEOUT_MILLIS: u64 = 3_000;
const DEFAULT_TAG_REFRESH_SECONDS: u64 = 3;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_GOCRYPTFS_BINARY: &str = "gocryptfs";
const DEFAULT_RG_BINARY: &str = "rg";
const DEFAULT_TMUX_BINARY: &str = "tmux";

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = ".journal.toml";
/// Environment variable selecting a config file.
pub const CONFIG_ENV_VAR: &str = "JOURNAL_CONFIG";
/// Environment variable naming the cipher directory.
pub const CIPHER_DIR_ENV_VAR: &str = "JOURNAL_ENC_DIR";
/// Environment variable overriding the log filter.
pub const LOG_ENV_VAR: &str = "JOURNAL_LOG";

/// Source used to select the effective config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfigSource {
    /// Selected via `--config` CLI flag.
    Flag,
    /// Selected via `JOURNAL_CONFIG` environment variable.
    Env,
    /// Selected by walking from the current working directory to root.
    Discovered,
    /// No config file selected.
    None,
}

/// Resolved config selection before parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSelection {
    /// Source used for selection.
    pub source: ConfigSource,
    /// Selected path when a config file was found.
    pub path: Option<PathBuf>,
}

/// Raw TOML shape for one `.journal.toml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct JournalConfigFile {
    /// Schema version.
    pub version: u32,
    /// Journal location defaults.
    #[serde(default)]
    pub journal: JournalSectionFile,
    /// Mount supervision tuning.
    #[serde(default)]
    pub volume: VolumeSectionFile,
    /// Tag search settings.
    #[serde(default)]
    pub search: SearchSectionFile,
    /// Editor launch settings.
    #[serde(default)]
    pub editor: EditorSectionFile,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingSectionFile,
}

/// Raw `[journal]` section from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct JournalSectionFile {
    /// Ciphertext directory.
    pub cipher_dir: Option<String>,
    /// Plaintext mount directory.
    pub mount_dir: Option<String>,
    /// Idle duration after which gocryptfs unmounts on its own.
    pub idle: Option<String>,
}

/// Raw `[volume]` section from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VolumeSectionFile {
    /// Wait after spawning gocryptfs before the mount is assumed ready.
    pub grace_window_ms: Option<u64>,
    /// Wait for gocryptfs to exit after SIGTERM.
    pub unmount_timeout_ms: Option<u64>,
    /// gocryptfs binary override.
    pub gocryptfs: Option<String>,
}

/// Raw `[search]` section from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SearchSectionFile {
    /// ripgrep binary override.
    pub rg: Option<String>,
    /// Period of the background tag refresh.
    pub tag_refresh_seconds: Option<u64>,
}

/// Raw `[editor]` section from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EditorSectionFile {
    /// Editor command; `$EDITOR` when unset.
    pub command: Option<String>,
    /// tmux window or popup.
    pub mode: Option<EditorMode>,
    /// tmux binary override.
    pub tmux: Option<String>,
}

/// Raw `[logging]` section from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSectionFile {
    /// `tracing` filter directive.
    pub level: Option<String>,
    /// Directory for `journal.log`.
    pub dir: Option<String>,
}

/// Effective mount supervision settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSettings {
    /// gocryptfs binary.
    pub gocryptfs: String,
    /// Optimistic mount confirmation window.
    pub grace_window: Duration,
    /// Bounded wait for gocryptfs to exit on unmount.
    pub unmount_timeout: Duration,
}

/// Effective search settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSettings {
    /// ripgrep binary.
    pub rg: String,
    /// Period of the background tag refresh.
    pub tag_refresh: Duration,
}

/// Effective editor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorSettings {
    /// Editor command override; `$EDITOR` is consulted when unset.
    pub command: Option<String>,
    /// tmux window or popup.
    pub mode: EditorMode,
    /// tmux binary.
    pub tmux: String,
}

/// Effective logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// `tracing` filter directive.
    pub level: String,
    /// Directory for `journal.log`.
    pub dir: PathBuf,
}

/// Effective and validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalConfig {
    /// Config file the values came from, if any.
    pub source_path: Option<PathBuf>,
    /// Ciphertext directory; may still be supplied by CLI or env.
    pub cipher_dir: Option<PathBuf>,
    /// Plaintext mount directory.
    pub mount_dir: PathBuf,
    /// gocryptfs idle auto-unmount duration.
    pub idle: Duration,
    /// Mount supervision settings.
    pub volume: VolumeSettings,
    /// Tag search settings.
    pub search: SearchSettings,
    /// Editor settings.
    pub editor: EditorSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            source_path: None,
            cipher_dir: None,
            mount_dir: PathBuf::from(DEFAULT_MOUNT_DIR),
            idle: Duration::from_secs(30 * 60),
            volume: VolumeSettings {
                gocryptfs: DEFAULT_GOCRYPTFS_BINARY.to_owned(),
                grace_window: Duration::from_millis(DEFAULT_GRACE_WINDOW_MILLIS),
                unmount_timeout: Duration::from_millis(DEFAULT_UNMOUNT_TIMEOUT_MILLIS),
            },
            search: SearchSettings {
                rg: DEFAULT_RG_BINARY.to_owned(),
                tag_refresh: Duration::from_secs(DEFAULT_TAG_REFRESH_SECONDS),
            },
            editor: EditorSettings {
                command: None,
                mode: EditorMode::Window,
                tmux: DEFAULT_TMUX_BINARY.to_owned(),
            },
            logging: LoggingSettings {
                level: DEFAULT_LOG_LEVEL.to_owned(),
                dir: default_log_dir(),
            },
        }
    }
}

impl JournalConfig {
    /// Loads and validates a config file from disk.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let absolute_path = absolutize_path(path.as_ref(), &cwd);
        if !is_regular_config_candidate(&absolute_path) {
            return Err(JournalError::InvalidInput(format!(
                "config file must be a regular file: {}",
                absolute_path.display()
            )));
        }
        let raw = fs::read_to_string(&absolute_path)?;
        let parsed = toml::from_str::<JournalConfigFile>(&raw)
            .map_err(|error| JournalError::InvalidInput(format!("invalid config: {error}")))?;
        build_config(parsed, &absolute_path)
    }

    /// Loads the selected config, or defaults when nothing was selected.
    pub fn load(selection: &ConfigSelection) -> Result<Self> {
        match selection.path.as_deref() {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }
}

/// Resolves which config file should be loaded.
pub fn resolve_config_path(
    explicit_path: Option<&Path>,
    env_path: Option<&str>,
    no_config: bool,
    cwd: impl AsRef<Path>,
) -> Result<ConfigSelection> {
    if no_config {
        return Ok(ConfigSelection {
            source: ConfigSource::None,
            path: None,
        });
    }

    let cwd = cwd.as_ref();
    if let Some(path) = explicit_path {
        let candidate = absolutize_path(path, cwd);
        if !is_regular_config_candidate(&candidate) {
            return Err(JournalError::InvalidInput(format!(
                "config file must be a regular file: {}",
                candidate.display()
            )));
        }
        return Ok(ConfigSelection {
            source: ConfigSource::Flag,
            path: Some(candidate),
        });
    }

    if let Some(value) = env_path {
        if value.trim().is_empty() {
            return Err(JournalError::InvalidInput(format!(
                "{CONFIG_ENV_VAR} cannot be empty"
            )));
        }

        let candidate = absolutize_path(Path::new(value), cwd);
        if !is_regular_config_candidate(&candidate) {
            return Err(JournalError::InvalidInput(format!(
                "config file must be a regular file: {}",
                candidate.display()
            )));
        }
        return Ok(ConfigSelection {
            source: ConfigSource::Env,
            path: Some(candidate),
        });
    }

    if let Some(discovered) = discover_config(cwd) {
        return Ok(ConfigSelection {
            source: ConfigSource::Discovered,
            path: Some(discovered),
        });
    }

    Ok(ConfigSelection {
        source: ConfigSource::None,
        path: None,
    })
}

/// Walks from `start_dir` to the filesystem root looking for [`CONFIG_FILE_NAME`].
pub fn discover_config(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start_dir.as_ref();
    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if is_regular_config_candidate(&candidate) {
            return Some(candidate);
        }

        let parent = current.parent()?;
        current = parent;
    }
}

/// Parses a duration literal such as `30s`, `5m`, `1h`, or `2d`.
pub fn parse_duration_literal(value: &str, label: &str) -> Result<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return Err(JournalError::InvalidInput(format!(
            "{label} cannot be empty"
        )));
    }

    let unit_start = value
        .char_indices()
        .last()
        .map(|(index, _)| index)
        .unwrap_or_default();
    let (number, unit) = value.split_at(unit_start);
    let amount = number.parse::<u64>().map_err(|_| {
        JournalError::InvalidInput(format!("{label} must be a duration like 30s, 5m, or 1h"))
    })?;
    if amount == 0 {
        return Err(JournalError::InvalidInput(format!(
            "{label} must be greater than zero"
        )));
    }

    let seconds = match unit {
        "s" => Some(amount),
        "m" => amount.checked_mul(60),
        "h" => amount.checked_mul(60 * 60),
        "d" => amount.checked_mul(24 * 60 * 60),
        _ => {
            return Err(JournalError::InvalidInput(format!(
                "{label} must use one of s, m, h, d"
            )))
        }
    };
    seconds
        .map(Duration::from_secs)
        .ok_or_else(|| JournalError::InvalidInput(format!("{label} is too large")))
}

/// Resolves `~` and relative paths against `base_dir`.
pub fn resolve_path_value(value: &str, base_dir: &Path) -> Result<PathBuf> {
    validate_path_literal(value, "path")?;

    let expanded = expand_home(value)?;
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    };
    Ok(normalize_path(&absolute))
}

fn build_config(raw: JournalConfigFile, source_path: &Path) -> Result<JournalConfig> {
    if raw.version != CONFIG_VERSION_V1 {
        return Err(JournalError::InvalidInput(format!(
            "unsupported config version {} (expected {})",
            raw.version, CONFIG_VERSION_V1
        )));
    }

    let defaults = JournalConfig::default();
    let source_dir = source_path.parent().unwrap_or(Path::new("."));

    let cipher_dir = raw
        .journal
        .cipher_dir
        .as_deref()
        .map(|value| resolve_path_value(value, source_dir))
        .transpose()?;
    let mount_dir = match raw.journal.mount_dir.as_deref() {
        Some(value) => resolve_path_value(value, source_dir)?,
        None => defaults.mount_dir,
    };
    let idle = parse_duration_literal(
        raw.journal.idle.as_deref().unwrap_or(DEFAULT_IDLE),
        "journal.idle",
    )?;

    let volume = VolumeSettings {
        gocryptfs: non_empty_binary(raw.volume.gocryptfs, "volume.gocryptfs")?
            .unwrap_or(defaults.volume.gocryptfs),
        grace_window: positive_millis(raw.volume.grace_window_ms, "volume.grace_window_ms")?
            .unwrap_or(defaults.volume.grace_window),
        unmount_timeout: positive_millis(
            raw.volume.unmount_timeout_ms,
            "volume.unmount_timeout_ms",
        )?
        .unwrap_or(defaults.volume.unmount_timeout),
    };

    let tag_refresh = match raw.search.tag_refresh_seconds {
        Some(0) => {
            return Err(JournalError::InvalidInput(
                "search.tag_refresh_seconds must be greater than zero".to_owned(),
            ))
        }
        Some(seconds) => Duration::from_secs(seconds),
        None => defaults.search.tag_refresh,
    };
    let search = SearchSettings {
        rg: non_empty_binary(raw.search.rg, "search.rg")?.unwrap_or(defaults.search.rg),
        tag_refresh,
    };

    let editor = EditorSettings {
        command: non_empty_binary(raw.editor.command, "editor.command")?,
        mode: raw.editor.mode.unwrap_or(defaults.editor.mode),
        tmux: non_empty_binary(raw.editor.tmux, "editor.tmux")?.unwrap_or(defaults.editor.tmux),
    };

    let logging = LoggingSettings {
        level: match raw.logging.level {
            Some(level) if level.trim().is_empty() => {
                return Err(JournalError::InvalidInput(
                    "logging.level cannot be empty".to_owned(),
                ))
            }
            Some(level) => level,
            None => defaults.logging.level,
        },
        dir: match raw.logging.dir.as_deref() {
            Some(value) => resolve_path_value(value, source_dir)?,
            None => defaults.logging.dir,
        },
    };

    Ok(JournalConfig {
        source_path: Some(source_path.to_path_buf()),
        cipher_dir,
        mount_dir,
        idle,
        volume,
        search,
        editor,
        logging,
    })
}

fn non_empty_binary(value: Option<String>, label: &str) -> Result<Option<String>> {
    match value {
        Some(value) if value.trim().is_empty() => Err(JournalError::InvalidInput(format!(
            "{label} cannot be empty"
        ))),
        other => Ok(other),
    }
}

fn positive_millis(value: Option<u64>, label: &str) -> Result<Option<Duration>> {
    match value {
        Some(0) => Err(JournalError::InvalidInput(format!(
            "{label} must be greater than zero"
        ))),
        Some(millis) => Ok(Some(Duration::from_millis(millis))),
        None => Ok(None),
    }
}

fn default_log_dir() -> PathBuf {
    if let Some(state_home) = std::env::var_os("XDG_STATE_HOME").filter(|value| !value.is_empty())
    {
        return PathBuf::from(state_home).join("journal");
    }
    if let Some(home) = std::env::var_os("HOME").filter(|value| !value.is_empty()) {
        return PathBuf::from(home).join(".local/state/journal");
    }
    std::env::temp_dir().join("journal-logs")
}

fn validate_path_literal(value: &str, label: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(JournalError::InvalidInput(format!(
            "{label} cannot be empty"
        )));
    }
    Ok(())
}

fn expand_home(value: &str) -> Result<PathBuf> {
    if value == "~" {
        let home = std::env::var_os("HOME")
            .ok_or_else(|| JournalError::InvalidInput("HOME is not set".to_owned()))?;
        return Ok(PathBuf::from(home));
    }

    if let Some(rest) = value.strip_prefix("~/") {
        let home = std::env::var_os("HOME")
            .ok_or_else(|| JournalError::InvalidInput("HOME is not set".to_owned()))?;
        return Ok(PathBuf::from(home).join(rest));
    }

    if value.starts_with('~') {
        return Err(JournalError::InvalidInput(
            "only '~' and '~/' home expansion are supported".to_owned(),
        ));
    }

    Ok(PathBuf::from(value))
}

fn normalize_path(path: &Path) -> PathBuf {
    let is_absolute = path.is_absolute();
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() && !is_absolute {
                    normalized.push("..");
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    if normalized.as_os_str().is_empty() {
        if is_absolute {
            PathBuf::from(std::path::MAIN_SEPARATOR.to_string())
        } else {
            PathBuf::from(".")
        }
    } else {
        normalized
    }
}

pub(crate) fn absolutize_path(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&cwd.join(path))
    }
}

fn is_regular_config_candidate(path: &Path) -> bool {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return false;
    };
    !metadata.file_type().is_symlink() && metadata.file_type().is_file()
}
