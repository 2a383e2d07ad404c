use std::{path::Path, process::Command};

use serde::{Deserialize, Serialize};

use crate::{
    config::EditorSettings,
    error::{JournalError, Result},
    process::{failure_detail, map_command_execution_error, retry_exec_busy},
};

const EDITOR_ENV_VAR: &str = "EDITOR";
const TMUX_ENV_VAR: &str = "TMUX";

/// Where tmux shows the editor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorMode {
    /// `tmux new-window`.
    #[default]
    Window,
    /// Full-screen `tmux display-popup`.
    Popup,
}

/// Opens entries in `$EDITOR` inside the surrounding tmux session.
#[derive(Debug, Clone)]
pub struct EditorLauncher {
    tmux: String,
    editor: Option<String>,
    inside_tmux: bool,
    mode: EditorMode,
}

impl EditorLauncher {
    /// Creates a launcher with explicit environment facts.
    pub fn new(
        tmux: impl Into<String>,
        editor: Option<String>,
        inside_tmux: bool,
        mode: EditorMode,
    ) -> Self {
        Self {
            tmux: tmux.into(),
            editor,
            inside_tmux,
            mode,
        }
    }

    /// Reads `$EDITOR` and `$TMUX`; `[editor] command` wins over `$EDITOR`.
    pub fn from_env(settings: &EditorSettings) -> Self {
        let editor = settings
            .command
            .clone()
            .or_else(|| std::env::var(EDITOR_ENV_VAR).ok())
            .filter(|value| !value.trim().is_empty());
        let inside_tmux = std::env::var_os(TMUX_ENV_VAR).is_some();
        Self::new(settings.tmux.clone(), editor, inside_tmux, settings.mode)
    }

    /// Runs the editor on `file` in a tmux window or popup titled `title`.
    pub fn open(&self, file: &Path, title: &str) -> Result<()> {
        let Some(editor) = self.editor.as_deref() else {
            return Err(JournalError::EditorUnavailable(
                "the $EDITOR environment variable is not set".to_owned(),
            ));
        };
        if !self.inside_tmux {
            return Err(JournalError::EditorUnavailable(
                "need to be inside tmux".to_owned(),
            ));
        }

        let output = retry_exec_busy(|| {
            let mut command = Command::new(&self.tmux);
            match self.mode {
                EditorMode::Window => command.args(["neww", "-n", title]),
                EditorMode::Popup => command.args([
                    "display-popup",
                    "-w",
                    "100%",
                    "-h",
                    "100%",
                    "-T",
                    title,
                    "-EE",
                ]),
            };
            command.arg(editor).arg(file).output()
        })
        .map_err(|error| map_command_execution_error(&self.tmux, error))?;

        if !output.status.success() {
            return Err(JournalError::ExternalTool {
                tool: self.tmux.clone(),
                message: failure_detail(&output),
            });
        }
        tracing::info!(editor, file = %file.display(), "opened entry for editing");
        Ok(())
    }
}
