use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use crate::{
    error::{JournalError, Result},
    process::{failure_detail, map_command_execution_error, retry_exec_busy},
};

const TAG_PATTERN: &str = r"@[^\W]+";
// rg exits 1 when nothing matched.
const EXIT_CODE_NO_MATCH: i32 = 1;

/// ripgrep-backed tag index.
#[derive(Debug, Clone)]
pub struct TagSearch {
    rg: String,
}

impl TagSearch {
    /// Uses `rg` from `PATH`.
    pub fn new() -> Self {
        Self::with_binary("rg")
    }

    /// Uses a specific ripgrep binary.
    pub fn with_binary(rg: impl Into<String>) -> Self {
        Self { rg: rg.into() }
    }

    /// Every distinct `@word` under `root`, in no particular order.
    pub fn tags(&self, root: &Path) -> Result<HashSet<String>> {
        let output = self.run(|command| {
            command
                .args(["--only-matching", "--no-filename", "--no-line-number", "-e"])
                .arg(TAG_PATTERN)
                .arg(root);
        })?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect())
    }

    /// Files under `root` containing `word` literally, as a whole word.
    pub fn files_with_word(&self, root: &Path, word: &str) -> Result<Vec<PathBuf>> {
        let output = self.run(|command| {
            command.args(["-l", "-w", "-F", "-e", word]).arg(root);
        })?;
        Ok(output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(PathBuf::from)
            .collect())
    }

    fn run(&self, configure: impl Fn(&mut Command)) -> Result<String> {
        let output = retry_exec_busy(|| {
            let mut command = Command::new(&self.rg);
            configure(&mut command);
            command.output()
        })
        .map_err(|error| map_command_execution_error(&self.rg, error))?;
        self.stdout_or_error(output)
    }

    fn stdout_or_error(&self, output: Output) -> Result<String> {
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        if output.status.code() == Some(EXIT_CODE_NO_MATCH) && output.stdout.is_empty() {
            return Ok(String::new());
        }
        let detail = failure_detail(&output);
        tracing::warn!(rg = %self.rg, %detail, "rg failed");
        Err(JournalError::ExternalTool {
            tool: self.rg.clone(),
            message: detail,
        })
    }
}

impl Default for TagSearch {
    fn default() -> Self {
        Self::new()
    }
}
