#![allow(dead_code)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::Duration,
};

/// Password the fake gocryptfs accepts.
pub const GOOD_PASSWORD: &str = "correct horse";

/// Writes an executable script.
pub fn write_script(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, body).unwrap();
    let mut permissions = fs::metadata(path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions).unwrap();
}

/// Polls `predicate` for up to five seconds.
pub fn wait_for(predicate: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

/// What the fake gocryptfs does once the password was accepted.
#[derive(Debug, Clone, Copy)]
pub enum FakeMount {
    /// Stays up until SIGTERM.
    Serve,
    /// Stays up long enough to be confirmed, then exits on its own.
    CrashAfter(Duration),
    /// Ignores SIGTERM for a few seconds.
    IgnoreTerm,
    /// Exits right away with this code.
    ExitWith(i32),
}

/// Paths of one fake gocryptfs installation.
pub struct FakeGocryptfs {
    /// Script path.
    pub binary: PathBuf,
    /// One line of arguments per invocation, plus `TERM` when signalled.
    pub args_log: PathBuf,
    /// Last password read from stdin.
    pub password_log: PathBuf,
    /// What stdin looked like after the password: `eof`, `open` or `data`.
    pub stdin_log: PathBuf,
}

impl FakeGocryptfs {
    /// Installs the script under `root/bin`.
    pub fn install(root: &Path, behavior: FakeMount) -> Self {
        let bin_dir = root.join("bin");
        let logs_dir = root.join("logs");
        fs::create_dir_all(&logs_dir).unwrap();

        let binary = bin_dir.join("gocryptfs");
        let args_log = logs_dir.join("gocryptfs.log");
        let password_log = logs_dir.join("password.log");
        let stdin_log = logs_dir.join("stdin.log");

        let after_password = match behavior {
            FakeMount::Serve => r#"trap 'echo TERM >> "__LOG__"; exit 0' TERM
for _ in $(seq 1 600); do
  sleep 0.05
done
"#
            .to_owned(),
            FakeMount::CrashAfter(after) => {
                format!("sleep {:.2}\nexit 3\n", after.as_secs_f64())
            }
            FakeMount::IgnoreTerm => r#"trap 'echo TERM >> "__LOG__"' TERM
for _ in $(seq 1 60); do
  sleep 0.05
done
"#
            .to_owned(),
            FakeMount::ExitWith(code) => format!("exit {code}\n"),
        };

        let script = format!(
            r#"#!/usr/bin/env bash
set -uo pipefail
if [[ "${{1:-}}" == "-version" ]]; then
  echo "gocryptfs v2.6.1; go-fuse v2.5.0; 2024-10-01 go1.22 linux/amd64"
  exit 0
fi
echo "$*" >> "__LOG__"
IFS= read -r password || true
printf '%s' "$password" > "__PASSWORD__"
IFS= read -r -t 1 extra
stdin_status=$?
if (( stdin_status == 0 )) || [[ -n "${{extra:-}}" ]]; then
  echo data > "__STDIN__"
elif (( stdin_status > 128 )); then
  echo open > "__STDIN__"
else
  echo eof > "__STDIN__"
fi
if [[ "$password" != "{GOOD_PASSWORD}" ]]; then
  exit 12
fi
{after_password}"#
        );
        write_script(
            &binary,
            &script
                .replace("__LOG__", &args_log.to_string_lossy())
                .replace("__PASSWORD__", &password_log.to_string_lossy())
                .replace("__STDIN__", &stdin_log.to_string_lossy()),
        );

        Self {
            binary,
            args_log,
            password_log,
            stdin_log,
        }
    }

    /// Binary path as the driver expects it.
    pub fn binary_str(&self) -> String {
        self.binary.to_string_lossy().to_string()
    }

    /// Logged invocation lines, excluding `TERM` markers.
    pub fn invocations(&self) -> Vec<String> {
        self.log_lines()
            .into_iter()
            .filter(|line| line != "TERM")
            .collect()
    }

    /// Recorded stdin state after the password, once the script got that far.
    pub fn stdin_state(&self) -> Option<String> {
        fs::read_to_string(&self.stdin_log)
            .ok()
            .map(|state| state.trim().to_owned())
            .filter(|state| !state.is_empty())
    }

    /// Whether the script saw SIGTERM.
    pub fn was_terminated(&self) -> bool {
        self.log_lines().iter().any(|line| line == "TERM")
    }

    fn log_lines(&self) -> Vec<String> {
        fs::read_to_string(&self.args_log)
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }
}
