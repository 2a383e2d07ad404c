use assert_cmd::Command;

use std::{fs, path::Path};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

fn journal() -> Command {
    let mut command = Command::new(assert_cmd::cargo::cargo_bin!("journal"));
    command.env_remove("JOURNAL_CONFIG").env_remove("JOURNAL_ENC_DIR");
    command
}

#[cfg(unix)]
fn write_executable(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, body).unwrap();
    let mut permissions = fs::metadata(path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions).unwrap();
}

#[cfg(unix)]
fn install_fake_tools(bin_dir: &Path, gocryptfs_version: &str) {
    write_executable(
        &bin_dir.join("gocryptfs"),
        &format!(
            "#!/usr/bin/env bash\nif [[ \"$1\" == \"-version\" ]]; then\n  echo \"gocryptfs v{gocryptfs_version}; go-fuse v2.5.0; 2024-10-01\"\nfi\n"
        ),
    );
    write_executable(
        &bin_dir.join("rg"),
        "#!/usr/bin/env bash\necho \"ripgrep 14.1.0\"\n",
    );
    write_executable(
        &bin_dir.join("tmux"),
        "#!/usr/bin/env bash\necho \"tmux 3.4\"\n",
    );
}

#[cfg(unix)]
fn write_tool_config(root: &Path, tmux: &str) -> std::path::PathBuf {
    let bin_dir = root.join("bin");
    let config = root.join(".journal.toml");
    fs::write(
        &config,
        format!(
            r#"
version = 1

[journal]
cipher_dir = "cipher"
mount_dir = "mnt"

[volume]
gocryptfs = "{gocryptfs}"

[search]
rg = "{rg}"

[editor]
tmux = "{tmux}"

[logging]
dir = "logs"
"#,
            gocryptfs = bin_dir.join("gocryptfs").display(),
            rg = bin_dir.join("rg").display(),
        ),
    )
    .unwrap();
    config
}

#[test]
fn cli_explain_known_code() {
    journal()
        .args(["explain", "e200"])
        .assert()
        .success()
        .stdout(predicates::str::contains("E200 incorrect password"));
}

#[test]
fn cli_explain_unknown_code_fails_with_invalid_input() {
    journal()
        .args(["explain", "E999"])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("error[E100]"))
        .stderr(predicates::str::contains("unknown error code `E999`"));
}

#[test]
fn cli_path_prints_entry_location() {
    journal()
        .args(["--no-config", "-m", "/srv/journal", "path", "2024/3/7"])
        .assert()
        .success()
        .stdout("/srv/journal/2024/03/07.md\n");
}

#[test]
fn cli_path_rejects_impossible_date() {
    journal()
        .args(["--no-config", "path", "2024/02/30"])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("error[E101]"));
}

#[test]
fn cli_path_uses_discovered_config() {
    let temp = tempfile::tempdir().unwrap();
    let nested = temp.path().join("nested/deeper");
    fs::create_dir_all(&nested).unwrap();
    fs::write(
        temp.path().join(".journal.toml"),
        "version = 1\n\n[journal]\nmount_dir = \"mnt\"\n",
    )
    .unwrap();

    let expected = format!("{}\n", temp.path().join("mnt/2023/12/31.md").display());
    journal()
        .current_dir(&nested)
        .args(["path", "2023/12/31"])
        .assert()
        .success()
        .stdout(expected);
}

#[test]
fn cli_rejects_invalid_idle() {
    journal()
        .args(["--no-config", "--idle", "forever", "path", "2024/01/01"])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("error[E100]"));
}

#[test]
fn cli_interactive_mode_requires_terminal() {
    journal()
        .args(["--no-config", "/nonexistent/journal.enc"])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("interactive terminal"));
}

#[cfg(unix)]
#[test]
fn cli_check_reports_tools() {
    let temp = tempfile::tempdir().unwrap();
    install_fake_tools(&temp.path().join("bin"), "2.6.1");
    let tmux = temp.path().join("bin/tmux");
    let config = write_tool_config(temp.path(), &tmux.to_string_lossy());
    fs::create_dir_all(temp.path().join("cipher")).unwrap();

    journal()
        .args(["--config", config.to_str().unwrap(), "check"])
        .assert()
        .success()
        .stdout(predicates::str::contains("gocryptfs: v2.6.1"))
        .stdout(predicates::str::contains("rg: ripgrep 14.1.0"))
        .stdout(predicates::str::contains("tmux: tmux 3.4"));
    assert!(temp.path().join("logs/journal.log").exists());
}

#[cfg(unix)]
#[test]
fn cli_check_flags_missing_tmux() {
    let temp = tempfile::tempdir().unwrap();
    install_fake_tools(&temp.path().join("bin"), "2.6.1");
    let config = write_tool_config(temp.path(), "/nonexistent/tmux");

    journal()
        .args(["--config", config.to_str().unwrap(), "check"])
        .assert()
        .code(1)
        .stdout(predicates::str::contains("tmux: missing"));
}

#[cfg(unix)]
#[test]
fn cli_check_rejects_old_gocryptfs() {
    let temp = tempfile::tempdir().unwrap();
    install_fake_tools(&temp.path().join("bin"), "2.4.0");
    let tmux = temp.path().join("bin/tmux");
    let config = write_tool_config(temp.path(), &tmux.to_string_lossy());

    journal()
        .args(["--config", config.to_str().unwrap(), "check"])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("error[E300]"));
}
