use journal::fs_secure::{ensure_dir_with_mode, remove_file_if_exists};

#[test]
fn ensure_dir_with_mode_creates_nested_directories() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dir_path = temp_dir.path().join("2024/03");

    ensure_dir_with_mode(&dir_path, 0o740).unwrap();
    ensure_dir_with_mode(&dir_path, 0o740).unwrap();

    assert!(dir_path.is_dir());
}

#[test]
fn remove_file_if_exists_tolerates_absent_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file_path = temp_dir.path().join("07.md");

    remove_file_if_exists(&file_path).unwrap();
    std::fs::write(&file_path, "# entry\n").unwrap();
    remove_file_if_exists(&file_path).unwrap();

    assert!(!file_path.exists());
}

#[cfg(unix)]
#[test]
fn existing_directory_mode_is_reset() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = tempfile::tempdir().unwrap();
    let dir_path = temp_dir.path().join("2024");
    std::fs::create_dir(&dir_path).unwrap();
    std::fs::set_permissions(&dir_path, std::fs::Permissions::from_mode(0o777)).unwrap();

    ensure_dir_with_mode(&dir_path, 0o740).unwrap();

    let dir_mode = std::fs::metadata(&dir_path).unwrap().permissions().mode() & 0o777;
    assert_eq!(dir_mode, 0o740);
}
