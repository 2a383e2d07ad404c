use std::{fs, path::Path};

use crate::error::Result;

/// Unix mode for entry directories inside the mounted volume.
pub const ENTRY_DIR_MODE: u32 = 0o740;
/// Unix mode for entry files inside the mounted volume.
pub const ENTRY_FILE_MODE: u32 = 0o740;

/// Ensures a directory exists, creating missing ancestors with `mode`.
///
/// Only directories created by this call are affected; the leaf is always
/// reset to `mode` so a umask cannot widen or narrow it.
pub fn ensure_dir_with_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(path)?;
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(path)?;
    }
    set_permissions(path, mode)
}

/// Applies Unix permissions when supported.
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

/// Removes a file, treating an already-absent file as success.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}
