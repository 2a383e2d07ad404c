use std::{
    collections::{BTreeSet, HashSet},
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use super::{editor::EditorLauncher, search::TagSearch};
use crate::{
    error::{JournalError, Result},
    fs_secure::{
        ensure_dir_with_mode, remove_file_if_exists, set_permissions, ENTRY_DIR_MODE,
        ENTRY_FILE_MODE,
    },
    paths::JournalPaths,
    types::EntryDate,
    volume::VolumeAccess,
};

/// Date-addressed journal entries stored under the mounted volume.
///
/// Every operation checks the mount state first. Reads report "absent"
/// while locked; writes and searches fail with [`JournalError::NotMounted`]
/// and touch nothing.
#[derive(Debug, Clone)]
pub struct EntryRepository<V> {
    volume: V,
    paths: JournalPaths,
    search: TagSearch,
    editor: EditorLauncher,
}

impl<V: VolumeAccess> EntryRepository<V> {
    /// Creates a repository over `volume`.
    pub fn new(volume: V, search: TagSearch, editor: EditorLauncher) -> Self {
        let paths = JournalPaths::new(volume.mount_path());
        Self {
            volume,
            paths,
            search,
            editor,
        }
    }

    /// Volume handle.
    pub fn volume(&self) -> &V {
        &self.volume
    }

    /// `<mount>/<YYYY>/<MM>/<DD>.md`, whether or not it exists.
    pub fn entry_path(&self, date: EntryDate) -> PathBuf {
        self.paths.entry_path(date)
    }

    /// Maps a path reported by search or the watcher back to its date.
    pub fn entry_at_path(&self, path: &Path) -> Option<EntryDate> {
        self.paths.entry_at_path(path)
    }

    /// False while locked or when the file is absent.
    pub fn has_entry(&self, date: EntryDate) -> Result<bool> {
        if !self.volume.is_mounted() {
            return Ok(false);
        }
        match fs::metadata(self.entry_path(date)) {
            Ok(_) => Ok(true),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    /// Entry text, or `None` while locked or when the file is absent.
    pub fn get_entry(&self, date: EntryDate) -> Result<Option<String>> {
        if !self.volume.is_mounted() {
            return Ok(None);
        }
        match fs::read_to_string(self.entry_path(date)) {
            Ok(content) => Ok(Some(content)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Creates the entry file with its `# <heading>` line.
    ///
    /// An existing entry is left as is and its path returned.
    pub fn create_entry(&self, date: EntryDate) -> Result<PathBuf> {
        self.require_mounted()?;

        let path = self.entry_path(date);
        let Some(dir) = path.parent() else {
            return Err(JournalError::InvalidInput(format!(
                "entry path has no parent: {}",
                path.display()
            )));
        };
        let is_new_dir = !dir.exists();
        ensure_dir_with_mode(dir, ENTRY_DIR_MODE)?;
        if is_new_dir {
            self.volume.watch_directory(dir);
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(ENTRY_FILE_MODE);
        }
        let file = match options.open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => return Ok(path),
            Err(error) => return Err(error.into()),
        };
        write_new_entry(&path, file, &format!("# {}\n\n", date.heading()))?;
        set_permissions(&path, ENTRY_FILE_MODE)?;

        tracing::debug!(path = %path.display(), "created entry");
        Ok(path)
    }

    /// Opens the entry in the editor, creating it first when missing.
    pub fn edit_entry(&self, date: EntryDate) -> Result<()> {
        self.require_mounted()?;
        if !self.has_entry(date)? {
            self.create_entry(date)?;
        }
        self.editor.open(&self.entry_path(date), &date.label())
    }

    /// Removes the entry file. Deleting an absent entry succeeds.
    pub fn delete_entry(&self, date: EntryDate) -> Result<()> {
        self.require_mounted()?;
        let path = self.entry_path(date);
        remove_file_if_exists(&path)?;
        tracing::debug!(path = %path.display(), "deleted entry");
        Ok(())
    }

    /// Every distinct `@tag` across the journal, unordered.
    pub fn tags(&self) -> Result<HashSet<String>> {
        self.require_mounted()?;
        self.search.tags(self.paths.mount())
    }

    /// Dates whose entries contain `tag` as a whole word, oldest first.
    pub fn search_tag(&self, tag: &str) -> Result<Vec<EntryDate>> {
        self.require_mounted()?;
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(JournalError::InvalidInput("tag cannot be empty".to_owned()));
        }

        let dates = self
            .search
            .files_with_word(self.paths.mount(), tag)?
            .iter()
            .filter_map(|path| self.entry_at_path(path))
            .collect::<BTreeSet<_>>();
        Ok(dates.into_iter().collect())
    }

    fn require_mounted(&self) -> Result<()> {
        if self.volume.is_mounted() {
            Ok(())
        } else {
            Err(JournalError::NotMounted)
        }
    }
}

// A half-written entry would be mistaken for an existing one by the next
// create, so it is removed when the header cannot be written.
fn write_new_entry(path: &Path, mut file: impl Write, header: &str) -> Result<()> {
    let written = file
        .write_all(header.as_bytes())
        .and_then(|()| file.flush());
    if let Err(error) = written {
        drop(file);
        if let Err(cleanup) = remove_file_if_exists(path) {
            tracing::warn!(path = %path.display(), %cleanup, "failed to remove partial entry");
        }
        return Err(error.into());
    }
    Ok(())
}
