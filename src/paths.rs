use std::path::{Component, Path, PathBuf};

use crate::types::EntryDate;

const ENTRY_EXTENSION: &str = "md";

/// Canonical on-disk layout of journal entries under the mount path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalPaths {
    mount: PathBuf,
}

impl JournalPaths {
    /// Creates a layout rooted at the plaintext mount path.
    ///
    /// Trailing separators are dropped so that derived paths never contain `//`.
    pub fn new(mount: impl AsRef<Path>) -> Self {
        let mount = mount.as_ref().components().collect::<PathBuf>();
        Self { mount }
    }

    /// Plaintext mount path.
    pub fn mount(&self) -> &Path {
        &self.mount
    }

    /// `<mount>/<YYYY>/<MM>/<DD>.md`.
    pub fn entry_path(&self, date: EntryDate) -> PathBuf {
        self.mount
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}.{ENTRY_EXTENSION}", date.day()))
    }

    /// Maps an entry path back to its date, or `None` for paths outside the layout.
    pub fn entry_at_path(&self, path: &Path) -> Option<EntryDate> {
        let relative = path.strip_prefix(&self.mount).ok()?;
        let parts = relative
            .components()
            .map(|component| match component {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        let [year, month, file_name] = parts.as_slice() else {
            return None;
        };
        let day = file_name.strip_suffix(&format!(".{ENTRY_EXTENSION}"))?;
        if year.len() != 4 || month.len() != 2 || day.len() != 2 {
            return None;
        }
        EntryDate::new(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?).ok()
    }
}

#[cfg(test)]
mod unit_tests {
    use std::path::Path;

    use super::JournalPaths;
    use crate::types::EntryDate;

    #[test]
    fn entry_path_is_zero_padded() {
        let paths = JournalPaths::new("/tmp/journal/");
        let date = EntryDate::new(2024, 3, 7).unwrap();
        assert_eq!(
            paths.entry_path(date),
            Path::new("/tmp/journal/2024/03/07.md")
        );
    }

    #[test]
    fn entry_at_path_inverts_entry_path() {
        let paths = JournalPaths::new("/tmp/journal");
        let date = EntryDate::new(2023, 12, 31).unwrap();
        assert_eq!(paths.entry_at_path(&paths.entry_path(date)), Some(date));
    }

    #[test]
    fn entry_at_path_rejects_foreign_paths() {
        let paths = JournalPaths::new("/tmp/journal");
        assert_eq!(paths.entry_at_path(Path::new("/etc/2024/03/07.md")), None);
        assert_eq!(
            paths.entry_at_path(Path::new("/tmp/journal/2024/03/notes.md")),
            None
        );
        assert_eq!(
            paths.entry_at_path(Path::new("/tmp/journal/2024/03/07.txt")),
            None
        );
        assert_eq!(
            paths.entry_at_path(Path::new("/tmp/journal/archive/2024/03/07.md")),
            None
        );
        assert_eq!(
            paths.entry_at_path(Path::new("/tmp/journal/2023/02/29.md")),
            None
        );
    }
}
