//! Encrypted volume supervision.
//!
//! [`VolumeController`] owns the gocryptfs process, the mount state and the
//! change watcher for one cipher directory.

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

/// Mount state machine and callbacks.
pub mod controller;
/// gocryptfs process contract.
pub mod gocryptfs;
mod session;
/// Recursive change observation.
pub mod watcher;

pub use controller::{VolumeController, VolumeOptions};
pub use gocryptfs::{GocryptfsDriver, MountRequest, MIN_GOCRYPTFS_VERSION};
pub use watcher::ChangeWatcher;

/// What entry storage needs from the volume owner.
pub trait VolumeAccess: Send + Sync {
    /// Snapshot of the mount state. Never blocks.
    fn is_mounted(&self) -> bool;
    /// Plaintext mount path.
    fn mount_path(&self) -> &Path;
    /// Registers a directory created after the mount with the change watcher.
    fn watch_directory(&self, dir: &Path);
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
