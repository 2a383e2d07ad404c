use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use notify::{event::ModifyKind, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::{
    error::{JournalError, Result},
    types::{ChangeEvent, ChangeKind},
};

/// Callback receiving every forwarded change.
pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Recursive filesystem observer attached to a live mount.
///
/// Dropping or [stopping](Self::stop) the watcher releases the OS handle.
/// Events already queued in notify's thread when `stop` runs are discarded.
pub struct ChangeWatcher {
    watcher: RecommendedWatcher,
    active: Arc<AtomicBool>,
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ChangeWatcher {
    /// Starts watching `root` recursively.
    pub fn attach(root: &Path, callback: ChangeCallback) -> Result<Self> {
        let active = Arc::new(AtomicBool::new(true));
        let forwarding = Arc::clone(&active);
        let mut watcher = RecommendedWatcher::new(
            move |result: std::result::Result<Event, notify::Error>| {
                let event = match result {
                    Ok(event) => event,
                    Err(error) => {
                        tracing::debug!(%error, "watch error");
                        return;
                    }
                };
                let Some(kind) = change_kind(&event.kind) else {
                    return;
                };
                for path in event.paths {
                    if !forwarding.load(Ordering::Acquire) {
                        return;
                    }
                    callback(ChangeEvent { path, kind });
                }
            },
            notify::Config::default(),
        )
        .map_err(watch_error)?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(watch_error)?;
        tracing::debug!(root = %root.display(), "change watcher attached");
        Ok(Self { watcher, active })
    }

    /// Adds a directory created after attach. Failures are logged.
    pub fn watch_directory(&mut self, dir: &Path) {
        if let Err(error) = self.watcher.watch(dir, RecursiveMode::Recursive) {
            tracing::warn!(dir = %dir.display(), %error, "failed to watch directory");
        }
    }

    /// Stops forwarding and releases the watch handle.
    pub fn stop(self) {
        self.active.store(false, Ordering::Release);
        drop(self.watcher);
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Create),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Rename),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Write),
        EventKind::Remove(_) => Some(ChangeKind::Remove),
        _ => None,
    }
}

fn watch_error(error: notify::Error) -> JournalError {
    match error.kind {
        notify::ErrorKind::Io(io) => JournalError::Io(io),
        other => JournalError::Io(std::io::Error::other(format!("{other:?}"))),
    }
}
