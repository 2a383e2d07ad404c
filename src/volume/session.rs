use std::{
    io,
    path::Path,
    process::{Child, ExitStatus},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};

use super::{gocryptfs::MountRequest, lock, watcher::ChangeWatcher};

/// Result of the bounded wait inside `mount`, consumed exactly once.
#[derive(Debug)]
pub(crate) enum MountOutcome {
    /// The process exited inside the grace window.
    Exited(ExitStatus),
    /// The grace window elapsed; the mount is assumed ready.
    Confirmed(ExitSubscription),
}

/// Pid of a child owned by a reaper thread.
///
/// Signals are only sent while the reaper has not collected the child, so a
/// recycled pid is never hit.
#[derive(Debug, Clone)]
pub(crate) struct ProcessHandle {
    pid: u32,
    reaped: Arc<AtomicBool>,
}

impl ProcessHandle {
    pub(crate) fn pid(&self) -> u32 {
        self.pid
    }

    pub(crate) fn is_reaped(&self) -> bool {
        self.reaped.load(Ordering::Acquire)
    }

    /// Sends SIGTERM unless the child was already collected.
    pub(crate) fn terminate(&self) {
        if self.is_reaped() {
            tracing::debug!(pid = self.pid, "gocryptfs already exited, not signalling");
            return;
        }
        terminate_pid(self.pid);
    }
}

/// Sends SIGTERM to a child that no reaper has collected yet.
pub(crate) fn terminate_pid(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        tracing::warn!(pid, "pid out of range, cannot signal gocryptfs");
        return;
    };
    if let Err(error) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        tracing::warn!(pid, %error, "failed to signal gocryptfs");
    }
}

/// A spawned mount process whose outcome has not been decided yet.
#[derive(Debug)]
pub(crate) struct PendingMount {
    process: ProcessHandle,
    exit: Receiver<io::Result<ExitStatus>>,
}

impl PendingMount {
    /// Hands `child` to a reaper thread that reports its exit status once.
    pub(crate) fn start(mut child: Child) -> io::Result<Self> {
        let pid = child.id();
        let reaped = Arc::new(AtomicBool::new(false));
        let reaper_flag = Arc::clone(&reaped);
        let (sender, exit) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name(format!("gocryptfs-{pid}"))
            .spawn(move || {
                let status = child.wait();
                reaper_flag.store(true, Ordering::Release);
                let _ = sender.send(status);
            })?;
        Ok(Self {
            process: ProcessHandle { pid, reaped },
            exit,
        })
    }

    pub(crate) fn process(&self) -> &ProcessHandle {
        &self.process
    }

    /// Waits up to `grace` for an exit; silence means success.
    pub(crate) fn resolve(self, grace: Duration) -> io::Result<MountOutcome> {
        match self.exit.recv_timeout(grace) {
            Ok(status) => status.map(MountOutcome::Exited),
            Err(RecvTimeoutError::Timeout) => Ok(MountOutcome::Confirmed(ExitSubscription {
                process: self.process,
                exit: self.exit,
            })),
            Err(RecvTimeoutError::Disconnected) => Err(io::Error::other(
                "mount process reaper exited without a status",
            )),
        }
    }
}

/// Long-lived "process exited" notification, armed only after a confirmed mount.
#[derive(Debug)]
pub(crate) struct ExitSubscription {
    process: ProcessHandle,
    exit: Receiver<io::Result<ExitStatus>>,
}

impl ExitSubscription {
    pub(crate) fn process(&self) -> &ProcessHandle {
        &self.process
    }

    /// Blocks until the mount process exits.
    pub(crate) fn wait(self) -> io::Result<ExitStatus> {
        self.exit.recv().unwrap_or_else(|_| {
            Err(io::Error::other(
                "mount process reaper exited without a status",
            ))
        })
    }
}

/// One live gocryptfs mount.
#[derive(Debug)]
pub(crate) struct MountSession {
    id: u64,
    process: ProcessHandle,
    request: MountRequest,
    closed: AtomicBool,
    unmount_requested: AtomicBool,
    watcher: Mutex<Option<ChangeWatcher>>,
    exited: Mutex<Receiver<ExitStatus>>,
}

impl MountSession {
    /// Creates a session plus the sender its exit detector reports on.
    pub(crate) fn new(
        id: u64,
        process: ProcessHandle,
        request: MountRequest,
    ) -> (Self, SyncSender<ExitStatus>) {
        let (sender, exited) = mpsc::sync_channel(1);
        let session = Self {
            id,
            process,
            request,
            closed: AtomicBool::new(false),
            unmount_requested: AtomicBool::new(false),
            watcher: Mutex::new(None),
            exited: Mutex::new(exited),
        };
        (session, sender)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn pid(&self) -> u32 {
        self.process.pid()
    }

    pub(crate) fn terminate(&self) {
        self.process.terminate();
    }

    pub(crate) fn mount_point(&self) -> &Path {
        &self.request.mount_point
    }

    pub(crate) fn request_unmount(&self) {
        self.unmount_requested.store(true, Ordering::Release);
    }

    pub(crate) fn unmount_requested(&self) -> bool {
        self.unmount_requested.load(Ordering::Acquire)
    }

    /// Returns true for the first caller only.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn set_watcher(&self, watcher: ChangeWatcher) {
        *lock(&self.watcher) = Some(watcher);
    }

    pub(crate) fn watch_directory(&self, dir: &Path) {
        if let Some(watcher) = lock(&self.watcher).as_mut() {
            watcher.watch_directory(dir);
        }
    }

    pub(crate) fn stop_watcher(&self) {
        if let Some(watcher) = lock(&self.watcher).take() {
            watcher.stop();
        }
    }

    /// Waits for the exit detector's report. `None` on timeout.
    pub(crate) fn wait_exit(&self, timeout: Duration) -> Option<ExitStatus> {
        lock(&self.exited).recv_timeout(timeout).ok()
    }
}
