use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::{ChildStdin, ExitStatus},
    sync::{
        atomic::{AtomicU64, AtomicU8, Ordering},
        mpsc::SyncSender,
        Arc, Mutex, RwLock, Weak,
    },
    thread,
    time::Duration,
};

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use super::{
    gocryptfs::{classify_exit, is_expected_termination, GocryptfsDriver, MountRequest},
    lock,
    session::{terminate_pid, ExitSubscription, MountOutcome, MountSession, PendingMount},
    watcher::{ChangeCallback, ChangeWatcher},
    VolumeAccess,
};
use crate::{
    error::{JournalError, Result},
    types::{ChangeEvent, VolumeState},
};

const DEFAULT_IDLE: Duration = Duration::from_secs(30 * 60);
const DEFAULT_GRACE_WINDOW: Duration = Duration::from_secs(3);
const DEFAULT_UNMOUNT_TIMEOUT: Duration = Duration::from_secs(3);

type UnmountCallback = Arc<dyn Fn() + Send + Sync>;

/// Paths and timings for one controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeOptions {
    /// Ciphertext directory.
    pub cipher_dir: PathBuf,
    /// Plaintext mount directory.
    pub mount_dir: PathBuf,
    /// gocryptfs idle auto-unmount duration.
    pub idle: Duration,
    /// Silence after spawn that counts as a successful mount.
    ///
    /// A gocryptfs that starts slower than this under load is reported as
    /// mounted and its later exit surfaces through `on_unmount`.
    pub grace_window: Duration,
    /// Bound on the wait for gocryptfs to exit after SIGTERM.
    pub unmount_timeout: Duration,
}

impl VolumeOptions {
    /// Options with the stock 30m idle, 3s grace window and 3s unmount timeout.
    pub fn new(cipher_dir: impl Into<PathBuf>, mount_dir: impl Into<PathBuf>) -> Self {
        let mount_dir: PathBuf = mount_dir.into();
        Self {
            cipher_dir: cipher_dir.into(),
            mount_dir: mount_dir.components().collect(),
            idle: DEFAULT_IDLE,
            grace_window: DEFAULT_GRACE_WINDOW,
            unmount_timeout: DEFAULT_UNMOUNT_TIMEOUT,
        }
    }

    /// Overrides the idle duration.
    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Overrides the grace window.
    pub fn with_grace_window(mut self, grace_window: Duration) -> Self {
        self.grace_window = grace_window;
        self
    }

    /// Overrides the unmount timeout.
    pub fn with_unmount_timeout(mut self, unmount_timeout: Duration) -> Self {
        self.unmount_timeout = unmount_timeout;
        self
    }
}

/// Single owner of the gocryptfs process and the mount state.
///
/// Cloning yields another handle to the same controller. Callbacks run on
/// background threads, never on the caller's stack.
#[derive(Clone)]
pub struct VolumeController {
    shared: Arc<Shared>,
}

struct Shared {
    driver: GocryptfsDriver,
    options: VolumeOptions,
    state: AtomicU8,
    // Serializes mount and unmount. The exit detector never takes it.
    operation: Mutex<()>,
    session: Mutex<Option<Arc<MountSession>>>,
    next_session_id: AtomicU64,
    on_unmount: RwLock<Option<UnmountCallback>>,
    on_fs_event: RwLock<Option<ChangeCallback>>,
}

impl std::fmt::Debug for VolumeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeController")
            .field("options", &self.shared.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl VolumeController {
    /// Creates an unmounted controller.
    pub fn new(driver: GocryptfsDriver, options: VolumeOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                driver,
                options,
                state: AtomicU8::new(VolumeState::Unmounted as u8),
                operation: Mutex::new(()),
                session: Mutex::new(None),
                next_session_id: AtomicU64::new(1),
                on_unmount: RwLock::new(None),
                on_fs_event: RwLock::new(None),
            }),
        }
    }

    /// Controller options.
    pub fn options(&self) -> &VolumeOptions {
        &self.shared.options
    }

    /// Current state snapshot.
    pub fn state(&self) -> VolumeState {
        self.shared.state()
    }

    /// True while a confirmed session is live.
    pub fn is_mounted(&self) -> bool {
        self.state() == VolumeState::Mounted
    }

    /// Registers the callback fired once when a confirmed session ends.
    pub fn on_unmount<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self
            .shared
            .on_unmount
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(callback));
    }

    /// Registers the callback fired for each change under the mount path.
    pub fn on_fs_event<F>(&self, callback: F)
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        *self
            .shared
            .on_fs_event
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(callback));
    }

    /// Unlocks the volume with `password`.
    ///
    /// Blocks for at most the grace window. The password is written to
    /// gocryptfs' stdin once and the buffer holding it is zeroed.
    pub fn mount(&self, password: &SecretString) -> Result<()> {
        let _operation = lock(&self.shared.operation);
        if self.state() != VolumeState::Unmounted {
            return Err(JournalError::AlreadyMounted);
        }

        self.shared.set_state(VolumeState::Mounting);
        let result = self.start_session(password);
        if result.is_err() {
            self.shared.set_state(VolumeState::Unmounted);
        }
        result
    }

    /// Locks the volume. A no-op when nothing is mounted.
    ///
    /// Sends SIGTERM, stops the watcher and waits up to the unmount timeout.
    /// The state is `Unmounted` on return even when gocryptfs did not exit.
    pub fn unmount(&self) -> Result<()> {
        let _operation = lock(&self.shared.operation);
        let Some(session) = self.shared.current_session() else {
            return Ok(());
        };
        if self.state() != VolumeState::Mounted {
            return Ok(());
        }

        self.shared.set_state(VolumeState::Unmounting);
        session.request_unmount();
        session.terminate();
        session.stop_watcher();

        match session.wait_exit(self.shared.options.unmount_timeout) {
            Some(status) if is_expected_termination(&status) => {
                tracing::debug!(%status, "gocryptfs exited after SIGTERM");
            }
            Some(status) => tracing::warn!(%status, "gocryptfs exited unexpectedly"),
            None => tracing::warn!(
                pid = session.pid(),
                "timed out waiting for gocryptfs to exit"
            ),
        }

        if self.shared.close_session(&session) {
            Shared::notify_unmount_async(&self.shared);
        }
        Ok(())
    }

    fn start_session(&self, password: &SecretString) -> Result<()> {
        let options = &self.shared.options;
        fs::create_dir_all(&options.mount_dir)?;

        let request = MountRequest {
            cipher_dir: options.cipher_dir.clone(),
            mount_point: options.mount_dir.clone(),
            idle: options.idle,
        };
        let mut child = self.shared.driver.spawn(&request)?;
        let pid = child.id();
        let stdin = child.stdin.take();
        let pending = match PendingMount::start(child) {
            Ok(pending) => pending,
            Err(error) => {
                // No reaper owns the child, so its pid cannot have been reused.
                terminate_pid(pid);
                return Err(error.into());
            }
        };
        tracing::debug!(pid, "gocryptfs started");

        if let Err(error) = write_password(stdin, password) {
            pending.process().terminate();
            return Err(error);
        }

        match pending.resolve(options.grace_window)? {
            MountOutcome::Exited(status) => {
                tracing::warn!(%status, "gocryptfs exited before the mount was confirmed");
                Err(classify_exit(status))
            }
            MountOutcome::Confirmed(subscription) => self.confirm_session(request, subscription),
        }
    }

    fn confirm_session(&self, request: MountRequest, subscription: ExitSubscription) -> Result<()> {
        let id = self.shared.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (session, exited) =
            MountSession::new(id, subscription.process().clone(), request);
        let session = Arc::new(session);
        *lock(&self.shared.session) = Some(Arc::clone(&session));
        self.shared.set_state(VolumeState::Mounted);

        match ChangeWatcher::attach(session.mount_point(), self.shared.fs_forwarder()) {
            Ok(watcher) => session.set_watcher(watcher),
            Err(error) => tracing::warn!(%error, "change watcher unavailable for this mount"),
        }

        if let Err(error) = self.arm_exit_detector(Arc::clone(&session), subscription, exited) {
            session.terminate();
            self.shared.close_session(&session);
            return Err(error.into());
        }

        tracing::info!(mount = %session.mount_point().display(), "journal mounted");
        Ok(())
    }

    fn arm_exit_detector(
        &self,
        session: Arc<MountSession>,
        subscription: ExitSubscription,
        exited: SyncSender<ExitStatus>,
    ) -> io::Result<()> {
        let shared = Arc::downgrade(&self.shared);
        thread::Builder::new()
            .name(format!("journal-mount-{}", session.id()))
            .spawn(move || {
                let status = subscription.wait();
                match &status {
                    Ok(status) if session.unmount_requested() => {
                        tracing::debug!(%status, "gocryptfs exited");
                    }
                    Ok(status) => {
                        tracing::warn!(%status, "gocryptfs exited, journal has been unmounted");
                    }
                    Err(error) => tracing::warn!(%error, "lost track of gocryptfs"),
                }

                // Release a waiting unmount before running the callback.
                if let Ok(status) = status {
                    let _ = exited.try_send(status);
                }
                if let Some(shared) = shared.upgrade() {
                    if shared.close_session(&session) {
                        shared.notify_unmount();
                    }
                }
            })
            .map(|_| ())
    }
}

impl VolumeAccess for VolumeController {
    fn is_mounted(&self) -> bool {
        VolumeController::is_mounted(self)
    }

    fn mount_path(&self) -> &Path {
        &self.shared.options.mount_dir
    }

    fn watch_directory(&self, dir: &Path) {
        if let Some(session) = self.shared.current_session() {
            session.watch_directory(dir);
        }
    }
}

impl Shared {
    fn state(&self) -> VolumeState {
        VolumeState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: VolumeState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn current_session(&self) -> Option<Arc<MountSession>> {
        lock(&self.session).clone()
    }

    // Every caller leaves the slot cleared. Only the first caller per session
    // gets true and delivers the notification.
    fn close_session(&self, session: &MountSession) -> bool {
        {
            let mut slot = lock(&self.session);
            if slot.as_ref().is_some_and(|current| current.id() == session.id()) {
                *slot = None;
                self.set_state(VolumeState::Unmounted);
            }
        }
        session.stop_watcher();
        session.mark_closed()
    }

    fn notify_unmount(&self) {
        let callback = self
            .on_unmount
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn notify_unmount_async(shared: &Arc<Self>) {
        let shared = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name("journal-unmounted".to_owned())
            .spawn(move || shared.notify_unmount());
        if let Err(error) = spawned {
            tracing::warn!(%error, "failed to deliver unmount notification");
        }
    }

    fn fs_forwarder(self: &Arc<Self>) -> ChangeCallback {
        let shared: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |event: ChangeEvent| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let callback = shared
                .on_fs_event
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone();
            if let Some(callback) = callback {
                callback(event);
            }
        })
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(session) = session {
            session.request_unmount();
            session.stop_watcher();
            session.terminate();
        }
    }
}

fn write_password(stdin: Option<ChildStdin>, password: &SecretString) -> Result<()> {
    let Some(mut stdin) = stdin else {
        return Err(JournalError::Io(io::Error::other(
            "gocryptfs stdin was not captured",
        )));
    };

    let secret = password.expose_secret().as_bytes();
    let mut line = Zeroizing::new(Vec::with_capacity(secret.len() + 1));
    line.extend_from_slice(secret);
    line.push(b'\n');

    // A closed pipe means gocryptfs already exited; the outcome wait classifies it.
    match stdin.write_all(&line) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(error) => Err(error.into()),
    }
}
