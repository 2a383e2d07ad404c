#![cfg(unix)]

mod common;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use common::{wait_for, FakeGocryptfs, FakeMount, GOOD_PASSWORD};
use journal::{
    error::JournalError,
    types::{ChangeEvent, VolumeState},
    volume::{GocryptfsDriver, VolumeAccess, VolumeController, VolumeOptions},
};
use secrecy::SecretString;

const GRACE: Duration = Duration::from_millis(300);

struct Fixture {
    _temp: tempfile::TempDir,
    fake: FakeGocryptfs,
    cipher_dir: PathBuf,
    mount_dir: PathBuf,
    controller: VolumeController,
    unmounts: Arc<AtomicUsize>,
}

fn fixture(behavior: FakeMount) -> Fixture {
    fixture_with(behavior, |options| options)
}

fn fixture_with(
    behavior: FakeMount,
    configure: impl FnOnce(VolumeOptions) -> VolumeOptions,
) -> Fixture {
    let temp = tempfile::tempdir().unwrap();
    let fake = FakeGocryptfs::install(temp.path(), behavior);
    let cipher_dir = temp.path().join("cipher");
    let mount_dir = temp.path().join("mnt");
    fs::create_dir_all(&cipher_dir).unwrap();

    let options = VolumeOptions::new(&cipher_dir, &mount_dir)
        .with_grace_window(GRACE)
        .with_unmount_timeout(Duration::from_secs(2));
    let controller = VolumeController::new(
        GocryptfsDriver::with_binary(fake.binary_str()),
        configure(options),
    );
    let unmounts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&unmounts);
    controller.on_unmount(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    Fixture {
        _temp: temp,
        fake,
        cipher_dir,
        mount_dir,
        controller,
        unmounts,
    }
}

fn password(value: &str) -> SecretString {
    SecretString::new(value.to_owned())
}

fn settle() {
    std::thread::sleep(Duration::from_millis(200));
}

#[test]
fn mount_with_correct_password_reports_mounted() {
    let fixture = fixture(FakeMount::Serve);
    fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap();

    assert!(fixture.controller.is_mounted());
    assert_eq!(fixture.controller.state(), VolumeState::Mounted);
    assert!(fixture.mount_dir.is_dir());

    let invocations = fixture.fake.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(
        invocations[0],
        format!(
            "-fg -q -idle 1800s {} {}",
            fixture.cipher_dir.display(),
            fixture.mount_dir.display()
        )
    );
    assert_eq!(
        fs::read_to_string(&fixture.fake.password_log).unwrap(),
        GOOD_PASSWORD
    );

    fixture.controller.unmount().unwrap();
}

#[test]
fn mount_passes_configured_idle() {
    let fixture = fixture_with(FakeMount::Serve, |options| {
        options.with_idle(Duration::from_secs(15 * 60))
    });
    fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap();
    assert!(fixture.fake.invocations()[0].contains("-idle 900s"));
    fixture.controller.unmount().unwrap();
}

#[test]
fn wrong_password_is_authentication_failure() {
    let fixture = fixture(FakeMount::Serve);
    let error = fixture.controller.mount(&password("nope")).unwrap_err();

    assert!(matches!(error, JournalError::AuthenticationFailure));
    assert!(!fixture.controller.is_mounted());
    assert_eq!(fixture.controller.state(), VolumeState::Unmounted);
    settle();
    assert_eq!(fixture.unmounts.load(Ordering::SeqCst), 0);
}

#[test]
fn non_empty_destination_is_reported() {
    let fixture = fixture(FakeMount::ExitWith(10));
    let error = fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap_err();
    assert!(matches!(error, JournalError::DestinationNotEmpty));
    assert!(!fixture.controller.is_mounted());
}

#[test]
fn other_early_exit_is_mount_failure() {
    let fixture = fixture(FakeMount::ExitWith(7));
    let error = fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap_err();
    assert!(matches!(error, JournalError::MountFailed { .. }));
    assert!(!fixture.controller.is_mounted());
}

#[test]
fn failed_mount_can_be_retried() {
    let fixture = fixture(FakeMount::Serve);
    assert!(fixture.controller.mount(&password("nope")).is_err());
    fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap();
    assert!(fixture.controller.is_mounted());
    assert_eq!(fixture.fake.invocations().len(), 2);
    fixture.controller.unmount().unwrap();
}

#[test]
fn second_mount_is_rejected_without_spawning() {
    let fixture = fixture(FakeMount::Serve);
    fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap();

    let error = fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap_err();
    assert!(matches!(error, JournalError::AlreadyMounted));
    assert_eq!(fixture.fake.invocations().len(), 1);
    assert!(fixture.controller.is_mounted());

    fixture.controller.unmount().unwrap();
}

#[test]
fn unmount_terminates_and_notifies_once() {
    let fixture = fixture(FakeMount::Serve);
    fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap();
    fixture.controller.unmount().unwrap();

    assert!(!fixture.controller.is_mounted());
    assert_eq!(fixture.controller.state(), VolumeState::Unmounted);
    assert!(fixture.fake.was_terminated());
    assert!(wait_for(|| fixture.unmounts.load(Ordering::SeqCst) == 1));
    settle();
    assert_eq!(fixture.unmounts.load(Ordering::SeqCst), 1);
}

#[test]
fn unmount_while_unmounted_is_a_no_op() {
    let fixture = fixture(FakeMount::Serve);
    fixture.controller.unmount().unwrap();

    assert!(fixture.fake.invocations().is_empty());
    assert!(!fixture.fake.was_terminated());
    settle();
    assert_eq!(fixture.unmounts.load(Ordering::SeqCst), 0);
}

#[test]
fn unmount_twice_notifies_once() {
    let fixture = fixture(FakeMount::Serve);
    fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap();
    fixture.controller.unmount().unwrap();
    fixture.controller.unmount().unwrap();

    assert!(wait_for(|| fixture.unmounts.load(Ordering::SeqCst) == 1));
    settle();
    assert_eq!(fixture.unmounts.load(Ordering::SeqCst), 1);
}

#[test]
fn slow_unmount_callback_does_not_delay_unmount() {
    let fixture = fixture_with(FakeMount::Serve, |options| {
        options.with_unmount_timeout(Duration::from_secs(5))
    });
    let finished = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&finished);
    fixture.controller.on_unmount(move || {
        std::thread::sleep(Duration::from_secs(2));
        counter.fetch_add(1, Ordering::SeqCst);
    });
    fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap();

    let started = Instant::now();
    fixture.controller.unmount().unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(1), "unmount took {elapsed:?}");
    assert_eq!(fixture.controller.state(), VolumeState::Unmounted);
    assert!(fixture.fake.was_terminated());

    std::thread::sleep(Duration::from_millis(2500));
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
fn mount_closes_stdin_after_password() {
    let fixture = fixture(FakeMount::Serve);
    fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap();

    assert!(wait_for(|| fixture.fake.stdin_state().is_some()));
    assert_eq!(fixture.fake.stdin_state().as_deref(), Some("eof"));

    fixture.controller.unmount().unwrap();
}

#[test]
fn unexpected_exit_after_confirmation_unmounts_and_notifies_once() {
    let fixture = fixture(FakeMount::CrashAfter(Duration::from_millis(700)));
    fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap();
    assert!(fixture.controller.is_mounted());

    assert!(wait_for(|| !fixture.controller.is_mounted()));
    assert!(wait_for(|| fixture.unmounts.load(Ordering::SeqCst) == 1));
    assert_eq!(fixture.controller.state(), VolumeState::Unmounted);

    fixture.controller.unmount().unwrap();
    settle();
    assert_eq!(fixture.unmounts.load(Ordering::SeqCst), 1);
    assert!(!fixture.fake.was_terminated());
}

#[test]
fn unmount_timeout_still_reports_unmounted() {
    let fixture = fixture_with(FakeMount::IgnoreTerm, |options| {
        options.with_unmount_timeout(Duration::from_millis(300))
    });
    fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap();

    fixture.controller.unmount().unwrap();
    assert!(!fixture.controller.is_mounted());
    assert!(wait_for(|| fixture.fake.was_terminated()));
    assert!(wait_for(|| fixture.unmounts.load(Ordering::SeqCst) == 1));

    // The stubborn process exits on its own a little later.
    std::thread::sleep(Duration::from_secs(3));
    assert_eq!(fixture.unmounts.load(Ordering::SeqCst), 1);
}

#[test]
fn remount_after_unmount_starts_a_new_process() {
    let fixture = fixture(FakeMount::Serve);
    fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap();
    fixture.controller.unmount().unwrap();
    fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap();

    assert!(fixture.controller.is_mounted());
    assert_eq!(fixture.fake.invocations().len(), 2);
    fixture.controller.unmount().unwrap();
    assert!(wait_for(|| fixture.unmounts.load(Ordering::SeqCst) == 2));
}

#[test]
fn missing_binary_is_reported_and_state_resets() {
    let temp = tempfile::tempdir().unwrap();
    let controller = VolumeController::new(
        GocryptfsDriver::with_binary(
            temp.path()
                .join("missing-gocryptfs")
                .to_string_lossy()
                .to_string(),
        ),
        VolumeOptions::new(temp.path().join("cipher"), temp.path().join("mnt"))
            .with_grace_window(GRACE),
    );

    let error = controller.mount(&password(GOOD_PASSWORD)).unwrap_err();
    match error {
        JournalError::ExternalTool { message, .. } => {
            assert!(message.contains("required binary not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(controller.state(), VolumeState::Unmounted);
}

fn events_for(events: &Mutex<Vec<ChangeEvent>>, name: &str) -> usize {
    events
        .lock()
        .unwrap()
        .iter()
        .filter(|event| event.path.file_name() == Some(Path::new(name).as_os_str()))
        .count()
}

#[test]
fn change_events_flow_only_while_mounted() {
    let fixture = fixture(FakeMount::Serve);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    fixture.controller.on_fs_event(move |event| {
        sink.lock().unwrap().push(event);
    });

    fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap();
    fs::write(fixture.mount_dir.join("07.md"), "# entry\n").unwrap();
    assert!(wait_for(|| events_for(&events, "07.md") > 0));

    fixture.controller.unmount().unwrap();
    fs::write(fixture.mount_dir.join("08.md"), "# late\n").unwrap();
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(events_for(&events, "08.md"), 0);
}

#[test]
fn directories_created_after_mount_are_watched() {
    let fixture = fixture(FakeMount::Serve);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    fixture.controller.on_fs_event(move |event| {
        sink.lock().unwrap().push(event);
    });

    fixture.controller.mount(&password(GOOD_PASSWORD)).unwrap();
    let month_dir = fixture.mount_dir.join("2024").join("03");
    fs::create_dir_all(&month_dir).unwrap();
    fixture.controller.watch_directory(&month_dir);
    fs::write(month_dir.join("09.md"), "# nested\n").unwrap();
    assert!(wait_for(|| events_for(&events, "09.md") > 0));

    fixture.controller.unmount().unwrap();
}

#[test]
fn volume_access_reports_mount_path() {
    let fixture = fixture(FakeMount::Serve);
    assert_eq!(
        VolumeAccess::mount_path(&fixture.controller),
        fixture.mount_dir.as_path()
    );
    assert!(!VolumeAccess::is_mounted(&fixture.controller));
}
