use std::io;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::{
    bridge::{BridgeEvent, EventBridge},
    config::{LoggingSettings, LOG_ENV_VAR},
    error::{JournalError, Result},
    fs_secure::ensure_dir_with_mode,
};

/// File name inside the log directory.
pub const LOG_FILE_NAME: &str = "journal.log";
const LOG_DIR_MODE: u32 = 0o700;

/// Installs the global subscriber.
///
/// Events always go to `<dir>/journal.log`. With a bridge they are also
/// posted to the UI's log panel; without one they go to stderr. Keep the
/// returned guard alive until exit so buffered lines reach the file.
pub fn init_logging(settings: &LoggingSettings, panel: Option<EventBridge>) -> Result<WorkerGuard> {
    ensure_dir_with_mode(&settings.dir, LOG_DIR_MODE)?;
    let appender = tracing_appender::rolling::never(&settings.dir, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = match EnvFilter::try_from_env(LOG_ENV_VAR) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.level).map_err(|error| {
            JournalError::InvalidInput(format!("invalid logging.level: {error}"))
        })?,
    };

    let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
    let (panel_layer, stderr_layer) = match panel {
        Some(bridge) => (
            Some(
                fmt::layer()
                    .with_writer(PanelWriter { bridge })
                    .with_ansi(false)
                    .with_target(false)
                    .without_time(),
            ),
            None,
        ),
        None => (
            None,
            Some(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(false)
                    .without_time(),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(panel_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|error| JournalError::InvalidInput(format!("logging setup failed: {error}")))?;

    tracing::debug!(dir = %settings.dir.display(), "logging initialized");
    Ok(guard)
}

/// Splits formatted events into lines and posts them as [`BridgeEvent::Log`].
#[derive(Debug, Clone)]
pub struct PanelWriter {
    bridge: EventBridge,
}

impl PanelWriter {
    /// Writer posting through `bridge`.
    pub fn new(bridge: EventBridge) -> Self {
        Self { bridge }
    }
}

impl io::Write for PanelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        for line in text.trim_end_matches('\n').split('\n') {
            self.bridge.post(BridgeEvent::Log(line.to_owned()));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for PanelWriter {
    type Writer = PanelWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
