//! Message passing from background threads into the UI loop.
//!
//! Background producers (the mount exit detector, the change watcher, the tag
//! refresh ticker and the log writer) never touch UI state. They enqueue a
//! [`BridgeEvent`] and the UI thread applies it when it next pulls from its
//! queue.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    thread,
    time::Duration,
};

use crossterm::event::Event as InputEvent;

use crate::types::ChangeEvent;

/// Marker consumed by the UI loop.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// Redraw request; coalesced while one is pending.
    Wake,
    /// The mount session ended.
    Unmounted,
    /// A file changed under the mount path.
    FsChange(ChangeEvent),
    /// The tag list should be re-queried.
    RefreshTags,
    /// One formatted log line for the log panel.
    Log(String),
    /// Terminal input forwarded by the input reader thread.
    Input(InputEvent),
}

/// Thread-safe "inject synthetic event" primitive supplied by the UI layer.
pub trait EventSink: Send + Sync {
    /// Enqueues one event without blocking. Returns false when the UI is gone.
    fn inject(&self, event: BridgeEvent) -> bool;
}

/// [`EventSink`] backed by an unbounded `mpsc` channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<BridgeEvent>,
}

impl ChannelSink {
    /// Creates a sink and the receiver the UI loop blocks on.
    pub fn new() -> (Self, Receiver<BridgeEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn inject(&self, event: BridgeEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Cloneable handle background threads use to reach the UI loop.
#[derive(Clone)]
pub struct EventBridge {
    sink: Arc<dyn EventSink>,
    wake_pending: Arc<AtomicBool>,
}

impl fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBridge")
            .field("wake_pending", &self.wake_pending.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventBridge {
    /// Wraps a UI-supplied sink.
    pub fn new(sink: impl EventSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
            wake_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Convenience constructor over a [`ChannelSink`].
    pub fn channel() -> (Self, Receiver<BridgeEvent>) {
        let (sink, receiver) = ChannelSink::new();
        (Self::new(sink), receiver)
    }

    /// Requests a redraw. Non-blocking; calls made while a wake is pending collapse into it.
    pub fn post_wake(&self) {
        if self.wake_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        if !self.sink.inject(BridgeEvent::Wake) {
            self.wake_pending.store(false, Ordering::Release);
        }
    }

    /// Enqueues a marker for the UI thread. Wake markers go through [`Self::post_wake`].
    pub fn post(&self, event: BridgeEvent) -> bool {
        if matches!(event, BridgeEvent::Wake) {
            self.post_wake();
            return true;
        }
        self.sink.inject(event)
    }

    /// Called by the UI thread after it consumed a [`BridgeEvent::Wake`].
    pub fn acknowledge_wake(&self) {
        self.wake_pending.store(false, Ordering::Release);
    }

    /// Starts a detached ticker that posts `event()` every `period` until `stop` is set.
    pub fn spawn_ticker<F>(&self, period: Duration, stop: Arc<AtomicBool>, event: F)
    where
        F: Fn() -> BridgeEvent + Send + 'static,
    {
        let bridge = self.clone();
        let spawned = thread::Builder::new()
            .name("journal-ticker".to_owned())
            .spawn(move || loop {
                thread::sleep(period);
                if stop.load(Ordering::Acquire) || !bridge.post(event()) {
                    break;
                }
            });
        if let Err(error) = spawned {
            tracing::warn!(%error, "failed to start ticker thread");
        }
    }
}
