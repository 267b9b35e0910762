//! Out-of-band event delivery to the host.
//!
//! [`EventStreamBridge`] manages the three push-only channels the host can
//! subscribe to: `error`, `result` and `partial`.  Each channel holds at most
//! one subscriber; attaching replaces any previous subscriber, detaching
//! empties the slot, and emitting with no subscriber drops the event — these
//! are live streams, not queues, and nothing is buffered or replayed.
//!
//! Decoder callbacks arrive as one tagged [`DecoderEvent`] and are routed by
//! [`EventStreamBridge::dispatch`]:
//!
//! | Event           | Channel(s)                       |
//! |-----------------|----------------------------------|
//! | `Partial`       | partial                          |
//! | `Result`        | result                           |
//! | `Final`         | result                           |
//! | `Error`         | error, result AND partial        |
//! | `Timeout`       | none (deliberate no-op)          |
//!
//! The bridge is shared with the listening-session capture thread, so the
//! subscriber slots sit behind mutexes; per-channel emission order follows
//! lock order, which is emission order on each channel.

use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

// ---------------------------------------------------------------------------
// DecoderEvent
// ---------------------------------------------------------------------------

/// A callback raised by the decoder, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    /// In-progress partial hypothesis (JSON).
    Partial(String),
    /// Incremental result for a completed utterance segment (JSON).
    Result(String),
    /// Finalized transcript, flushing buffered audio (JSON).
    Final(String),
    /// Decoder-level fault.
    Error { code: String, message: String },
    /// Silence timeout.  Defined by the decoder interface but intentionally
    /// produces no event on any channel.
    Timeout,
}

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// What a subscriber actually receives.
///
/// Transcript payloads carry the engine's JSON string untouched; error
/// payloads carry a stable code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EventPayload {
    Transcript { json: String },
    Error { code: String, message: String },
}

/// Subscriber endpoint for one channel.
pub type Subscriber = UnboundedSender<EventPayload>;

// ---------------------------------------------------------------------------
// EventChannel / ChannelKind
// ---------------------------------------------------------------------------

/// Names the three subscription channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Error,
    Result,
    Partial,
}

/// One attach/detach slot.  Not a queue: an emit with an empty slot is lost.
#[derive(Default)]
struct EventChannel {
    subscriber: Mutex<Option<Subscriber>>,
}

impl EventChannel {
    /// Replace whatever subscriber was attached before (last-attach-wins).
    fn attach(&self, subscriber: Subscriber) {
        *self.subscriber.lock().unwrap() = Some(subscriber);
    }

    fn detach(&self) {
        *self.subscriber.lock().unwrap() = None;
    }

    /// Deliver `payload` to the current subscriber, if any.
    ///
    /// A subscriber whose receiver has been dropped counts as unattached;
    /// the send error is ignored rather than surfaced.
    fn emit(&self, payload: EventPayload) {
        if let Some(tx) = self.subscriber.lock().unwrap().as_ref() {
            let _ = tx.send(payload);
        }
    }
}

// ---------------------------------------------------------------------------
// EventStreamBridge
// ---------------------------------------------------------------------------

/// The three independent subscription channels.
#[derive(Default)]
pub struct EventStreamBridge {
    error: EventChannel,
    result: EventChannel,
    partial: EventChannel,
}

impl EventStreamBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, kind: ChannelKind) -> &EventChannel {
        match kind {
            ChannelKind::Error => &self.error,
            ChannelKind::Result => &self.result,
            ChannelKind::Partial => &self.partial,
        }
    }

    /// Attach `subscriber` to `kind`, replacing any previous subscriber.
    pub fn attach(&self, kind: ChannelKind, subscriber: Subscriber) {
        self.channel(kind).attach(subscriber);
    }

    /// Empty the slot for `kind`.
    pub fn detach(&self, kind: ChannelKind) {
        self.channel(kind).detach();
    }

    /// Detach all three channels.
    pub fn detach_all(&self) {
        self.error.detach();
        self.result.detach();
        self.partial.detach();
    }

    /// Route one decoder callback to its channel(s).
    pub fn dispatch(&self, event: DecoderEvent) {
        match event {
            DecoderEvent::Partial(json) => {
                self.partial.emit(EventPayload::Transcript { json });
            }
            DecoderEvent::Result(json) | DecoderEvent::Final(json) => {
                self.result.emit(EventPayload::Transcript { json });
            }
            DecoderEvent::Error { code, message } => {
                // A fault can strike whichever channel is conceptually "in
                // progress", so every attached subscriber hears about it.
                let payload = EventPayload::Error { code, message };
                self.error.emit(payload.clone());
                self.result.emit(payload.clone());
                self.partial.emit(payload);
            }
            DecoderEvent::Timeout => {
                // Explicit no-op.
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
