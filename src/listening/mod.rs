//! Continuous-listening session: one recognizer bound to a live capture loop.
//!
//! # Lifecycle
//!
//! ```text
//! absent ──init──▶ Initializing ──start──▶ Listening ⇄ Paused (setPause)
//!                                              │
//!                       stop / cancel ─────────┴──▶ Stopped
//!                       destroy (any state) ──▶ session dropped
//! ```
//!
//! At most one session exists per controller; a second `init` without an
//! intervening `destroy` is rejected upstream so a running capture loop can
//! never be silently orphaned.
//!
//! The capture loop runs on its own thread: it pulls chunks from the
//! [`AudioSource`], feeds the bound recognizer under its mutex, and pushes
//! [`DecoderEvent`]s through the shared [`EventStreamBridge`].  `stop`
//! flushes a final transcript; `cancel` and `destroy` do not.  Destroy
//! releases the capture loop unconditionally — it forgets the recognizer
//! reference but never closes the recognizer itself, which stays addressable
//! in the registry.

pub mod source;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::events::{DecoderEvent, EventStreamBridge};
use crate::registry::SharedRecognizer;

pub use source::{AudioSource, CaptureError, CpalSource};

#[cfg(test)]
pub use source::ScriptedSource;

/// Error code attached to decoder faults surfaced on the event channels.
const RECOGNITION_ERROR: &str = "RECOGNITION_ERROR";

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Observable state of a listening session.  "absent" is represented by the
/// controller holding no session at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created; capture loop not yet started.
    Initializing,
    /// Capture loop running and feeding the recognizer.
    Listening,
    /// Capture loop running but discarding audio.
    Paused,
    /// Capture loop has ended (stop, cancel, or source exhausted).
    Stopped,
}

// ---------------------------------------------------------------------------
// ListeningSession
// ---------------------------------------------------------------------------

/// One active continuous-capture cycle bound to one recognizer.
pub struct ListeningSession {
    recognizer_id: u32,
    recognizer: SharedRecognizer,
    bridge: Arc<EventStreamBridge>,
    /// Present until `start` consumes it.
    audio_source: Option<Box<dyn AudioSource>>,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ListeningSession {
    /// Bind `recognizer` to `audio_source`.  The capture loop does not run
    /// until [`start`](Self::start).
    pub fn new(
        recognizer_id: u32,
        recognizer: SharedRecognizer,
        bridge: Arc<EventStreamBridge>,
        audio_source: Box<dyn AudioSource>,
    ) -> Self {
        Self {
            recognizer_id,
            recognizer,
            bridge,
            audio_source: Some(audio_source),
            running: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Id of the bound recognizer.
    pub fn recognizer_id(&self) -> u32 {
        self.recognizer_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        if self.worker.is_none() {
            if self.audio_source.is_some() {
                SessionState::Initializing
            } else {
                SessionState::Stopped
            }
        } else if !self.running.load(Ordering::Acquire) {
            SessionState::Stopped
        } else if self.paused.load(Ordering::Acquire) {
            SessionState::Paused
        } else {
            SessionState::Listening
        }
    }

    /// Start the capture loop.
    ///
    /// Returns `true` when the loop was started, `false` when it is already
    /// running or the session has been stopped.
    pub fn start(&mut self) -> bool {
        let Some(mut source) = self.audio_source.take() else {
            return false;
        };

        self.running.store(true, Ordering::Release);
        self.paused.store(false, Ordering::Release);

        let recognizer = Arc::clone(&self.recognizer);
        let bridge = Arc::clone(&self.bridge);
        let running = Arc::clone(&self.running);
        let paused = Arc::clone(&self.paused);
        let cancelled = Arc::clone(&self.cancelled);
        let id = self.recognizer_id;

        let worker = thread::Builder::new()
            .name("capture-loop".into())
            .spawn(move || {
                log::debug!("listening: capture loop started (recognizer {id})");
                capture_loop(&mut *source, &recognizer, &bridge, &running, &paused, &cancelled);
                running.store(false, Ordering::Release);
                log::debug!("listening: capture loop finished (recognizer {id})");
            })
            .expect("failed to spawn capture-loop thread");

        self.worker = Some(worker);
        true
    }

    /// Pause (`true`) or resume (`false`) audio feeding.
    ///
    /// While paused the loop keeps draining the device but discards every
    /// chunk, so resume picks up with fresh audio.
    pub fn set_pause(&mut self, pause: bool) {
        self.paused.store(pause, Ordering::Release);
    }

    /// Clear the bound recognizer's decoding state without leaving the
    /// listening state.
    pub fn reset(&mut self) {
        if let Ok(mut rec) = self.recognizer.lock() {
            if let Err(e) = rec.reset() {
                log::warn!("listening: recognizer reset failed: {e}");
            }
        }
    }

    /// Stop gracefully: end the loop and flush a final transcript to the
    /// result channel.  Returns `true` when a running loop was stopped.
    pub fn stop(&mut self) -> bool {
        self.end_loop(false)
    }

    /// Abort the loop without flushing a final transcript.
    pub fn cancel(&mut self) -> bool {
        self.end_loop(true)
    }

    fn end_loop(&mut self, cancel: bool) -> bool {
        if cancel {
            self.cancelled.store(true, Ordering::Release);
        }
        let was_running = self.running.swap(false, Ordering::AcqRel);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        was_running
    }
}

impl Drop for ListeningSession {
    fn drop(&mut self) {
        // Destroy path: release the capture loop unconditionally, with no
        // final-result flush.  The recognizer itself is left untouched.
        self.end_loop(true);
    }
}

// ---------------------------------------------------------------------------
// Capture loop
// ---------------------------------------------------------------------------

fn capture_loop(
    source: &mut dyn AudioSource,
    recognizer: &SharedRecognizer,
    bridge: &EventStreamBridge,
    running: &AtomicBool,
    paused: &AtomicBool,
    cancelled: &AtomicBool,
) {
    while running.load(Ordering::Acquire) {
        let chunk = match source.read_chunk() {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break, // source exhausted
            Err(e) => {
                bridge.dispatch(DecoderEvent::Error {
                    code: RECOGNITION_ERROR.into(),
                    message: e.to_string(),
                });
                return;
            }
        };

        if chunk.is_empty() || paused.load(Ordering::Acquire) {
            continue;
        }

        let event = {
            let mut rec = match recognizer.lock() {
                Ok(rec) => rec,
                Err(_) => {
                    bridge.dispatch(DecoderEvent::Error {
                        code: RECOGNITION_ERROR.into(),
                        message: "recognizer lock poisoned".into(),
                    });
                    return;
                }
            };

            match rec.accept_floats(&chunk) {
                Ok(true) => rec.result().map(DecoderEvent::Result),
                Ok(false) => rec.partial_result().map(DecoderEvent::Partial),
                Err(e) => Err(e),
            }
        };

        match event {
            Ok(event) => bridge.dispatch(event),
            Err(e) => {
                bridge.dispatch(DecoderEvent::Error {
                    code: RECOGNITION_ERROR.into(),
                    message: e.to_string(),
                });
                return;
            }
        }
    }

    // Graceful end (stop command or source exhausted): flush the final
    // transcript unless the session was cancelled.
    if !cancelled.load(Ordering::Acquire) {
        if let Ok(mut rec) = recognizer.lock() {
            match rec.final_result() {
                Ok(json) => bridge.dispatch(DecoderEvent::Final(json)),
                Err(e) => bridge.dispatch(DecoderEvent::Error {
                    code: RECOGNITION_ERROR.into(),
                    message: e.to_string(),
                }),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MockEngine, SpeechEngine};
    use crate::events::{ChannelKind, EventPayload};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;

    fn make_session(
        engine: &MockEngine,
        source: ScriptedSource,
    ) -> (ListeningSession, Arc<EventStreamBridge>) {
        let model = engine.load_model("/m").unwrap();
        let rec = engine.create_recognizer(model, 16_000.0, None).unwrap();
        let shared: SharedRecognizer = Arc::new(Mutex::new(rec));
        let bridge = Arc::new(EventStreamBridge::new());
        let session = ListeningSession::new(1, shared, Arc::clone(&bridge), Box::new(source));
        (session, bridge)
    }

    fn wait_for_loop_end(session: &ListeningSession) {
        for _ in 0..100 {
            if session.state() == SessionState::Stopped {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("capture loop did not finish");
    }

    #[test]
    fn new_session_is_initializing() {
        let engine = MockEngine::new();
        let (session, _) = make_session(&engine, ScriptedSource::silence(1, 8));
        assert_eq!(session.state(), SessionState::Initializing);
        assert_eq!(session.recognizer_id(), 1);
    }

    #[test]
    fn start_runs_loop_and_emits_partials_then_final() {
        let engine = MockEngine::new();
        let (mut session, bridge) = make_session(&engine, ScriptedSource::silence(3, 8));

        let (partial_tx, mut partial_rx) = unbounded_channel();
        let (result_tx, mut result_rx) = unbounded_channel();
        bridge.attach(ChannelKind::Partial, partial_tx);
        bridge.attach(ChannelKind::Result, result_tx);

        assert!(session.start());
        wait_for_loop_end(&session);

        // Three silence chunks with endpoint=false → three partials, and the
        // graceful end flushes one final on the result channel.
        let mut partials = 0;
        while partial_rx.try_recv().is_ok() {
            partials += 1;
        }
        assert_eq!(partials, 3);
        assert!(matches!(
            result_rx.try_recv().unwrap(),
            EventPayload::Transcript { .. }
        ));
    }

    #[test]
    fn endpoint_chunks_emit_results() {
        let mut engine = MockEngine::new();
        engine.endpoint = true;
        let (mut session, bridge) = make_session(&engine, ScriptedSource::silence(2, 8));

        let (result_tx, mut result_rx) = unbounded_channel();
        bridge.attach(ChannelKind::Result, result_tx);

        session.start();
        wait_for_loop_end(&session);

        // Two endpoint results + one final.
        let mut results = 0;
        while result_rx.try_recv().is_ok() {
            results += 1;
        }
        assert_eq!(results, 3);
    }

    #[test]
    fn start_twice_returns_false() {
        let engine = MockEngine::new();
        let mut source = ScriptedSource::silence(50, 8);
        source.chunk_delay = Duration::from_millis(5);
        let (mut session, _bridge) = make_session(&engine, source);

        assert!(session.start());
        assert!(!session.start());
        session.cancel();
    }

    #[test]
    fn pause_discards_audio_until_resumed() {
        let engine = MockEngine::new();
        let mut source = ScriptedSource::silence(20, 8);
        source.chunk_delay = Duration::from_millis(5);
        let (mut session, bridge) = make_session(&engine, source);

        let (partial_tx, mut partial_rx) = unbounded_channel();
        bridge.attach(ChannelKind::Partial, partial_tx);

        session.start();
        session.set_pause(true);
        assert_eq!(session.state(), SessionState::Paused);

        // Let several chunks pass while paused, then drain whatever was
        // emitted before the pause took effect.
        thread::sleep(Duration::from_millis(40));
        while partial_rx.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(30));
        assert!(partial_rx.try_recv().is_err(), "paused loop still emitted");

        session.set_pause(false);
        assert_eq!(session.state(), SessionState::Listening);
        session.cancel();
    }

    #[test]
    fn stop_flushes_final_cancel_does_not() {
        // stop
        let engine = MockEngine::new();
        let mut source = ScriptedSource::silence(1000, 8);
        source.chunk_delay = Duration::from_millis(2);
        let (mut session, bridge) = make_session(&engine, source);
        let (result_tx, mut result_rx) = unbounded_channel();
        bridge.attach(ChannelKind::Result, result_tx);

        session.start();
        thread::sleep(Duration::from_millis(10));
        assert!(session.stop());
        let mut saw_final = false;
        while let Ok(payload) = result_rx.try_recv() {
            if matches!(payload, EventPayload::Transcript { .. }) {
                saw_final = true;
            }
        }
        assert!(saw_final, "stop must flush a final transcript");

        // cancel
        let engine = MockEngine::new();
        let mut source = ScriptedSource::silence(1000, 8);
        source.chunk_delay = Duration::from_millis(2);
        let (mut session2, bridge2) = make_session(&engine, source);
        let (result_tx2, mut result_rx2) = unbounded_channel();
        bridge2.attach(ChannelKind::Result, result_tx2);

        session2.start();
        session2.cancel();
        // Drain partial-era results; cancel itself must not add a final once
        // the channel is empty.
        while result_rx2.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(20));
        assert!(result_rx2.try_recv().is_err());
    }

    #[test]
    fn stop_when_not_running_returns_false() {
        let engine = MockEngine::new();
        let (mut session, _bridge) = make_session(&engine, ScriptedSource::silence(1, 8));
        assert!(!session.stop());
    }

    #[test]
    fn engine_fault_surfaces_on_error_channel_and_ends_loop() {
        let engine = MockEngine::new();
        let model = engine.load_model("/m").unwrap();
        let rec = engine.create_recognizer(model, 16_000.0, None).unwrap();
        let shared: SharedRecognizer = Arc::new(Mutex::new(rec));
        let bridge = Arc::new(EventStreamBridge::new());

        // Poison the recognizer lock to force the fault path.
        {
            let shared = Arc::clone(&shared);
            let _ = thread::spawn(move || {
                let _guard = shared.lock().unwrap();
                panic!("poison");
            })
            .join();
        }

        let (err_tx, mut err_rx) = unbounded_channel();
        bridge.attach(ChannelKind::Error, err_tx);

        let mut session = ListeningSession::new(
            1,
            shared,
            Arc::clone(&bridge),
            Box::new(ScriptedSource::silence(1, 8)),
        );
        session.start();
        wait_for_loop_end(&session);

        assert!(matches!(
            err_rx.try_recv().unwrap(),
            EventPayload::Error { .. }
        ));
    }

    #[test]
    fn destroy_releases_loop_without_closing_recognizer() {
        let engine = MockEngine::new();
        let model = engine.load_model("/m").unwrap();
        let rec = engine.create_recognizer(model, 16_000.0, None).unwrap();
        let shared: SharedRecognizer = Arc::new(Mutex::new(rec));
        let bridge = Arc::new(EventStreamBridge::new());

        let mut source = ScriptedSource::silence(1000, 8);
        source.chunk_delay = Duration::from_millis(2);
        let mut session = ListeningSession::new(
            7,
            Arc::clone(&shared),
            Arc::clone(&bridge),
            Box::new(source),
        );
        session.start();
        drop(session);

        // The recognizer must still be usable after the session is gone.
        assert!(shared.lock().unwrap().result().is_ok());
    }
}
