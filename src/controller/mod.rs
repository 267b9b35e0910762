//! Command dispatcher — the stateful heart of the bridge.
//!
//! [`SessionController`] owns the [`ResourceRegistry`], the singleton
//! [`ListeningSession`] slot, and a [`TaskRunner`] for offloaded model
//! loads.  It consumes [`CommandRequest`]s from the transport over a
//! `tokio::sync::mpsc` channel and answers each with a [`Reply`] or a
//! [`BridgeError`].
//!
//! # Dispatch flow
//!
//! ```text
//! CommandRequest
//!   └─▶ decode args            (MissingArgument / WrongArgumentType)
//!   └─▶ resolve resources      (ModelNotFound / RecognizerNotFound / …)
//!   └─▶ engine call
//!         ├─ model load  → TaskRunner worker  → completion on this loop
//!         │                                     → registry insert + notification
//!         └─ everything else runs synchronously here
//! ```
//!
//! The registry is mutated only on this dispatch context.  The task worker
//! touches nothing but the model it is constructing; its completion closure
//! runs back here, where the registry lives.  Events flow through the shared
//! [`EventStreamBridge`] independently of any command.

pub mod command;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::engine::SpeechEngine;
use crate::error::BridgeError;
use crate::events::EventStreamBridge;
use crate::listening::{AudioSource, CaptureError, ListeningSession};
use crate::registry::ResourceRegistry;
use crate::task::{Completion, TaskRunner};

pub use command::{Command, CommandRequest, Notification, Reply};

use command::{
    optional_bytes, optional_f32, optional_floats, optional_str, require_bool, require_str,
    require_u32,
};

// ---------------------------------------------------------------------------
// SourceFactory
// ---------------------------------------------------------------------------

/// Builds the audio source for a new listening session at a given sample
/// rate.  The production factory opens a cpal stream; tests script one.
pub type SourceFactory =
    Box<dyn Fn(u32) -> Result<Box<dyn AudioSource>, CaptureError> + Send>;

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

/// Owns all live bridge state and handles every command.
pub struct SessionController {
    engine: Arc<dyn SpeechEngine>,
    registry: ResourceRegistry,
    bridge: Arc<EventStreamBridge>,
    runner: TaskRunner<SessionController>,
    completion_rx: Option<UnboundedReceiver<Completion<SessionController>>>,
    session: Option<ListeningSession>,
    notify_tx: UnboundedSender<Notification>,
    source_factory: SourceFactory,
    default_sample_rate: f32,
}

impl SessionController {
    /// Create a controller.
    ///
    /// * `engine`         — the decoder capability.
    /// * `bridge`         — shared event channels (the transport attaches
    ///   its subscribers directly on its own clone).
    /// * `source_factory` — how listening sessions obtain audio input.
    /// * `notify_tx`      — where async model-load outcomes are announced.
    /// * `default_sample_rate` — used when `speechService.init` omits
    ///   `sampleRate`.
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        bridge: Arc<EventStreamBridge>,
        source_factory: SourceFactory,
        notify_tx: UnboundedSender<Notification>,
        default_sample_rate: f32,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            registry: ResourceRegistry::new(),
            bridge,
            runner: TaskRunner::new(completion_tx),
            completion_rx: Some(completion_rx),
            session: None,
            notify_tx,
            source_factory,
            default_sample_rate,
        }
    }

    /// Drive the dispatch loop until the command channel closes, then tear
    /// everything down.
    ///
    /// Spawn as a tokio task; the transport keeps the sending half.
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<CommandRequest>) {
        let mut completion_rx = self
            .completion_rx
            .take()
            .expect("SessionController::run called twice");

        loop {
            tokio::select! {
                request = command_rx.recv() => match request {
                    Some(request) => {
                        let Command { method, args } = request.command;
                        let outcome = self.handle(&method, args);
                        if let Err(e) = &outcome {
                            log::debug!("controller: {method} failed: {e}");
                        }
                        let _ = request.reply_tx.send(outcome);
                    }
                    None => break,
                },
                Some(completion) = completion_rx.recv() => {
                    completion(&mut self);
                }
            }
        }

        log::info!("controller: command channel closed, shutting down");
        self.shutdown();
    }

    // -----------------------------------------------------------------------
    // Command handling
    // -----------------------------------------------------------------------

    /// Handle one command synchronously on the dispatch context.
    pub fn handle(&mut self, method: &str, args: Value) -> Result<Reply, BridgeError> {
        match method {
            "model.create" => self.model_create(&args),
            "speakerModel.create" => self.speaker_model_create(&args),

            "recognizer.create" => self.recognizer_create(&args),
            "recognizer.setSpeakerModel" => self.recognizer_set_speaker_model(&args),
            "recognizer.setMaxAlternatives" => self.recognizer_set_max_alternatives(&args),
            "recognizer.setWords" => self.recognizer_set_words(&args, false),
            "recognizer.setPartialWords" => self.recognizer_set_words(&args, true),
            "recognizer.acceptWaveForm" => self.recognizer_accept_waveform(&args),
            "recognizer.getResult" => self.recognizer_transcript(&args, TranscriptKind::Result),
            "recognizer.getPartialResult" => {
                self.recognizer_transcript(&args, TranscriptKind::Partial)
            }
            "recognizer.getFinalResult" => {
                self.recognizer_transcript(&args, TranscriptKind::Final)
            }
            "recognizer.setGrammar" => self.recognizer_set_grammar(&args),
            "recognizer.reset" => self.recognizer_reset(&args),
            "recognizer.close" => self.recognizer_close(&args),

            "speechService.init" => self.speech_service_init(&args),
            "speechService.start" => self.with_session(|s| Reply::Flag(s.start())),
            "speechService.stop" => self.with_session(|s| Reply::Flag(s.stop())),
            "speechService.setPause" => {
                let pause = require_bool(&args, "pause")?;
                self.with_session(|s| {
                    s.set_pause(pause);
                    Reply::Ack
                })
            }
            "speechService.reset" => self.with_session(|s| {
                s.reset();
                Reply::Ack
            }),
            "speechService.cancel" => self.with_session(|s| Reply::Flag(s.cancel())),
            "speechService.destroy" => self.speech_service_destroy(),

            "getPlatformVersion" => Ok(Reply::Platform(format!(
                "{} speech-bridge {}",
                std::env::consts::OS,
                env!("CARGO_PKG_VERSION")
            ))),
            "shutdown" => {
                self.shutdown();
                Ok(Reply::Ack)
            }

            other => Err(BridgeError::NotImplemented(other.into())),
        }
    }

    /// Tear down every resource: session, subscriptions, recognizers,
    /// models.  Safe to call repeatedly or with nothing outstanding.
    pub fn shutdown(&mut self) {
        self.session = None;
        self.bridge.detach_all();
        self.registry.close_all_recognizers();
        self.registry.close_all_models();
    }

    // -----------------------------------------------------------------------
    // Model commands (offloaded)
    // -----------------------------------------------------------------------

    fn model_create(&mut self, args: &Value) -> Result<Reply, BridgeError> {
        let path = require_str(args, "modelPath")?;
        log::info!("controller: loading model {path}");

        let engine = Arc::clone(&self.engine);
        let load_path = path.clone();
        let fail_path = path.clone();

        self.runner.run(
            move || engine.load_model(&load_path),
            move |ctrl, model| {
                ctrl.registry.put_model(&path, model);
                let _ = ctrl.notify_tx.send(Notification::ModelCreated { path });
            },
            move |ctrl, e| {
                log::warn!("controller: model load failed: {e}");
                let _ = ctrl.notify_tx.send(Notification::ModelError {
                    path: fail_path,
                    message: e.to_string(),
                });
            },
        );

        // The load is in flight; the caller hears the outcome via the
        // notification stream.
        Ok(Reply::Ack)
    }

    fn speaker_model_create(&mut self, args: &Value) -> Result<Reply, BridgeError> {
        let path = require_str(args, "path")?;
        log::info!("controller: loading speaker model {path}");

        let engine = Arc::clone(&self.engine);
        let load_path = path.clone();
        let fail_path = path.clone();

        self.runner.run(
            move || engine.load_speaker_model(&load_path),
            move |ctrl, model| {
                ctrl.registry.put_speaker_model(&path, model);
                let _ = ctrl
                    .notify_tx
                    .send(Notification::SpeakerModelCreated { path });
            },
            move |ctrl, e| {
                log::warn!("controller: speaker model load failed: {e}");
                let _ = ctrl.notify_tx.send(Notification::SpeakerModelError {
                    path: fail_path,
                    message: e.to_string(),
                });
            },
        );

        Ok(Reply::Ack)
    }

    // -----------------------------------------------------------------------
    // Recognizer commands (synchronous)
    // -----------------------------------------------------------------------

    fn recognizer_create(&mut self, args: &Value) -> Result<Reply, BridgeError> {
        let sample_rate = require_u32(args, "sampleRate")?;
        let model_path = require_str(args, "modelPath")?;
        let grammar = optional_str(args, "grammar")?;

        let model = self.registry.get_model(&model_path)?;
        let recognizer = self
            .engine
            .create_recognizer(model, sample_rate as f32, grammar.as_deref())
            .map_err(|e| BridgeError::CreationFailed(e.to_string()))?;

        let id = self.registry.insert_recognizer(recognizer);
        log::debug!("controller: recognizer {id} created (model {model_path}, {sample_rate} Hz)");
        Ok(Reply::RecognizerId(id))
    }

    fn recognizer_set_speaker_model(&mut self, args: &Value) -> Result<Reply, BridgeError> {
        let id = require_u32(args, "recognizerId")?;
        let path = require_str(args, "speakerModelPath")?;

        let speaker_model = self.registry.get_speaker_model(&path)?;
        let recognizer = self.registry.get_recognizer(id)?;
        lock(&recognizer)?.set_speaker_model(speaker_model)?;
        Ok(Reply::Ack)
    }

    fn recognizer_set_max_alternatives(&mut self, args: &Value) -> Result<Reply, BridgeError> {
        let id = require_u32(args, "recognizerId")?;
        let max = require_u32(args, "maxAlternatives")?;

        let recognizer = self.registry.get_recognizer(id)?;
        lock(&recognizer)?.set_max_alternatives(max)?;
        Ok(Reply::Ack)
    }

    fn recognizer_set_words(&mut self, args: &Value, partial: bool) -> Result<Reply, BridgeError> {
        let id = require_u32(args, "recognizerId")?;
        let flag = require_bool(args, "flag")?;

        let recognizer = self.registry.get_recognizer(id)?;
        let mut rec = lock(&recognizer)?;
        if partial {
            rec.set_partial_words(flag)?;
        } else {
            rec.set_words(flag)?;
        }
        Ok(Reply::Ack)
    }

    fn recognizer_accept_waveform(&mut self, args: &Value) -> Result<Reply, BridgeError> {
        let id = require_u32(args, "recognizerId")?;
        let bytes = optional_bytes(args, "bytes")?;
        let floats = optional_floats(args, "floats")?;

        // Exactly one buffer kind per call.  The legacy behavior of quietly
        // preferring bytes when both arrive is rejected as an argument error.
        let recognizer = self.registry.get_recognizer(id)?;
        let end_of_utterance = match (bytes, floats) {
            (Some(bytes), None) => lock(&recognizer)?.accept_bytes(&bytes)?,
            (None, Some(floats)) => lock(&recognizer)?.accept_floats(&floats)?,
            (Some(_), Some(_)) => {
                return Err(BridgeError::WrongArgumentType {
                    source_arg: "bytes/floats".into(),
                    expected: "exactly one of bytes or floats".into(),
                    actual: "both".into(),
                })
            }
            (None, None) => {
                return Err(BridgeError::MissingArgument("bytes or floats".into()))
            }
        };
        Ok(Reply::Flag(end_of_utterance))
    }

    fn recognizer_transcript(
        &mut self,
        args: &Value,
        kind: TranscriptKind,
    ) -> Result<Reply, BridgeError> {
        let id = require_u32(args, "recognizerId")?;
        let recognizer = self.registry.get_recognizer(id)?;
        let mut rec = lock(&recognizer)?;
        let json = match kind {
            TranscriptKind::Result => rec.result()?,
            TranscriptKind::Partial => rec.partial_result()?,
            TranscriptKind::Final => rec.final_result()?,
        };
        Ok(Reply::Transcript(json))
    }

    fn recognizer_set_grammar(&mut self, args: &Value) -> Result<Reply, BridgeError> {
        let id = require_u32(args, "recognizerId")?;
        let grammar = require_str(args, "grammar")?;

        let recognizer = self.registry.get_recognizer(id)?;
        lock(&recognizer)?.set_grammar(&grammar)?;
        Ok(Reply::Ack)
    }

    fn recognizer_reset(&mut self, args: &Value) -> Result<Reply, BridgeError> {
        let id = require_u32(args, "recognizerId")?;
        let recognizer = self.registry.get_recognizer(id)?;
        lock(&recognizer)?.reset()?;
        Ok(Reply::Ack)
    }

    fn recognizer_close(&mut self, args: &Value) -> Result<Reply, BridgeError> {
        let id = require_u32(args, "recognizerId")?;
        self.registry.remove_recognizer(id)?;
        log::debug!("controller: recognizer {id} closed");
        Ok(Reply::Ack)
    }

    // -----------------------------------------------------------------------
    // Speech-service commands
    // -----------------------------------------------------------------------

    fn speech_service_init(&mut self, args: &Value) -> Result<Reply, BridgeError> {
        if self.session.is_some() {
            // Never an implicit replace — that would orphan a running
            // capture loop.
            return Err(BridgeError::SpeechSessionAlreadyExists);
        }

        let id = require_u32(args, "recognizerId")?;
        let sample_rate =
            optional_f32(args, "sampleRate")?.unwrap_or(self.default_sample_rate);

        let recognizer = self.registry.get_recognizer(id)?;
        let source = (self.source_factory)(sample_rate as u32)
            .map_err(|e| BridgeError::Capture(e.to_string()))?;

        self.session = Some(ListeningSession::new(
            id,
            recognizer,
            Arc::clone(&self.bridge),
            source,
        ));
        log::info!("controller: speech service bound to recognizer {id} at {sample_rate} Hz");
        Ok(Reply::Ack)
    }

    fn speech_service_destroy(&mut self) -> Result<Reply, BridgeError> {
        match self.session.take() {
            // Dropping the session releases the capture loop; the bound
            // recognizer stays open in the registry.
            Some(session) => {
                log::info!(
                    "controller: speech service destroyed (recognizer {})",
                    session.recognizer_id()
                );
                drop(session);
                Ok(Reply::Ack)
            }
            None => Err(BridgeError::SpeechSessionNotFound),
        }
    }

    fn with_session(
        &mut self,
        f: impl FnOnce(&mut ListeningSession) -> Reply,
    ) -> Result<Reply, BridgeError> {
        match self.session.as_mut() {
            Some(session) => Ok(f(session)),
            None => Err(BridgeError::SpeechSessionNotFound),
        }
    }

    // -----------------------------------------------------------------------
    // Introspection (used by tests and the binary's shutdown log)
    // -----------------------------------------------------------------------

    /// True when no models, recognizers or session remain.
    pub fn is_drained(&self) -> bool {
        self.registry.is_empty() && self.session.is_none()
    }
}

enum TranscriptKind {
    Result,
    Partial,
    Final,
}

/// Lock a shared recognizer for one engine call.
fn lock(
    recognizer: &crate::registry::SharedRecognizer,
) -> Result<std::sync::MutexGuard<'_, Box<dyn crate::engine::EngineRecognizer>>, BridgeError> {
    recognizer
        .lock()
        .map_err(|_| BridgeError::EngineFault("recognizer lock poisoned".into()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
