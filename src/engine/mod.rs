//! Opaque speech-engine capability.
//!
//! # Overview
//!
//! The actual acoustic/language model and decoder live outside this crate.
//! [`SpeechEngine`] is the object-safe, `Send + Sync` entry point the bridge
//! holds behind an `Arc<dyn SpeechEngine>`; it hands out [`EngineModel`]
//! handles (opaque loaded resources) and [`EngineRecognizer`] instances
//! (stateful decoders that accumulate audio and produce JSON transcripts).
//!
//! [`MockEngine`] (available under `#[cfg(test)]`) is a scriptable stub used
//! throughout the unit tests — it records every call it receives so tests can
//! assert which engine path was exercised without a real decoder library.

use std::sync::Arc;

use thiserror::Error;

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors raised by the decoder engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The model file could not be loaded (bad path, corrupt data…).
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// The engine refused to construct a recognizer.
    #[error("recognizer init failed: {0}")]
    RecognizerInit(String),

    /// A fault during decoding or configuration.
    #[error("decode failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// EngineModel
// ---------------------------------------------------------------------------

/// Opaque handle to a loaded model.
///
/// Immutable once created; shared via `Arc` so a recognizer keeps its model
/// alive even after the registry forgets the path.
pub trait EngineModel: Send + Sync {
    /// Filesystem path the model was loaded from.
    fn path(&self) -> &str;
}

impl std::fmt::Debug for dyn EngineModel + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineModel")
            .field("path", &self.path())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EngineRecognizer
// ---------------------------------------------------------------------------

/// Stateful decoder instance bound to one model.
///
/// A recognizer accumulates audio via repeated `accept_*` calls; the return
/// value is the end-of-utterance flag.  Transcripts come back as JSON-encoded
/// strings in the engine's native format.  Dropping the recognizer releases
/// its decoder resources.
pub trait EngineRecognizer: Send {
    /// Feed 16-bit little-endian PCM bytes.  Returns `true` at end of
    /// utterance.
    fn accept_bytes(&mut self, data: &[u8]) -> Result<bool, EngineError>;

    /// Feed `f32` PCM samples.  Returns `true` at end of utterance.
    fn accept_floats(&mut self, data: &[f32]) -> Result<bool, EngineError>;

    /// Incremental result for the utterance decoded so far (JSON).
    fn result(&mut self) -> Result<String, EngineError>;

    /// In-progress partial hypothesis (JSON).
    fn partial_result(&mut self) -> Result<String, EngineError>;

    /// Finalized result; flushes any buffered audio (JSON).
    fn final_result(&mut self) -> Result<String, EngineError>;

    /// Maximum number of alternative hypotheses to report.
    fn set_max_alternatives(&mut self, max: u32) -> Result<(), EngineError>;

    /// Include per-word timing in results.
    fn set_words(&mut self, enable: bool) -> Result<(), EngineError>;

    /// Include per-word timing in partial results.
    fn set_partial_words(&mut self, enable: bool) -> Result<(), EngineError>;

    /// Restrict output to the given grammar (JSON list of phrases).
    fn set_grammar(&mut self, grammar: &str) -> Result<(), EngineError>;

    /// Attach a speaker-identification model.
    fn set_speaker_model(&mut self, model: Arc<dyn EngineModel>) -> Result<(), EngineError>;

    /// Clear decoding state; configuration is kept.
    fn reset(&mut self) -> Result<(), EngineError>;
}

impl std::fmt::Debug for dyn EngineRecognizer + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRecognizer").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// SpeechEngine
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe entry point to the decoder library.
///
/// `load_model` may take seconds on real engines — the bridge therefore runs
/// it through its task runner, never on the command-dispatch context.
/// Recognizer creation is treated as fast and runs synchronously.
pub trait SpeechEngine: Send + Sync {
    /// Load an acoustic/language model from `path`.
    fn load_model(&self, path: &str) -> Result<Arc<dyn EngineModel>, EngineError>;

    /// Load a speaker-identification model from `path`.
    fn load_speaker_model(&self, path: &str) -> Result<Arc<dyn EngineModel>, EngineError>;

    /// Create a recognizer bound to `model` at `sample_rate`, optionally
    /// constrained to `grammar`.
    fn create_recognizer(
        &self,
        model: Arc<dyn EngineModel>,
        sample_rate: f32,
        grammar: Option<&str>,
    ) -> Result<Box<dyn EngineRecognizer>, EngineError>;
}

// Compile-time assertion: Arc<dyn SpeechEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Arc<dyn SpeechEngine>, _: Box<dyn EngineRecognizer>) {}
};

// ---------------------------------------------------------------------------
// MockEngine  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::{CallLog, MockEngine, MockModel, MockRecognizer};

#[cfg(test)]
mod mock {
    use std::sync::{Arc, Mutex};

    use super::{EngineError, EngineModel, EngineRecognizer, SpeechEngine};

    /// Shared call log — tests inspect it after handing recognizers to the
    /// registry.
    pub type CallLog = Arc<Mutex<Vec<String>>>;

    /// Scriptable engine test double.
    pub struct MockEngine {
        /// Every call, rendered as `"load_model:/path"`, `"accept_bytes:4"`, …
        pub calls: CallLog,
        /// When `true`, `load_model` / `load_speaker_model` fail.
        pub fail_loads: bool,
        /// When `true`, `create_recognizer` fails.
        pub fail_recognizers: bool,
        /// Canned transcript returned by result calls.
        pub transcript: String,
        /// End-of-utterance flag returned by accept calls.
        pub endpoint: bool,
    }

    impl MockEngine {
        pub fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                fail_loads: false,
                fail_recognizers: false,
                transcript: r#"{"text": ""}"#.into(),
                endpoint: false,
            }
        }

        /// An engine whose model loads always fail.
        pub fn failing_loads() -> Self {
            Self {
                fail_loads: true,
                ..Self::new()
            }
        }

        fn log(&self, entry: impl Into<String>) {
            self.calls.lock().unwrap().push(entry.into());
        }
    }

    pub struct MockModel {
        path: String,
    }

    impl EngineModel for MockModel {
        fn path(&self) -> &str {
            &self.path
        }
    }

    pub struct MockRecognizer {
        calls: CallLog,
        transcript: String,
        endpoint: bool,
    }

    impl MockRecognizer {
        fn log(&self, entry: impl Into<String>) {
            self.calls.lock().unwrap().push(entry.into());
        }
    }

    impl SpeechEngine for MockEngine {
        fn load_model(&self, path: &str) -> Result<Arc<dyn EngineModel>, EngineError> {
            self.log(format!("load_model:{path}"));
            if self.fail_loads {
                return Err(EngineError::ModelLoad(format!("no model at {path}")));
            }
            Ok(Arc::new(MockModel { path: path.into() }))
        }

        fn load_speaker_model(&self, path: &str) -> Result<Arc<dyn EngineModel>, EngineError> {
            self.log(format!("load_speaker_model:{path}"));
            if self.fail_loads {
                return Err(EngineError::ModelLoad(format!("no speaker model at {path}")));
            }
            Ok(Arc::new(MockModel { path: path.into() }))
        }

        fn create_recognizer(
            &self,
            model: Arc<dyn EngineModel>,
            sample_rate: f32,
            grammar: Option<&str>,
        ) -> Result<Box<dyn EngineRecognizer>, EngineError> {
            self.log(format!(
                "create_recognizer:{}:{}:{}",
                model.path(),
                sample_rate,
                grammar.unwrap_or("-")
            ));
            if self.fail_recognizers {
                return Err(EngineError::RecognizerInit("mock refusal".into()));
            }
            Ok(Box::new(MockRecognizer {
                calls: Arc::clone(&self.calls),
                transcript: self.transcript.clone(),
                endpoint: self.endpoint,
            }))
        }
    }

    impl EngineRecognizer for MockRecognizer {
        fn accept_bytes(&mut self, data: &[u8]) -> Result<bool, EngineError> {
            self.log(format!("accept_bytes:{}", data.len()));
            Ok(self.endpoint)
        }

        fn accept_floats(&mut self, data: &[f32]) -> Result<bool, EngineError> {
            self.log(format!("accept_floats:{}", data.len()));
            Ok(self.endpoint)
        }

        fn result(&mut self) -> Result<String, EngineError> {
            self.log("result");
            Ok(self.transcript.clone())
        }

        fn partial_result(&mut self) -> Result<String, EngineError> {
            self.log("partial_result");
            Ok(self.transcript.clone())
        }

        fn final_result(&mut self) -> Result<String, EngineError> {
            self.log("final_result");
            Ok(self.transcript.clone())
        }

        fn set_max_alternatives(&mut self, max: u32) -> Result<(), EngineError> {
            self.log(format!("set_max_alternatives:{max}"));
            Ok(())
        }

        fn set_words(&mut self, enable: bool) -> Result<(), EngineError> {
            self.log(format!("set_words:{enable}"));
            Ok(())
        }

        fn set_partial_words(&mut self, enable: bool) -> Result<(), EngineError> {
            self.log(format!("set_partial_words:{enable}"));
            Ok(())
        }

        fn set_grammar(&mut self, grammar: &str) -> Result<(), EngineError> {
            self.log(format!("set_grammar:{grammar}"));
            Ok(())
        }

        fn set_speaker_model(&mut self, model: Arc<dyn EngineModel>) -> Result<(), EngineError> {
            self.log(format!("set_speaker_model:{}", model.path()));
            Ok(())
        }

        fn reset(&mut self) -> Result<(), EngineError> {
            self.log("reset");
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_load_records_path_and_returns_model() {
        let engine = MockEngine::new();
        let model = engine.load_model("/models/en-small").unwrap();
        assert_eq!(model.path(), "/models/en-small");
        assert_eq!(
            engine.calls.lock().unwrap().as_slice(),
            ["load_model:/models/en-small"]
        );
    }

    #[test]
    fn mock_failing_loads_return_model_load_error() {
        let engine = MockEngine::failing_loads();
        let err = engine.load_model("/nope").unwrap_err();
        assert!(matches!(err, EngineError::ModelLoad(_)));
    }

    #[test]
    fn mock_recognizer_reports_configured_endpoint_flag() {
        let mut engine = MockEngine::new();
        engine.endpoint = true;
        let model = engine.load_model("/m").unwrap();
        let mut rec = engine.create_recognizer(model, 16_000.0, None).unwrap();
        assert!(rec.accept_bytes(&[0, 0, 0, 0]).unwrap());
        assert!(rec.accept_floats(&[0.0, 0.0]).unwrap());
    }

    #[test]
    fn mock_recognizer_returns_canned_transcript() {
        let engine = MockEngine::new();
        let model = engine.load_model("/m").unwrap();
        let mut rec = engine
            .create_recognizer(model, 16_000.0, Some(r#"["yes","no"]"#))
            .unwrap();
        assert_eq!(rec.result().unwrap(), r#"{"text": ""}"#);
        assert_eq!(rec.final_result().unwrap(), r#"{"text": ""}"#);
    }

    #[test]
    fn arc_dyn_engine_compiles() {
        // If this test compiles, the trait is object-safe.
        let engine: Arc<dyn SpeechEngine> = Arc::new(MockEngine::new());
        let _ = engine.load_model("/m");
    }
}
