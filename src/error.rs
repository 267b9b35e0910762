//! Error taxonomy for the bridge.
//!
//! [`BridgeError`] covers every failure a command can report back to the
//! host: argument-decoding errors, resource lookups that found nothing,
//! listening-session lifecycle violations, and faults raised by the engine
//! itself.
//!
//! Argument and lookup errors are detected before any engine call is made
//! and reported synchronously with the command.  Engine faults raised during
//! an offloaded model load arrive through the async notification path
//! instead; decoder faults during continuous listening arrive on the error
//! event channel.  No variant is ever swallowed.

use thiserror::Error;

use crate::engine::EngineError;

// ---------------------------------------------------------------------------
// BridgeError
// ---------------------------------------------------------------------------

/// All errors a command handler can report to the caller.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// A required argument was absent from the command payload.
    #[error("missing required argument: {0}")]
    MissingArgument(String),

    /// An argument was present but had the wrong shape.
    #[error("wrong type for argument {source_arg}: expected {expected}, got {actual}")]
    WrongArgumentType {
        /// Name of the offending argument.
        source_arg: String,
        /// What the command expected (e.g. `"string"`, `"int"`).
        expected: String,
        /// What was actually supplied.
        actual: String,
    },

    /// No model has been created for the given path.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// No speaker model has been created for the given path.
    #[error("speaker model not found: {0}")]
    SpeakerModelNotFound(String),

    /// The recognizer id does not exist in the registry.
    #[error("recognizer not found: {0}")]
    RecognizerNotFound(u32),

    /// A speech-service command was issued with no active listening session.
    #[error("no speech service initialized")]
    SpeechSessionNotFound,

    /// `speechService.init` was called while a session already exists.
    #[error("a speech service already exists — destroy it first")]
    SpeechSessionAlreadyExists,

    /// The engine rejected a create call (recognizer or model).
    #[error("creation failed: {0}")]
    CreationFailed(String),

    /// A fault raised by the decoder engine during a synchronous call.
    #[error("engine fault: {0}")]
    EngineFault(String),

    /// The capture device could not be opened for continuous listening.
    #[error("audio capture failed: {0}")]
    Capture(String),

    /// The command name is not part of the bridge surface.
    #[error("method not implemented: {0}")]
    NotImplemented(String),
}

impl BridgeError {
    /// Stable machine-readable code, used as the `code` field of error
    /// responses and error events on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::MissingArgument(_) => "MISSING_ARGUMENT",
            BridgeError::WrongArgumentType { .. } => "WRONG_ARGUMENT_TYPE",
            BridgeError::ModelNotFound(_) => "MODEL_NOT_FOUND",
            BridgeError::SpeakerModelNotFound(_) => "SPEAKER_MODEL_NOT_FOUND",
            BridgeError::RecognizerNotFound(_) => "RECOGNIZER_NOT_FOUND",
            BridgeError::SpeechSessionNotFound => "SPEECH_SERVICE_NOT_FOUND",
            BridgeError::SpeechSessionAlreadyExists => "SPEECH_SERVICE_EXISTS",
            BridgeError::CreationFailed(_) => "CREATION_FAILED",
            BridgeError::EngineFault(_) => "ENGINE_FAULT",
            BridgeError::Capture(_) => "CAPTURE_ERROR",
            BridgeError::NotImplemented(_) => "NOT_IMPLEMENTED",
        }
    }
}

impl From<EngineError> for BridgeError {
    fn from(e: EngineError) -> Self {
        BridgeError::EngineFault(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
