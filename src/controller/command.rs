//! Wire types and argument decoding for the command surface.
//!
//! A [`Command`] is a method name plus a JSON argument payload, exactly as
//! the host transport delivers it.  Decoding is strict: a required field
//! that is absent is a [`BridgeError::MissingArgument`]; a field that is
//! present with the wrong shape is a [`BridgeError::WrongArgumentType`]
//! naming both the expected and the actual type.  Decoding always happens
//! before any engine call.
//!
//! [`Reply`] is the synchronous result of a command; [`Notification`] is the
//! out-of-band signal used for async model-load outcomes.

use serde::Serialize;
use serde_json::Value;

use crate::error::BridgeError;

// ---------------------------------------------------------------------------
// Command / CommandRequest
// ---------------------------------------------------------------------------

/// One decoded transport message: method name + raw JSON arguments.
#[derive(Debug, Clone)]
pub struct Command {
    pub method: String,
    pub args: Value,
}

/// A command paired with its reply slot, as sent to the dispatch loop.
pub struct CommandRequest {
    pub command: Command,
    pub reply_tx: tokio::sync::oneshot::Sender<Result<Reply, BridgeError>>,
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// Synchronous result of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Plain acknowledgement.
    Ack,
    /// Freshly allocated recognizer id.
    RecognizerId(u32),
    /// Boolean outcome (end-of-utterance flag, started/stopped flags).
    Flag(bool),
    /// JSON-encoded transcript string, passed through from the engine.
    Transcript(String),
    /// Host platform description.
    Platform(String),
}

impl Reply {
    /// Wire encoding.  Plain acks encode as the string `"success"`,
    /// matching what callers of the original channel expect.
    pub fn into_json(self) -> Value {
        match self {
            Reply::Ack => Value::String("success".into()),
            Reply::RecognizerId(id) => Value::from(id),
            Reply::Flag(b) => Value::from(b),
            Reply::Transcript(s) => Value::String(s),
            Reply::Platform(s) => Value::String(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// Out-of-band notification for offloaded model loads.
///
/// `model.create` / `speakerModel.create` acknowledge immediately; the load
/// outcome arrives later as one of these on the notification stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Notification {
    #[serde(rename = "model.created")]
    ModelCreated { path: String },
    #[serde(rename = "model.error")]
    ModelError { path: String, message: String },
    #[serde(rename = "speakerModel.created")]
    SpeakerModelCreated { path: String },
    #[serde(rename = "speakerModel.error")]
    SpeakerModelError { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Argument decoding
// ---------------------------------------------------------------------------

/// JSON type name used in `WrongArgumentType` reports.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn wrong_type(name: &str, expected: &str, actual: &Value) -> BridgeError {
    BridgeError::WrongArgumentType {
        source_arg: name.into(),
        expected: expected.into(),
        actual: type_name(actual).into(),
    }
}

fn get<'a>(args: &'a Value, name: &str) -> Result<&'a Value, BridgeError> {
    match args.get(name) {
        Some(Value::Null) | None => Err(BridgeError::MissingArgument(name.into())),
        Some(value) => Ok(value),
    }
}

/// Required string argument.
pub fn require_str(args: &Value, name: &str) -> Result<String, BridgeError> {
    let value = get(args, name)?;
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| wrong_type(name, "string", value))
}

/// Required non-negative integer argument.
pub fn require_u32(args: &Value, name: &str) -> Result<u32, BridgeError> {
    let value = get(args, name)?;
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| wrong_type(name, "int", value))
}

/// Required boolean argument.
pub fn require_bool(args: &Value, name: &str) -> Result<bool, BridgeError> {
    let value = get(args, name)?;
    value
        .as_bool()
        .ok_or_else(|| wrong_type(name, "bool", value))
}

/// Required numeric argument, integer or float.
pub fn require_f32(args: &Value, name: &str) -> Result<f32, BridgeError> {
    let value = get(args, name)?;
    value
        .as_f64()
        .map(|n| n as f32)
        .ok_or_else(|| wrong_type(name, "number", value))
}

/// Optional numeric argument — absent and `null` both decode to `None`.
pub fn optional_f32(args: &Value, name: &str) -> Result<Option<f32>, BridgeError> {
    match args.get(name) {
        Some(Value::Null) | None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(|n| Some(n as f32))
            .ok_or_else(|| wrong_type(name, "number", value)),
    }
}

/// Optional string argument — absent and `null` both decode to `None`.
pub fn optional_str(args: &Value, name: &str) -> Result<Option<String>, BridgeError> {
    match args.get(name) {
        Some(Value::Null) | None => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_owned()))
            .ok_or_else(|| wrong_type(name, "string", value)),
    }
}

/// Optional byte buffer, carried as a JSON array of integers in `0..=255`.
pub fn optional_bytes(args: &Value, name: &str) -> Result<Option<Vec<u8>>, BridgeError> {
    let Some(value) = args.get(name) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let array = value
        .as_array()
        .ok_or_else(|| wrong_type(name, "byte array", value))?;

    let mut bytes = Vec::with_capacity(array.len());
    for item in array {
        let byte = item
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .ok_or_else(|| wrong_type(name, "byte array", item))?;
        bytes.push(byte);
    }
    Ok(Some(bytes))
}

/// Optional float-sample buffer, carried as a JSON array of numbers.
pub fn optional_floats(args: &Value, name: &str) -> Result<Option<Vec<f32>>, BridgeError> {
    let Some(value) = args.get(name) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let array = value
        .as_array()
        .ok_or_else(|| wrong_type(name, "float array", value))?;

    let mut floats = Vec::with_capacity(array.len());
    for item in array {
        let sample = item
            .as_f64()
            .ok_or_else(|| wrong_type(name, "float array", item))?;
        floats.push(sample as f32);
    }
    Ok(Some(floats))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
