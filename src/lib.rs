//! Speech bridge — a stateful session manager between a command/event
//! transport and an external speech-recognition engine.
//!
//! The host speaks line-delimited JSON commands; the bridge owns the loaded
//! models, the recognizer instances, the (at most one) continuous-listening
//! session, and the three event channels transcripts flow back on.
//!
//! Module map:
//!
//! - [`engine`]     — opaque decoder capability (traits only)
//! - [`task`]       — single-thread offload for slow engine work
//! - [`registry`]   — model / recognizer ownership and id allocation
//! - [`events`]     — error / result / partial subscription channels
//! - [`listening`]  — continuous capture session and audio sources
//! - [`controller`] — command dispatch and lifecycle
//! - [`config`]     — TOML settings and platform paths
//! - [`error`]      — the command-level error type

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod listening;
pub mod registry;
pub mod task;

pub use controller::{Command, CommandRequest, Notification, Reply, SessionController};
pub use error::BridgeError;
pub use events::{ChannelKind, DecoderEvent, EventPayload, EventStreamBridge};
