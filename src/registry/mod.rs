//! Ownership of live models, speaker models and recognizers.
//!
//! [`ResourceRegistry`] maps opaque handles — model paths and recognizer
//! ids — to the engine objects behind them.  It is owned and mutated only by
//! the command-dispatch context; the capture loop reaches a recognizer
//! through its [`SharedRecognizer`] mutex, never through the registry.
//!
//! Recognizer ids are allocated `last id + 1` (starting at 1) fused with the
//! insertion itself, so two creation commands can never observe the same id.
//! Ids of closed recognizers are never scavenged while other entries remain.
//!
//! Every accessor that finds nothing returns a typed [`BridgeError`]; no
//! caller ever receives a bare `None` it could silently run with.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::engine::{EngineModel, EngineRecognizer};
use crate::error::BridgeError;

// ---------------------------------------------------------------------------
// SharedRecognizer
// ---------------------------------------------------------------------------

/// A recognizer shared between the dispatch context and (at most) one
/// listening-session capture thread.
///
/// Lock for a single engine call; never hold across `.await` points.
pub type SharedRecognizer = Arc<Mutex<Box<dyn EngineRecognizer>>>;

// ---------------------------------------------------------------------------
// ResourceRegistry
// ---------------------------------------------------------------------------

/// Owns every live engine resource created through the bridge.
#[derive(Default)]
pub struct ResourceRegistry {
    models: HashMap<String, Arc<dyn EngineModel>>,
    speaker_models: HashMap<String, Arc<dyn EngineModel>>,
    recognizers: BTreeMap<u32, SharedRecognizer>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Models
    // -----------------------------------------------------------------------

    /// Register a loaded model under its filesystem path.
    ///
    /// Re-registering the same path replaces the entry; lookups after that
    /// resolve to the newest instance for the rest of the process lifetime.
    pub fn put_model(&mut self, path: impl Into<String>, model: Arc<dyn EngineModel>) {
        self.models.insert(path.into(), model);
    }

    /// Look up a model by path.
    pub fn get_model(&self, path: &str) -> Result<Arc<dyn EngineModel>, BridgeError> {
        self.models
            .get(path)
            .cloned()
            .ok_or_else(|| BridgeError::ModelNotFound(path.into()))
    }

    /// Register a loaded speaker model (separate namespace from models).
    pub fn put_speaker_model(&mut self, path: impl Into<String>, model: Arc<dyn EngineModel>) {
        self.speaker_models.insert(path.into(), model);
    }

    /// Look up a speaker model by path.
    pub fn get_speaker_model(&self, path: &str) -> Result<Arc<dyn EngineModel>, BridgeError> {
        self.speaker_models
            .get(path)
            .cloned()
            .ok_or_else(|| BridgeError::SpeakerModelNotFound(path.into()))
    }

    /// Drop every model and speaker-model reference held by the registry.
    ///
    /// Recognizers keep their own `Arc` to the model they were built from,
    /// so a live recognizer is unaffected by this call.
    pub fn close_all_models(&mut self) {
        self.models.clear();
        self.speaker_models.clear();
    }

    // -----------------------------------------------------------------------
    // Recognizers
    // -----------------------------------------------------------------------

    /// Insert a recognizer and return its freshly allocated id.
    ///
    /// Allocation is `max(existing ids) + 1`, or `1` when the map is empty.
    /// Allocation and insertion are one operation under `&mut self`, so a
    /// duplicate id cannot be handed out even if the surrounding transport
    /// is ever parallelized.
    pub fn insert_recognizer(&mut self, recognizer: Box<dyn EngineRecognizer>) -> u32 {
        let id = self
            .recognizers
            .last_key_value()
            .map(|(last, _)| last + 1)
            .unwrap_or(1);
        self.recognizers
            .insert(id, Arc::new(Mutex::new(recognizer)));
        id
    }

    /// Look up a recognizer by id.
    pub fn get_recognizer(&self, id: u32) -> Result<SharedRecognizer, BridgeError> {
        self.recognizers
            .get(&id)
            .cloned()
            .ok_or(BridgeError::RecognizerNotFound(id))
    }

    /// Remove and drop the recognizer with the given id.
    pub fn remove_recognizer(&mut self, id: u32) -> Result<(), BridgeError> {
        self.recognizers
            .remove(&id)
            .map(|_| ())
            .ok_or(BridgeError::RecognizerNotFound(id))
    }

    /// Drop every recognizer.
    pub fn close_all_recognizers(&mut self) {
        self.recognizers.clear();
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Number of live recognizers.
    pub fn recognizer_count(&self) -> usize {
        self.recognizers.len()
    }

    /// True when no models, speaker models or recognizers remain.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty() && self.speaker_models.is_empty() && self.recognizers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
