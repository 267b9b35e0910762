//! Binary entry point — speech bridge over line-delimited JSON on stdio.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`BridgeConfig`] from disk (returns default on first run).
//! 3. Create the tokio runtime (multi-thread, 2 workers).
//! 4. Build the engine (a stub that reports engine-unavailable until a real
//!    decoder backend is linked in).
//! 5. Attach the three event channels and spawn their stdout forwarders.
//! 6. Spawn the [`SessionController`] dispatch loop.
//! 7. Read commands from stdin until EOF; EOF closes the command channel,
//!    which makes the controller tear everything down.
//!
//! # Wire format
//!
//! One JSON object per line, both directions:
//!
//! ```text
//! → {"id": 1, "method": "model.create", "args": {"modelPath": "/m"}}
//! ← {"id": 1, "result": "success"}
//! ← {"event": "model.created", "path": "/m"}
//! ← {"channel": "partial", "payload": {"kind": "transcript", "json": "…"}}
//! ← {"id": 2, "error": {"code": "MODEL_NOT_FOUND", "message": "…"}}
//! ```

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use speech_bridge::config::BridgeConfig;
use speech_bridge::controller::{Command, CommandRequest, SourceFactory};
use speech_bridge::engine::{EngineError, EngineModel, EngineRecognizer, SpeechEngine};
use speech_bridge::listening::{AudioSource, CpalSource};
use speech_bridge::{ChannelKind, EventStreamBridge, SessionController};

// ---------------------------------------------------------------------------
// Inbound line format
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CommandLine {
    id: u64,
    method: String,
    #[serde(default)]
    args: Value,
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("speech bridge starting up");

    // 2. Configuration
    let config = BridgeConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        BridgeConfig::default()
    });

    // 3. Tokio runtime (2 worker threads — stdio pump + dispatch loop)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    rt.block_on(run(config))
}

async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    // 4. Engine — decoder backends plug in behind SpeechEngine; without one
    //    linked, every load reports engine-unavailable but the bridge still
    //    answers the full command surface.
    let engine: Arc<dyn SpeechEngine> = Arc::new(UnavailableEngine);

    // Single writer task serialises all stdout lines (replies, notifications
    // and events interleave from different tasks).
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(value) = out_rx.recv().await {
            let mut line = value.to_string();
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    // 5. Event channels → stdout forwarders
    let bridge = Arc::new(EventStreamBridge::new());
    for (kind, name) in [
        (ChannelKind::Error, "error"),
        (ChannelKind::Result, "result"),
        (ChannelKind::Partial, "partial"),
    ] {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        bridge.attach(kind, event_tx);
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            while let Some(payload) = event_rx.recv().await {
                let _ = out_tx.send(json!({
                    "channel": name,
                    "payload": payload,
                }));
            }
        });
    }

    // Notification forwarder (async model-load outcomes)
    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
    {
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            while let Some(notification) = notify_rx.recv().await {
                if let Ok(value) = serde_json::to_value(&notification) {
                    let _ = out_tx.send(value);
                }
            }
        });
    }

    // 6. Controller
    let source_factory: SourceFactory = Box::new(|sample_rate| {
        CpalSource::open(sample_rate).map(|s| Box::new(s) as Box<dyn AudioSource>)
    });
    let mut controller = SessionController::new(
        engine,
        Arc::clone(&bridge),
        source_factory,
        notify_tx,
        config.audio.sample_rate as f32,
    );

    // Kick off a configured model preload; the outcome arrives as a
    // notification once the dispatch loop drains the completion.
    if let Some(path) = &config.model.preload_path {
        if let Err(e) = controller.handle("model.create", json!({"modelPath": path})) {
            log::warn!("model preload failed: {e}");
        }
    }

    let (cmd_tx, cmd_rx) = mpsc::channel::<CommandRequest>(config.transport.command_queue_depth);
    let dispatch = tokio::spawn(controller.run(cmd_rx));

    // 7. stdin pump
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let parsed: CommandLine = match serde_json::from_str(&line) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("unparseable command line: {e}");
                let _ = out_tx.send(json!({
                    "error": {"code": "BAD_REQUEST", "message": e.to_string()},
                }));
                continue;
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = CommandRequest {
            command: Command {
                method: parsed.method,
                args: parsed.args,
            },
            reply_tx,
        };
        if cmd_tx.send(request).await.is_err() {
            break; // dispatch loop gone
        }

        let line = match reply_rx.await {
            Ok(Ok(reply)) => json!({"id": parsed.id, "result": reply.into_json()}),
            Ok(Err(e)) => json!({
                "id": parsed.id,
                "error": {"code": e.code(), "message": e.to_string()},
            }),
            Err(_) => break,
        };
        let _ = out_tx.send(line);
    }

    // EOF: closing the command channel drives controller shutdown.
    drop(cmd_tx);
    let _ = dispatch.await;
    drop(out_tx);
    let _ = writer.await;

    log::info!("speech bridge stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// UnavailableEngine — fallback SpeechEngine when no decoder is linked
// ---------------------------------------------------------------------------

struct UnavailableEngine;

impl SpeechEngine for UnavailableEngine {
    fn load_model(&self, path: &str) -> Result<Arc<dyn EngineModel>, EngineError> {
        Err(EngineError::ModelLoad(format!(
            "no decoder backend linked; cannot load {path}"
        )))
    }

    fn load_speaker_model(&self, path: &str) -> Result<Arc<dyn EngineModel>, EngineError> {
        Err(EngineError::ModelLoad(format!(
            "no decoder backend linked; cannot load {path}"
        )))
    }

    fn create_recognizer(
        &self,
        _model: Arc<dyn EngineModel>,
        _sample_rate: f32,
        _grammar: Option<&str>,
    ) -> Result<Box<dyn EngineRecognizer>, EngineError> {
        Err(EngineError::RecognizerInit("no decoder backend linked".into()))
    }
}
