//! Audio input for continuous listening.
//!
//! [`AudioSource`] is the pull-style interface the capture loop reads from.
//! [`CpalSource`] is the production implementation on top of `cpal`; it keeps
//! the (non-`Send`) `cpal::Stream` on a small holder thread and hands chunks
//! across an mpsc channel, so the source itself can move onto the session's
//! capture thread.
//!
//! [`ScriptedSource`] (test-only) replays a fixed list of chunks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

/// How long one [`AudioSource::read_chunk`] call may block before reporting
/// "no data yet" with an empty chunk.  Keeps stop/cancel latency bounded.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors from setting up or running audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("audio stream stopped unexpectedly")]
    StreamClosed,
}

// ---------------------------------------------------------------------------
// AudioSource
// ---------------------------------------------------------------------------

/// Pull-style audio input consumed by the capture loop.
pub trait AudioSource: Send {
    /// Block (bounded) for the next chunk of mono `f32` PCM.
    ///
    /// - `Ok(Some(chunk))` — audio data; may be empty when nothing arrived
    ///   within the internal timeout (callers just poll again).
    /// - `Ok(None)` — the source is exhausted (scripted input ran out).
    /// - `Err(_)` — the device failed; the capture loop surfaces this on the
    ///   error channel and stops.
    fn read_chunk(&mut self) -> Result<Option<Vec<f32>>, CaptureError>;
}

// ---------------------------------------------------------------------------
// CpalSource
// ---------------------------------------------------------------------------

/// Microphone input via `cpal`.
///
/// `cpal::Stream` is not `Send` on every platform, so the stream lives on a
/// dedicated holder thread for its whole lifetime; this struct only owns the
/// chunk receiver and a stop flag, and is freely movable between threads.
pub struct CpalSource {
    chunk_rx: mpsc::Receiver<Vec<f32>>,
    stop: Arc<AtomicBool>,
    holder: Option<thread::JoinHandle<()>>,
}

impl CpalSource {
    /// Open the default input device and start streaming.
    ///
    /// `sample_rate` is requested from the device; if the device cannot
    /// honor it the native rate is used and the engine sees that rate
    /// (recognizers are created with the same configured rate by the
    /// controller, so the two stay consistent).
    pub fn open(sample_rate: u32) -> Result<Self, CaptureError> {
        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<f32>>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CaptureError>>();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_holder = Arc::clone(&stop);

        let holder = thread::Builder::new()
            .name("cpal-stream".into())
            .spawn(move || {
                let stream = match Self::build_stream(sample_rate, chunk_tx) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while !stop_holder.load(Ordering::Acquire) {
                    thread::park_timeout(Duration::from_millis(50));
                }
                drop(stream);
            })
            .expect("failed to spawn cpal-stream thread");

        // Propagate setup failures synchronously so speechService.init can
        // report an IO failure to the caller.
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                chunk_rx,
                stop,
                holder: Some(holder),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::StreamClosed),
        }
    }

    fn build_stream(
        sample_rate: u32,
        tx: mpsc::Sender<Vec<f32>>,
    ) -> Result<cpal::Stream, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let mut config: cpal::StreamConfig = supported.into();
        config.sample_rate = cpal::SampleRate(sample_rate);

        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = if channels > 1 {
                    downmix(data, channels)
                } else {
                    data.to_vec()
                };
                // Ignore send errors; the receiver may have been dropped.
                let _ = tx.send(mono);
            },
            |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        Ok(stream)
    }
}

impl AudioSource for CpalSource {
    fn read_chunk(&mut self) -> Result<Option<Vec<f32>>, CaptureError> {
        match self.chunk_rx.recv_timeout(READ_TIMEOUT) {
            Ok(chunk) => Ok(Some(chunk)),
            Err(RecvTimeoutError::Timeout) => Ok(Some(Vec::new())),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::StreamClosed),
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(holder) = self.holder.take() {
            holder.thread().unpark();
            let _ = holder.join();
        }
    }
}

/// Average interleaved frames down to mono.
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

// ---------------------------------------------------------------------------
// ScriptedSource  (test-only)
// ---------------------------------------------------------------------------

/// Replays a fixed sequence of chunks, then reports exhaustion.
#[cfg(test)]
pub struct ScriptedSource {
    chunks: std::collections::VecDeque<Vec<f32>>,
    /// Optional per-chunk delay so tests can interleave control calls.
    pub chunk_delay: Duration,
}

#[cfg(test)]
impl ScriptedSource {
    pub fn new(chunks: Vec<Vec<f32>>) -> Self {
        Self {
            chunks: chunks.into(),
            chunk_delay: Duration::ZERO,
        }
    }

    /// `count` chunks of silence, `len` samples each.
    pub fn silence(count: usize, len: usize) -> Self {
        Self::new(vec![vec![0.0; len]; count])
    }
}

#[cfg(test)]
impl AudioSource for ScriptedSource {
    fn read_chunk(&mut self) -> Result<Option<Vec<f32>>, CaptureError> {
        if !self.chunk_delay.is_zero() {
            thread::sleep(self.chunk_delay);
        }
        Ok(self.chunks.pop_front())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
