//! Single-worker task offload for long-running engine calls.
//!
//! [`TaskRunner`] owns one dedicated worker thread.  Jobs submitted to the
//! same runner execute in submission order and never overlap.  The job's
//! outcome is not delivered on the worker: it is wrapped in a completion
//! closure and sent over a channel back to whatever context drains that
//! channel (the command-dispatch loop), so registry mutation and caller
//! notification always happen there.
//!
//! A panic inside a job is caught on the worker and converted into the
//! failure path — the worker thread itself never dies to a job fault.
//!
//! Model loading is the only operation expensive enough to go through here;
//! recognizer creation, configuration and audio feeds run synchronously on
//! the dispatch context.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;

use tokio::sync::mpsc::UnboundedSender;

use crate::engine::EngineError;

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// A finished job, ready to be applied to the dispatch context `C`.
///
/// The dispatch loop receives these from the completion channel and invokes
/// them with `&mut C` — typically the session controller, so the completion
/// can insert the loaded model into the registry and emit a notification.
pub type Completion<C> = Box<dyn FnOnce(&mut C) + Send>;

type Job = Box<dyn FnOnce() + Send>;

// ---------------------------------------------------------------------------
// TaskRunner
// ---------------------------------------------------------------------------

/// Offloads blocking engine work to a dedicated worker thread.
///
/// `C` is the context type completions are applied to on the dispatch side.
pub struct TaskRunner<C> {
    work_tx: Option<mpsc::Sender<Job>>,
    completion_tx: UnboundedSender<Completion<C>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl<C: 'static> TaskRunner<C> {
    /// Create a runner whose completions are delivered over `completion_tx`.
    ///
    /// The receiving half belongs to the dispatch loop; the runner never
    /// touches `C` itself.
    pub fn new(completion_tx: UnboundedSender<Completion<C>>) -> Self {
        let (work_tx, work_rx) = mpsc::channel::<Job>();

        let worker = thread::Builder::new()
            .name("engine-worker".into())
            .spawn(move || {
                while let Ok(job) = work_rx.recv() {
                    job();
                }
                log::debug!("task: work channel closed, worker exiting");
            })
            .expect("failed to spawn engine worker thread");

        Self {
            work_tx: Some(work_tx),
            completion_tx,
            worker: Some(worker),
        }
    }

    /// Execute `work` on the worker thread; deliver exactly one of
    /// `on_success` / `on_failure` through the completion channel.
    ///
    /// Jobs run in submission order.  If the dispatch side has dropped its
    /// receiver the completion is discarded — there is no one left to tell.
    pub fn run<T>(
        &self,
        work: impl FnOnce() -> Result<T, EngineError> + Send + 'static,
        on_success: impl FnOnce(&mut C, T) + Send + 'static,
        on_failure: impl FnOnce(&mut C, EngineError) + Send + 'static,
    ) where
        T: Send + 'static,
    {
        let completion_tx = self.completion_tx.clone();

        let job: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|panic| {
                Err(EngineError::ModelLoad(format!(
                    "task panicked: {}",
                    panic_message(&panic)
                )))
            });

            let completion: Completion<C> = match outcome {
                Ok(value) => Box::new(move |ctx: &mut C| on_success(ctx, value)),
                Err(e) => Box::new(move |ctx: &mut C| on_failure(ctx, e)),
            };

            if completion_tx.send(completion).is_err() {
                log::warn!("task: completion receiver dropped, outcome discarded");
            }
        });

        if let Some(tx) = &self.work_tx {
            // Send only fails after Drop has started, which cannot overlap
            // with a live &self.
            let _ = tx.send(job);
        }
    }
}

impl<C> Drop for TaskRunner<C> {
    fn drop(&mut self) {
        // Close the work queue, then wait for in-flight jobs to finish so
        // their completions are on the channel before the runner is gone.
        self.work_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
