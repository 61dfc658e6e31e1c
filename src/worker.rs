//! Background analysis off the interaction thread.
//!
//! Large rasters make grouping the dominant cost, so the pipeline can run
//! on the rayon pool over an immutable snapshot. Every submission bumps a
//! generation counter; results are only accepted when their generation is
//! still the latest, so a new image always wins over an older computation.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use tracing::{debug, error, instrument};

use crate::analysis::{analyze, Analysis, CancelToken};
use crate::buffer::PixelBuffer;
use crate::config::EraserConfig;
use crate::error::{EraserError, Result};
use crate::keypoints::{Keypoint, Projection};

struct Completed {
    generation: u64,
    result: Result<Analysis>,
}

/// Runs analyses in the background, keeping only the newest result.
pub struct AnalysisWorker {
    generation: u64,
    pending: bool,
    current: Option<CancelToken>,
    tx: Sender<Completed>,
    rx: Receiver<Completed>,
}

impl Default for AnalysisWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisWorker {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            generation: 0,
            pending: false,
            current: None,
            tx,
            rx,
        }
    }

    /// Generation of the most recent submission.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Start analyzing a snapshot. Any earlier job is cancelled and its
    /// result will be discarded. Returns the new generation.
    #[instrument(skip_all, fields(width = buffer.width(), height = buffer.height()))]
    pub fn submit(
        &mut self,
        buffer: Arc<PixelBuffer>,
        keypoints: Vec<Keypoint>,
        projection: Projection,
        config: EraserConfig,
    ) -> u64 {
        self.spawn_job(move |token| analyze(&buffer, &keypoints, &projection, &config, 1, token))
    }

    /// Run `job` on the rayon pool under a new generation. A panicking job
    /// still reports back, as `AnalysisPanicked`, so `wait` never hangs.
    fn spawn_job<F>(&mut self, job: F) -> u64
    where
        F: FnOnce(&CancelToken) -> Result<Analysis> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let token = CancelToken::new(generation);
        self.current = Some(token.clone());
        self.pending = true;

        let tx = self.tx.clone();
        rayon::spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(|| job(&token))).unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                error!(generation, %message, "analysis panicked");
                Err(EraserError::AnalysisPanicked { generation, message })
            });
            // The worker may be gone already; nobody is waiting then
            let _ = tx.send(Completed { generation, result });
        });
        debug!(generation, "submitted analysis");
        generation
    }

    /// Cancel the running job, if any. Its result will never be returned.
    pub fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
            debug!(generation = token.generation(), "cancelled analysis");
        }
        self.pending = false;
    }

    /// Non-blocking: the latest result if it has arrived.
    pub fn try_take(&mut self) -> Option<Result<Analysis>> {
        while let Ok(done) = self.rx.try_recv() {
            if let Some(result) = self.accept(done) {
                return Some(result);
            }
        }
        None
    }

    /// Block until the latest submission completes. `None` when nothing is
    /// pending.
    pub fn wait(&mut self) -> Option<Result<Analysis>> {
        while self.pending {
            let done = self.rx.recv().ok()?;
            if let Some(result) = self.accept(done) {
                return Some(result);
            }
        }
        None
    }

    fn accept(&mut self, done: Completed) -> Option<Result<Analysis>> {
        if !self.pending || done.generation != self.generation {
            debug!(
                stale = done.generation,
                latest = self.generation,
                "discarding stale analysis"
            );
            return None;
        }
        self.pending = false;
        self.current = None;
        Some(done.result)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
