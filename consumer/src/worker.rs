use frame_sink_common::frame::{FrameError, SharedFrame};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::buffer::{BufferError, FrameBuffer};
use crate::cancel::CancelToken;
use crate::retention::RetentionManager;
use crate::writer::{FrameWriter, WriteError};

/// What a worker did before it exited cleanly.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub frames_written: u64,
    pub write_failures: u64,
    pub buffer_capacity: usize,
}

/// The frame consumer loop: wait, copy, write, clean up, pause, repeat.
pub struct Worker {
    shared: Arc<SharedFrame>,
    cancel: CancelToken,
    writer: FrameWriter,
    retention: RetentionManager,
    delay: Duration,
    /// Generation of the last frame taken from the shared slot.
    last_seen: u64,
}

impl Worker {
    pub fn new(
        shared: Arc<SharedFrame>,
        cancel: CancelToken,
        writer: FrameWriter,
        retention: RetentionManager,
        delay: Duration,
        last_seen: u64,
    ) -> Self {
        Self {
            shared,
            cancel,
            writer,
            retention,
            delay,
            last_seen,
        }
    }

    /// Run until the stop flag is raised or the token is cancelled.
    ///
    /// The frame buffer and any open picture file are owned by this call and
    /// released on every exit path.
    pub fn run(mut self) -> Result<WorkerSummary, WorkerError> {
        let mut buffer = FrameBuffer::new();
        let mut summary = WorkerSummary::default();

        let result = self.run_loop(&mut buffer, &mut summary);

        summary.buffer_capacity = buffer.capacity();
        info!(
            frames = summary.frames_written,
            buffer_bytes = summary.buffer_capacity,
            buffer_growths = buffer.growths(),
            "cleaning up resources allocated by worker thread"
        );
        drop(buffer);

        result.map(|()| summary)
    }

    fn should_exit(&self) -> bool {
        self.shared.is_stopped() || self.cancel.is_cancelled()
    }

    fn run_loop(
        &mut self,
        buffer: &mut FrameBuffer,
        summary: &mut WorkerSummary,
    ) -> Result<(), WorkerError> {
        while !self.should_exit() {
            debug!("waiting for fresh frame");
            {
                let guard = self.shared.lock()?;
                let cancel = &self.cancel;
                let guard = self
                    .shared
                    .wait_for_frame(guard, self.last_seen, || cancel.is_cancelled())?;
                if self.should_exit() {
                    break;
                }

                if guard.len() > buffer.capacity() {
                    debug!(frame_bytes = guard.len(), "increasing frame buffer");
                }
                // On failure the guard is released before the error propagates.
                buffer.fill(guard.data())?;
                self.last_seen = guard.generation();
            }

            match self.writer.write(buffer.as_slice()) {
                Ok(path) => {
                    summary.frames_written += 1;
                    debug!(path = %path.display(), "saved picture");
                }
                Err(e) if e.is_fatal() => return Err(WorkerError::Clock(e)),
                Err(e) => {
                    summary.write_failures += 1;
                    warn!(error = %e, "could not save frame");
                }
            }

            match self.retention.enforce() {
                Ok(report) if report.deleted > 0 || report.failed > 0 => {
                    debug!(
                        matched = report.matched,
                        deleted = report.deleted,
                        failed = report.failed,
                        "retention pass"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, folder = %self.retention.folder().display(), "skipping retention pass");
                }
            }

            if !self.delay.is_zero() && self.cancel.sleep(self.delay) {
                break;
            }
        }

        Ok(())
    }
}

/// Failures that end the worker. Everything else is logged per frame.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("shared frame unavailable: {0}")]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("cannot name pictures: {0}")]
    Clock(WriteError),
}
