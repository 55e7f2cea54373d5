use frame_sink_common::config::{ConfigError, OutputConfig, Retention};
use frame_sink_common::frame::{FrameError, SharedFrame};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::hook::{PostSaveHook, ShellCommandHook};
use crate::retention::RetentionManager;
use crate::worker::{Worker, WorkerError, WorkerSummary};
use crate::writer::FrameWriter;

struct WorkerHandle {
    cancel: CancelToken,
    thread: JoinHandle<Result<WorkerSummary, WorkerError>>,
}

/// Owns the file output worker thread: settings, hook, start and stop.
pub struct FileOutput {
    folder: PathBuf,
    delay: Duration,
    retention: Retention,
    shared: Arc<SharedFrame>,
    hook: Option<Box<dyn PostSaveHook>>,
    worker: Option<WorkerHandle>,
    started: bool,
}

impl FileOutput {
    /// Validate `config` and freeze it. No thread is started yet.
    pub fn initialize(config: &OutputConfig, shared: Arc<SharedFrame>) -> Result<Self, OutputError> {
        config.validate()?;

        let folder = config.folder_path();
        let retention = config.retention();
        let hook = config
            .command
            .as_ref()
            .map(|template| Box::new(ShellCommandHook::new(template.as_str())) as Box<dyn PostSaveHook>);

        let keep = match retention {
            Retention::Unbounded => "not limited".to_string(),
            Retention::Keep(n) => n.to_string(),
        };
        info!(
            folder = %folder.display(),
            delay_ms = config.delay_ms,
            keep,
            command = config.command.as_deref().unwrap_or("disabled"),
            "file output configured"
        );

        Ok(Self {
            folder,
            delay: Duration::from_millis(config.delay_ms),
            retention,
            shared,
            hook,
            worker: None,
            started: false,
        })
    }

    /// Replace the post-save hook, e.g. with an in-process one.
    #[cfg(test)]
    pub fn with_post_save_hook(mut self, hook: impl PostSaveHook + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Spawn the worker thread. Only the first call does anything.
    ///
    /// Frames published before this call are not written; the worker starts
    /// with the next one.
    pub fn start(&mut self) -> Result<(), OutputError> {
        if self.started {
            warn!("file output already started, ignoring");
            return Ok(());
        }
        let last_seen = self.shared.generation()?;
        self.started = true;
        let cancel = CancelToken::new();
        let worker = Worker::new(
            Arc::clone(&self.shared),
            cancel.clone(),
            FrameWriter::new(self.folder.clone(), self.hook.take()),
            RetentionManager::new(self.folder.clone(), self.retention),
            self.delay,
            last_seen,
        );

        debug!("launching worker thread");
        let thread = thread::Builder::new()
            .name("file-output".into())
            .spawn(move || worker.run())
            .map_err(OutputError::Spawn)?;

        self.worker = Some(WorkerHandle { cancel, thread });
        Ok(())
    }

    /// Cancel the worker and wait until it has released its resources.
    /// Calling it again, or before `start`, does nothing.
    pub fn stop(&mut self) -> Result<(), OutputError> {
        let Some(handle) = self.worker.take() else {
            debug!("file output not running");
            return Ok(());
        };

        debug!("will cancel worker thread");
        handle.cancel.cancel();
        self.shared.interrupt();

        match handle.thread.join() {
            Ok(Ok(summary)) => {
                info!(
                    frames = summary.frames_written,
                    write_failures = summary.write_failures,
                    "file output stopped"
                );
            }
            Ok(Err(e)) => error!(error = %e, "file output worker terminated"),
            Err(_) => error!("file output worker panicked"),
        }
        Ok(())
    }

    /// True while the worker thread exists and has not exited on its own.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|handle| !handle.thread.is_finished())
    }
}

impl Drop for FileOutput {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("shared frame unavailable: {0}")]
    Frame(#[from] FrameError),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),
}
