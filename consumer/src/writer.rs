use chrono::{DateTime, Local, TimeZone};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::hook::PostSaveHook;

/// File name for a picture taken at `at` with sequence number `seq`.
/// e.g. "2026_02_18_09_30_00_picture_000000042.jpg"
pub fn frame_file_name(at: &DateTime<Local>, seq: u64) -> String {
    format!("{}_picture_{seq:09}.jpg", at.format("%Y_%m_%d_%H_%M_%S"))
}

/// Writes frames to timestamped files and runs the post-save hook.
///
/// The sequence number starts at 0 and advances once per successful write
/// for the lifetime of the writer.
pub struct FrameWriter {
    folder: PathBuf,
    next_seq: u64,
    hook: Option<Box<dyn PostSaveHook>>,
}

impl FrameWriter {
    pub fn new(folder: PathBuf, hook: Option<Box<dyn PostSaveHook>>) -> Self {
        Self {
            folder,
            next_seq: 0,
            hook,
        }
    }

    #[cfg(test)]
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn write(&mut self, frame: &[u8]) -> Result<PathBuf, WriteError> {
        let now = local_now()?;
        self.write_at(frame, &now)
    }

    fn write_at(&mut self, frame: &[u8], at: &DateTime<Local>) -> Result<PathBuf, WriteError> {
        let path = self.folder.join(frame_file_name(at, self.next_seq));
        debug!(path = %path.display(), bytes = frame.len(), "writing file");

        let mut file = create_picture(&path).map_err(|source| WriteError::Create {
            path: path.clone(),
            source,
        })?;
        file.write_all(frame).map_err(|source| WriteError::Write {
            path: path.clone(),
            source,
        })?;
        drop(file);
        self.next_seq += 1;

        if let Some(hook) = &self.hook {
            run_hook(hook.as_ref(), &path);
        }

        Ok(path)
    }
}

fn run_hook(hook: &dyn PostSaveHook, path: &Path) {
    match hook.run_post_save_hook(path) {
        Ok(status) if status.success() => {}
        Ok(status) => {
            warn!(path = %path.display(), code = ?status.code(), "post-save command failed");
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "post-save command could not run");
        }
    }
}

/// Owner read/write, group and other read.
fn create_picture(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path)
}

fn local_now() -> Result<DateTime<Local>, WriteError> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| WriteError::Clock(e.to_string()))?;
    let secs = i64::try_from(since_epoch.as_secs())
        .map_err(|e| WriteError::Clock(e.to_string()))?;
    Local
        .timestamp_opt(secs, since_epoch.subsec_nanos())
        .single()
        .ok_or_else(|| WriteError::Clock(format!("no local time for {secs}s since epoch")))
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("could not read the clock: {0}")]
    Clock(String),
    #[error("could not open the file {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write to file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl WriteError {
    /// Without a clock no picture can be named, so the worker has to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WriteError::Clock(_))
    }
}
