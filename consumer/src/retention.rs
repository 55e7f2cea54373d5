use frame_sink_common::config::Retention;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Widths of the `YYYY_MM_DD_HH_mm_SS` fields in a picture name.
const STAMP_FIELDS: [usize; 6] = [4, 2, 2, 2, 2, 2];
const SEQ_DIGITS: usize = 9;

/// Sort key of a saved picture. Greater means more recent.
///
/// Ordering comes only from the file name: the zero-padded timestamp
/// (most significant field first), then the sequence number. Renamed files
/// or a clock that jumped backwards will be misclassified.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RetentionKey {
    stamp: String,
    seq: u64,
}

/// Parse a picture file name written by the frame writer. Anything else is `None`.
pub fn retention_key(file_name: &str) -> Option<RetentionKey> {
    let stem = file_name.strip_suffix(".jpg")?;
    let (stamp, seq) = stem.split_once("_picture_")?;

    let fields: Vec<&str> = stamp.split('_').collect();
    if fields.len() != STAMP_FIELDS.len() {
        return None;
    }
    let stamp_ok = fields
        .iter()
        .zip(STAMP_FIELDS)
        .all(|(field, width)| field.len() == width && is_digits(field));
    if !stamp_ok || seq.len() < SEQ_DIGITS || !is_digits(seq) {
        return None;
    }

    Some(RetentionKey {
        stamp: stamp.to_string(),
        seq: seq.parse().ok()?,
    })
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetentionReport {
    /// Picture files found in the folder.
    pub matched: usize,
    pub deleted: usize,
    /// Deletions that failed; those files are retried on the next pass.
    pub failed: usize,
}

/// Ring-buffer cleanup: keeps the most recent N pictures in a folder.
pub struct RetentionManager {
    folder: PathBuf,
    retention: Retention,
}

impl RetentionManager {
    pub fn new(folder: PathBuf, retention: Retention) -> Self {
        Self { folder, retention }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Delete every picture except the most recent N. Unrelated files are
    /// never touched. A failed deletion is logged and the pass continues.
    pub fn enforce(&self) -> Result<RetentionReport, RetentionError> {
        let keep = match self.retention {
            Retention::Unbounded => return Ok(RetentionReport::default()),
            Retention::Keep(n) => n.get(),
        };

        let entries = std::fs::read_dir(&self.folder).map_err(|source| RetentionError::ReadDir {
            path: self.folder.clone(),
            source,
        })?;

        let mut pictures: Vec<(RetentionKey, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let key = retention_key(entry.file_name().to_str()?)?;
                Some((key, entry.path()))
            })
            .collect();
        pictures.sort();

        let mut report = RetentionReport {
            matched: pictures.len(),
            ..RetentionReport::default()
        };
        let excess = pictures.len().saturating_sub(keep);

        for (_, path) in pictures.iter().take(excess) {
            match std::fs::remove_file(path) {
                Ok(()) => {
                    debug!(path = %path.display(), "deleted old picture");
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "could not delete file");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error("failed to scan folder {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
}
