use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Side effect run synchronously after every saved picture.
pub trait PostSaveHook: Send {
    fn run_post_save_hook(&self, path: &Path) -> Result<HookStatus, HookError>;
}

/// Exit status of a post-save hook. `None` means it was killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookStatus {
    code: Option<i32>,
}

impl HookStatus {
    pub fn from_code(code: Option<i32>) -> Self {
        Self { code }
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs `<template> "<path>"` through `sh -c` and waits for it to exit.
pub struct ShellCommandHook {
    template: String,
}

impl ShellCommandHook {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// The shell line for `path`. Paths that are not UTF-8 are refused
    /// rather than passed on in a lossy form.
    pub fn command_line(&self, path: &Path) -> Result<String, HookError> {
        let path = path
            .to_str()
            .ok_or_else(|| HookError::NonUtf8Path(path.to_path_buf()))?;
        Ok(format!("{} \"{}\"", self.template, path))
    }
}

impl PostSaveHook for ShellCommandHook {
    fn run_post_save_hook(&self, path: &Path) -> Result<HookStatus, HookError> {
        let line = self.command_line(path)?;
        debug!(command = line, "calling post-save command");
        let status = Command::new("sh")
            .arg("-c")
            .arg(&line)
            .status()
            .map_err(HookError::Spawn)?;
        Ok(HookStatus::from_code(status.code()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("failed to spawn post-save command: {0}")]
    Spawn(std::io::Error),
    #[error("picture path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn path_is_appended_quoted() {
        let hook = ShellCommandHook::new("convert -resize 50%");
        let line = hook
            .command_line(Path::new("/tmp/a b/2024_01_02_03_04_05_picture_000000001.jpg"))
            .unwrap();
        assert_eq!(
            line,
            "convert -resize 50% \"/tmp/a b/2024_01_02_03_04_05_picture_000000001.jpg\""
        );
    }

    #[test]
    fn non_utf8_path_is_refused() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"/tmp/caf\xE9/x.jpg"));
        let err = ShellCommandHook::new("true").run_post_save_hook(path).unwrap_err();
        assert!(matches!(err, HookError::NonUtf8Path(p) if p == path));
    }

    #[test]
    fn receives_path_as_single_argument() {
        let dir = tempdir().unwrap();
        let picture = dir.path().join("with space.jpg");
        std::fs::write(&picture, b"jpeg").unwrap();

        let status = ShellCommandHook::new("test -f")
            .run_post_save_hook(&picture)
            .unwrap();
        assert!(status.success());
    }

    #[test]
    fn reports_non_zero_exit() {
        let dir = tempdir().unwrap();
        let status = ShellCommandHook::new("test -f")
            .run_post_save_hook(&dir.path().join("missing.jpg"))
            .unwrap();
        assert!(!status.success());
        assert_eq!(status.code(), Some(1));
    }

    #[test]
    fn exit_code_passed_through() {
        let status = ShellCommandHook::new("exit 3 #")
            .run_post_save_hook(Path::new("/tmp/x.jpg"))
            .unwrap();
        assert_eq!(status.code(), Some(3));
    }
}
