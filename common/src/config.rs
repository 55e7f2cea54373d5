use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the file output worker.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Pause after each saved frame, in milliseconds. 0 disables it.
    #[serde(default)]
    pub delay_ms: u64,
    /// Maximum number of pictures to keep. Absent means not limited.
    #[serde(default)]
    pub ring_size: Option<usize>,
    /// Command run after each saved picture; the path is appended quoted.
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_boundary")]
    pub boundary: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            folder: default_folder(),
            delay_ms: 0,
            ring_size: None,
            command: None,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            boundary: default_boundary(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// How many saved pictures the retention pass keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Unbounded,
    Keep(NonZeroUsize),
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.output.validate()?;
        if self.source.boundary.is_empty() {
            return Err(ConfigError::Invalid("source.boundary must not be empty".into()));
        }
        Ok(())
    }
}

impl OutputConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.folder.is_empty() {
            return Err(ConfigError::Invalid("output.folder must not be empty".into()));
        }
        if self.ring_size == Some(0) {
            return Err(ConfigError::Invalid(
                "output.ring_size must be at least 1 (omit it for no limit)".into(),
            ));
        }
        if let Some(command) = &self.command {
            if command.trim().is_empty() {
                return Err(ConfigError::Invalid("output.command must not be empty".into()));
            }
        }
        Ok(())
    }

    /// The target folder with trailing separators removed. "/" stays "/".
    pub fn folder_path(&self) -> PathBuf {
        let trimmed = self.folder.trim_end_matches('/');
        if trimmed.is_empty() && self.folder.starts_with('/') {
            PathBuf::from("/")
        } else {
            PathBuf::from(trimmed)
        }
    }

    pub fn retention(&self) -> Retention {
        match self.ring_size.and_then(NonZeroUsize::new) {
            Some(n) => Retention::Keep(n),
            None => Retention::Unbounded,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_folder() -> String {
    "/tmp".into()
}
fn default_boundary() -> String {
    "--frame".into()
}
fn default_log_level() -> String {
    "info".into()
}
