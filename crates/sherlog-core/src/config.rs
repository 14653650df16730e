//! Configuration surface for sherlog
//!
//! Supports configuration file formats:
//! - TOML (.toml)
//! - JSON (.json)

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::level::Level;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// How the level name is folded into the active file name.
///
/// Two schemes exist in the wild; which one a deployment gets must be a
/// deliberate choice, so both are named policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingPolicy {
    /// Substitute a `{level}` token in the name template; a template
    /// without the token is used unchanged.
    Placeholder,
    /// Append the lower-cased level name to the template: `name.level`.
    #[default]
    Suffix,
}

/// What to do when appending to the write buffer fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteErrorPolicy {
    /// Return the error to the caller (default).
    #[default]
    Propagate,
    /// Flush what we can, report, and exit the process with status 2.
    /// Matches the hard-exit behavior of older deployments; opt-in only.
    Exit,
}

// Default value functions for serde
fn default_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}

fn default_name() -> String {
    DEFAULT_LOG_NAME.to_string()
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_flush_interval() -> u64 {
    DEFAULT_FLUSH_INTERVAL_SECS
}

fn default_cut_interval() -> i64 {
    DEFAULT_CUT_INTERVAL_SECS
}

fn default_min_level() -> Level {
    Level::MIN
}

fn default_console() -> bool {
    true
}

/// Configuration for a single rotating file writer.
///
/// Immutable after construction; `normalize` applies defaults to
/// zero/empty fields the same way for programmatic and file-loaded
/// configurations.
#[derive(Debug, Clone, Deserialize)]
pub struct FileWriterConfig {
    /// Target folder for active and rotated files; created if missing
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    /// Base file name; may embed a `{level}` placeholder
    #[serde(default = "default_name")]
    pub name: String,
    /// In-memory write buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Cadence of forced flush+fsync in seconds
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    /// Rotation cadence in seconds; 0 disables time-based rotation
    #[serde(default = "default_cut_interval")]
    pub cut_interval_secs: i64,
    /// Retention window in units of cut intervals; 0 disables cleanup
    #[serde(default)]
    pub max_files: u64,
    /// Size-rotation threshold in bytes; 0 disables size rotation
    #[serde(default)]
    pub max_size_bytes: u64,
    /// How the level is folded into the file name
    #[serde(default)]
    pub naming: NamingPolicy,
    /// Behavior on buffer write failure
    #[serde(default)]
    pub on_write_error: WriteErrorPolicy,
}

impl Default for FileWriterConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            name: default_name(),
            buffer_size: default_buffer_size(),
            flush_interval_secs: default_flush_interval(),
            cut_interval_secs: default_cut_interval(),
            max_files: 0,
            max_size_bytes: 0,
            naming: NamingPolicy::default(),
            on_write_error: WriteErrorPolicy::default(),
        }
    }
}

impl FileWriterConfig {
    /// Apply defaults to zero/empty fields and validate the rest.
    ///
    /// A cut interval of 0 is meaningful (time-based rotation disabled)
    /// and is left alone; a negative one is rejected.
    pub fn normalize(mut self) -> Result<Self> {
        if self.dir.as_os_str().is_empty() {
            self.dir = default_dir();
        }
        if self.name.is_empty() {
            self.name = default_name();
        }
        if self.buffer_size == 0 {
            self.buffer_size = default_buffer_size();
        }
        if self.flush_interval_secs == 0 {
            self.flush_interval_secs = default_flush_interval();
        }
        if self.cut_interval_secs < 0 {
            return Err(Error::config(format!(
                "cut interval must be >= 0, got {}",
                self.cut_interval_secs
            )));
        }
        Ok(self)
    }

    /// Load from a TOML or JSON file
    pub fn load(path: &Path) -> Result<Self> {
        load_file::<Self>(path)?.normalize()
    }
}

/// Configuration for the leveled logger façade.
///
/// Identity fields (`host`, `pid`, `program`) are injected here rather
/// than read from process-wide globals.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggerConfig {
    /// Minimum severity that gets logged
    #[serde(default = "default_min_level")]
    pub min_level: Level,
    /// Optional upper severity bound; ignored (with a warning) when it
    /// falls below `min_level`
    #[serde(default)]
    pub max_level: Option<Level>,
    /// Host name stamped on every line
    #[serde(default)]
    pub host: String,
    /// Process id of the owning process
    #[serde(default)]
    pub pid: u32,
    /// Program name, used as a fallback base file name
    #[serde(default)]
    pub program: String,
    /// Whether to mirror lines to stdout
    #[serde(default = "default_console")]
    pub console: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: default_min_level(),
            max_level: None,
            host: String::new(),
            pid: 0,
            program: String::new(),
            console: default_console(),
        }
    }
}

impl LoggerConfig {
    /// Validate the level bounds. An inverted min/max pair is reported
    /// and the bounds option ignored, not escalated.
    pub fn normalize(mut self) -> Self {
        if let Some(max) = self.max_level {
            if self.min_level > max {
                warn!(
                    "ignoring level bounds: min {} is above max {}",
                    self.min_level, max
                );
                self.min_level = default_min_level();
                self.max_level = None;
            }
        }
        self
    }

    /// Load from a TOML or JSON file
    pub fn load(path: &Path) -> Result<Self> {
        Ok(load_file::<Self>(path)?.normalize())
    }
}

fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(Error::ConfigNotFound(path.to_path_buf()));
    }
    let format = ConfigFormat::from_path(path)
        .ok_or_else(|| Error::UnsupportedFormat(path.to_path_buf()))?;
    let content = std::fs::read_to_string(path)?;
    match format {
        ConfigFormat::Toml => Ok(toml::from_str(&content)?),
        ConfigFormat::Json => Ok(serde_json::from_str(&content)?),
    }
}
