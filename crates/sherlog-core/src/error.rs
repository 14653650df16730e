//! Error types for sherlog

use std::path::PathBuf;

/// Sherlog error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    #[error("Writer closed")]
    WriterClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Result type alias for sherlog
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidLevel("TRACE".to_string());
        assert_eq!(err.to_string(), "Invalid log level: TRACE");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
    }

    #[test]
    fn test_config_helper() {
        let err = Error::config("min level above max");
        assert_eq!(err.to_string(), "Config error: min level above max");
    }
}
