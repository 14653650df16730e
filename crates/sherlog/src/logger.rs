//! Leveled logger façade
//!
//! Formats a log line (identity, level, timestamp, call site) and fans it
//! out to an optional console sink plus one rotating file writer per
//! level. All rotation logic lives in [`crate::writer`]; this is string
//! formatting and dispatch.

use chrono::Local;
use sherlog_core::{FileWriterConfig, Level, LoggerConfig, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::panic::Location;
use std::path::Path;
use std::sync::Arc;
use tracing::error;

use crate::writer::RotatingFileWriter;

/// Leveled logger dispatching formatted lines to its sinks.
///
/// A sink write failure is reported via `tracing` and never propagated to
/// the logging call site; logging must not crash the caller.
pub struct Logger {
    config: LoggerConfig,
    sinks: BTreeMap<Level, Arc<RotatingFileWriter>>,
}

impl Logger {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config: config.normalize(),
            sinks: BTreeMap::new(),
        }
    }

    /// Register a file writer as the sink for its level and initialize
    /// it (opens the file, starts its background loops). Must be called
    /// from within a tokio runtime.
    pub fn with_file_writer(mut self, writer: RotatingFileWriter) -> Result<Self> {
        writer.init()?;
        self.sinks.insert(writer.level(), Arc::new(writer));
        Ok(self)
    }

    /// Register one file writer per level at or above the configured
    /// minimum, all built from the same writer configuration. The level
    /// is folded into each file name per the config's naming policy; an
    /// empty base name falls back to the logger's `program` identity.
    pub fn with_leveled_files(mut self, mut writer_config: FileWriterConfig) -> Result<Self> {
        if writer_config.name.is_empty() && !self.config.program.is_empty() {
            writer_config.name = self.config.program.clone();
        }
        for level in Level::ALL {
            if !self.enabled(level) {
                continue;
            }
            let writer = RotatingFileWriter::new(writer_config.clone(), level)?;
            writer.init()?;
            self.sinks.insert(level, Arc::new(writer));
        }
        Ok(self)
    }

    /// Whether a line at `level` would be logged.
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.config.min_level
            && self.config.max_level.map_or(true, |max| level <= max)
    }

    #[track_caller]
    pub fn debug(&self, msg: &str) {
        self.log(Level::Debug, msg);
    }

    #[track_caller]
    pub fn info(&self, msg: &str) {
        self.log(Level::Info, msg);
    }

    #[track_caller]
    pub fn warn(&self, msg: &str) {
        self.log(Level::Warn, msg);
    }

    #[track_caller]
    pub fn error(&self, msg: &str) {
        self.log(Level::Error, msg);
    }

    #[track_caller]
    pub fn fatal(&self, msg: &str) {
        self.log(Level::Fatal, msg);
    }

    /// Format and dispatch one line. The call site recorded in the line
    /// is the caller of the outermost `#[track_caller]` frame.
    #[track_caller]
    pub fn log(&self, level: Level, msg: &str) {
        if !self.enabled(level) {
            return;
        }
        let line = self.format_line(level, msg, Location::caller());

        if self.config.console {
            let _ = std::io::stdout().lock().write_all(line.as_bytes());
        }
        if let Some(writer) = self.sinks.get(&level) {
            if let Err(e) = writer.write(line.as_bytes()) {
                error!("log sink write failed for {}: {}", level, e);
            }
        }
    }

    /// Flush all file sinks to disk. Every sink is visited even when one
    /// fails; the first error is returned after the fan-out.
    pub fn flush(&self) -> Result<()> {
        let mut first_err = None;
        for writer in self.sinks.values() {
            if let Err(e) = writer.sync() {
                error!("log sink flush failed for {}: {}", writer.level(), e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Flush and close all file sinks, stopping their background loops.
    /// A failing sink does not keep the remaining ones open.
    pub fn close(&self) -> Result<()> {
        let mut first_err = None;
        for writer in self.sinks.values() {
            if let Err(e) = writer.close() {
                error!("log sink close failed for {}: {}", writer.level(), e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn format_line(&self, level: Level, msg: &str, loc: &Location<'_>) -> String {
        let mut prefix = String::new();
        if !self.config.host.is_empty() {
            prefix.push_str(&self.config.host);
            prefix.push(' ');
        }
        if self.config.pid != 0 {
            prefix.push_str(&self.config.pid.to_string());
            prefix.push(' ');
        }
        let caller_file = Path::new(loc.file())
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "???".to_string());
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        format!(
            "{}{} {} [{}:{}] {}\n",
            prefix,
            level,
            timestamp,
            caller_file,
            loc.line(),
            msg
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quiet_config() -> LoggerConfig {
        LoggerConfig {
            console: false,
            host: "web01".to_string(),
            pid: 4242,
            ..LoggerConfig::default()
        }
    }

    #[test]
    fn test_level_filtering() {
        let logger = Logger::new(LoggerConfig {
            min_level: Level::Warn,
            ..quiet_config()
        });
        assert!(!logger.enabled(Level::Debug));
        assert!(!logger.enabled(Level::Info));
        assert!(logger.enabled(Level::Warn));
        assert!(logger.enabled(Level::Fatal));
    }

    #[test]
    fn test_max_level_bound() {
        let logger = Logger::new(LoggerConfig {
            min_level: Level::Info,
            max_level: Some(Level::Error),
            ..quiet_config()
        });
        assert!(logger.enabled(Level::Error));
        assert!(!logger.enabled(Level::Fatal));
    }

    #[test]
    fn test_format_line_shape() {
        let logger = Logger::new(quiet_config());
        let line = logger.format_line(Level::Warn, "disk almost full", Location::caller());
        assert!(line.starts_with("web01 4242 WARNING "));
        assert!(line.contains("[logger.rs:"));
        assert!(line.ends_with("disk almost full\n"));
    }

    #[test]
    fn test_format_line_without_identity() {
        let logger = Logger::new(LoggerConfig {
            console: false,
            ..LoggerConfig::default()
        });
        let line = logger.format_line(Level::Info, "hello", Location::caller());
        assert!(line.starts_with("INFO "));
    }

    #[tokio::test]
    async fn test_fan_out_to_file_sink() {
        let dir = TempDir::new().unwrap();
        let writer_config = FileWriterConfig {
            dir: dir.path().to_path_buf(),
            name: "app".to_string(),
            ..FileWriterConfig::default()
        };
        let writer = RotatingFileWriter::new(writer_config, Level::Info).unwrap();
        let path = writer.path();

        let logger = Logger::new(quiet_config()).with_file_writer(writer).unwrap();
        logger.info("service started");
        // a debug line has no sink of its own and must not end up in the
        // info file
        logger.debug("noise");
        logger.flush().unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("INFO"));
        assert!(content.contains("service started"));
        assert!(!content.contains("noise"));
        logger.close().unwrap();
    }

    #[tokio::test]
    async fn test_leveled_files_one_sink_per_level() {
        let dir = TempDir::new().unwrap();
        let writer_config = FileWriterConfig {
            dir: dir.path().to_path_buf(),
            name: "app".to_string(),
            ..FileWriterConfig::default()
        };
        let logger = Logger::new(LoggerConfig {
            min_level: Level::Warn,
            ..quiet_config()
        })
        .with_leveled_files(writer_config)
        .unwrap();

        logger.warn("caution");
        logger.error("broken");
        logger.flush().unwrap();

        let warn_file = std::fs::read_to_string(dir.path().join("app.warning")).unwrap();
        let error_file = std::fs::read_to_string(dir.path().join("app.error")).unwrap();
        assert!(warn_file.contains("caution"));
        assert!(!warn_file.contains("broken"));
        assert!(error_file.contains("broken"));
        // filtered levels get no file at all
        assert!(!dir.path().join("app.debug").exists());
        logger.close().unwrap();
    }

    #[tokio::test]
    async fn test_leveled_files_fall_back_to_program_name() {
        let dir = TempDir::new().unwrap();
        let writer_config = FileWriterConfig {
            dir: dir.path().to_path_buf(),
            name: String::new(),
            ..FileWriterConfig::default()
        };
        let logger = Logger::new(LoggerConfig {
            min_level: Level::Error,
            program: "myapp".to_string(),
            ..quiet_config()
        })
        .with_leveled_files(writer_config)
        .unwrap();

        logger.error("boom");
        logger.flush().unwrap();

        assert!(dir.path().join("myapp.error").exists());
        logger.close().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_flush_visits_all_sinks_despite_failure() {
        let dir = TempDir::new().unwrap();
        let cfg = |name: &str| FileWriterConfig {
            dir: dir.path().to_path_buf(),
            name: name.to_string(),
            ..FileWriterConfig::default()
        };
        let breakable = RotatingFileWriter::new(cfg("app"), Level::Info).unwrap();
        let healthy = RotatingFileWriter::new(cfg("app"), Level::Error).unwrap();
        let healthy_path = healthy.path();

        let logger = Logger::new(quiet_config())
            .with_file_writer(breakable)
            .unwrap()
            .with_file_writer(healthy)
            .unwrap();

        logger.info("buffered");
        logger.error("must land");

        // make the info sink unflushable: its active path becomes a
        // dangling symlink into a directory that does not exist, so the
        // drain-time recreate fails even for root
        let info_path = dir.path().join("app.info");
        std::fs::remove_file(&info_path).unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing/app.info"), &info_path).unwrap();

        // the info sink fails first (sinks fan out in level order), the
        // error sink must still be flushed
        assert!(logger.flush().is_err());
        let content = std::fs::read_to_string(&healthy_path).unwrap();
        assert!(content.contains("must land"));
        // close reports the broken sink but still stops every sink
        assert!(logger.close().is_err());
    }
}
