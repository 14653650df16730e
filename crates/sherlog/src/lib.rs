//! Sherlog - leveled file logging with buffered writes, time-based
//! rotation, and retention cleanup of aged archives

pub mod logger;
pub mod rotation;
pub mod writer;

pub use logger::Logger;
pub use writer::RotatingFileWriter;

pub use sherlog_core::{
    ConfigFormat, Error, FileWriterConfig, Level, LoggerConfig, NamingPolicy, Result,
    WriteErrorPolicy,
};
