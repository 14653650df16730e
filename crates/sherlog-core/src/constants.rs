//! Constants and default values for sherlog

/// Default log directory when none is configured
pub const DEFAULT_LOG_DIR: &str = "./";

/// Default base file name when none is configured
pub const DEFAULT_LOG_NAME: &str = "sherlog";

/// Default in-memory write buffer size in bytes (4KB)
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Default forced flush+fsync cadence in seconds
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 3;

/// Default rotation cadence in seconds (24 hours)
pub const DEFAULT_CUT_INTERVAL_SECS: i64 = 86400;

/// Historical size-rotation threshold in bytes (1800MB). Size rotation
/// is opt-in (`max_size_bytes` 0 disables it); callers wanting the old
/// threshold pass this value.
pub const DEFAULT_MAX_SIZE: u64 = 1024 * 1024 * 1800;

/// Placeholder token substituted with the level name in file name templates
pub const LEVEL_PLACEHOLDER: &str = "{level}";

/// Mode for created log directories (unix)
pub const LOG_DIR_MODE: u32 = 0o777;

/// Mode for log files reopened for append (unix)
pub const LOG_FILE_MODE: u32 = 0o666;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(DEFAULT_BUFFER_SIZE, 4096);
        assert_eq!(DEFAULT_FLUSH_INTERVAL_SECS, 3);
        assert_eq!(DEFAULT_CUT_INTERVAL_SECS, 86400);
        assert_eq!(DEFAULT_MAX_SIZE, 1_887_436_800);
    }
}
