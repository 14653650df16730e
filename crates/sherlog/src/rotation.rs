//! Rotation policy: boundary arithmetic and file naming
//!
//! Pure computations over configuration and timestamps; no I/O and no
//! shared state. The writer decides *when* to call these, this module
//! decides *what* the answer is.

use chrono::{DateTime, Local};
use sherlog_core::{constants::LEVEL_PLACEHOLDER, Level, NamingPolicy};

/// Smallest multiple of `cut_interval` strictly greater than `unix_time`.
///
/// `cut_interval` must be positive; callers guard the disabled (0) case.
pub fn next_cut_boundary(unix_time: i64, cut_interval: i64) -> i64 {
    debug_assert!(cut_interval > 0);
    (unix_time / cut_interval + 1) * cut_interval
}

/// Resolve the active file name for a level under the given naming policy.
pub fn active_file_name(template: &str, level: Level, naming: NamingPolicy) -> String {
    match naming {
        // a template without the token passes through unchanged
        NamingPolicy::Placeholder => template.replace(LEVEL_PLACEHOLDER, level.file_suffix()),
        NamingPolicy::Suffix => format!("{}.{}", template, level.file_suffix()),
    }
}

/// Name for an archived file: the active name plus a date suffix for the
/// boundary that elapsed at `unix_time`.
pub fn rotated_file_name(active_name: &str, cut_interval: i64, unix_time: i64) -> String {
    let dt: DateTime<Local> = DateTime::from_timestamp(unix_time, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .with_timezone(&Local);
    format!(
        "{}.{}",
        active_name,
        dt.format(suffix_format(cut_interval))
    )
}

/// Date-suffix granularity derived from the cut interval, so sub-hour
/// rotations never produce ambiguous names.
fn suffix_format(cut_interval: i64) -> &'static str {
    if cut_interval < 60 {
        "%Y%m%d%H%M%S"
    } else if cut_interval <= 3600 {
        "%Y%m%d%H%M"
    } else if cut_interval < 86400 {
        "%Y%m%d%H"
    } else {
        "%Y%m%d"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_boundary_is_strictly_greater_and_aligned() {
        for &interval in &[1i64, 10, 60, 3600, 86400] {
            for &t in &[0i64, 1, 59, 3599, 86399, 86400, 1_700_000_000] {
                let next = next_cut_boundary(t, interval);
                assert!(next > t, "boundary {} not after {}", next, t);
                assert_eq!(next % interval, 0);
                // smallest such multiple
                assert!(next - t <= interval);
            }
        }
    }

    #[test]
    fn test_next_boundary_exact_multiple() {
        assert_eq!(next_cut_boundary(120, 60), 180);
        assert_eq!(next_cut_boundary(119, 60), 120);
    }

    #[test]
    fn test_active_name_suffix_policy() {
        assert_eq!(
            active_file_name("myapp", Level::Debug, NamingPolicy::Suffix),
            "myapp.debug"
        );
        assert_eq!(
            active_file_name("myapp", Level::Warn, NamingPolicy::Suffix),
            "myapp.warning"
        );
    }

    #[test]
    fn test_active_name_placeholder_policy() {
        assert_eq!(
            active_file_name("myapp-{level}.log", Level::Info, NamingPolicy::Placeholder),
            "myapp-info.log"
        );
        // no token: template unchanged
        assert_eq!(
            active_file_name("myapp.log", Level::Info, NamingPolicy::Placeholder),
            "myapp.log"
        );
    }

    fn suffix_digits(name: &str) -> usize {
        name.rsplit('.').next().unwrap().len()
    }

    #[test]
    fn test_rotated_name_granularity() {
        let t = 1_700_000_000;
        // 30s cut: second precision
        assert_eq!(suffix_digits(&rotated_file_name("a.log", 30, t)), 14);
        // hourly cut: minute precision
        assert_eq!(suffix_digits(&rotated_file_name("a.log", 3600, t)), 12);
        // intermediate cut: hour precision
        assert_eq!(suffix_digits(&rotated_file_name("a.log", 7200, t)), 10);
        // daily cut: day precision
        assert_eq!(suffix_digits(&rotated_file_name("a.log", 86400, t)), 8);
    }

    #[test]
    fn test_rotated_name_keeps_active_prefix() {
        let name = rotated_file_name("myapp.debug", 86400, 1_700_000_000);
        assert!(name.starts_with("myapp.debug."));
    }
}
