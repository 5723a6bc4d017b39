//! Shared helpers for the dropship CLI.
//!
//! Formatting, duration parsing and shell quoting used by the planner, the
//! SSH layer and the console reporter.

use std::time::Duration;

/// Formats a byte count into a human-readable string with appropriate units.
///
/// Divides by 1024 per step and labels the result `KB`, `MB` or `GB`, one
/// decimal place.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_bytes(500), "500 B");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(1073741824), "1.0 GB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Parses a short duration string such as `30s`, `5m`, `2h` or a bare number
/// of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .ok()?
            .checked_mul(3600)
            .map(Duration::from_secs)
    } else if let Some(minutes) = s.strip_suffix('m') {
        minutes
            .parse::<u64>()
            .ok()?
            .checked_mul(60)
            .map(Duration::from_secs)
    } else if let Some(seconds) = s.strip_suffix('s') {
        seconds.parse::<u64>().ok().map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Quotes a value for a POSIX shell using single quotes.
///
/// Embedded single quotes become `'\''`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(1073741824), "1.0 GB");
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_duration("45S"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("  90 "), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert_eq!(parse_duration("9999999999999999h"), None);
        assert_eq!(parse_duration("999999999999999999m"), None);
        assert_eq!(
            parse_duration("18446744073709551615s"),
            Some(Duration::from_secs(u64::MAX))
        );
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("2x"), None);
    }

    #[test]
    fn test_shell_quote_plain() {
        assert_eq!(shell_quote("/home/sa/release"), "'/home/sa/release'");
    }

    #[test]
    fn test_shell_quote_embedded_quote() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
