//! Human time intervals: `"30m"`, `"1h"`, `"2d"`.

use chrono::Duration;

/// Parse an interval like `"10m"`, `"1h"`, `"24h"`, `"10d"`.
///
/// Returns `None` for anything else, including zero-length intervals.
pub fn parse_interval(input: &str) -> Option<Duration> {
    let s = input.trim().to_ascii_lowercase();
    let unit = s.chars().last()?;
    let digits = s.strip_suffix(unit)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: i64 = digits.parse().ok()?;
    if value == 0 {
        return None;
    }
    match unit {
        'm' => Duration::try_minutes(value),
        'h' => Duration::try_hours(value),
        'd' => Duration::try_days(value),
        _ => None,
    }
}

/// "Last 5 minutes", "Last 1 hour", "Last 2 days".
pub fn describe_interval(interval: Duration) -> String {
    let secs = interval.num_seconds();
    let (n, unit) = if secs < 3600 {
        (secs / 60, "minute")
    } else if secs < 86_400 {
        (secs / 3600, "hour")
    } else {
        (secs / 86_400, "day")
    };
    let plural = if n == 1 { "" } else { "s" };
    format!("Last {n} {unit}{plural}")
}
