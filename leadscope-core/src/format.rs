//! Formatting helpers shared across read models.

use chrono::{DateTime, Utc};

/// Format a duration in seconds as "Xh Ym" or "Ym".
pub fn format_duration(total_seconds: i64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Format a timestamp as a display date (e.g., "Aug 6, 2026").
pub fn format_date(ts: DateTime<Utc>) -> String {
    ts.format("%b %-d, %Y").to_string()
}

/// Format an optional timestamp as a display date, or None when missing.
pub fn format_date_opt(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(format_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn duration_under_an_hour_omits_hours() {
        assert_eq!(format_duration(0), "0m");
        assert_eq!(format_duration(200), "3m");
        assert_eq!(format_duration(3599), "59m");
    }

    #[test]
    fn duration_with_hours() {
        assert_eq!(format_duration(3600), "1h 0m");
        assert_eq!(format_duration(2820), "47m");
        assert_eq!(format_duration(7380), "2h 3m");
    }

    #[test]
    fn date_display() {
        let ts = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();
        assert_eq!(format_date(ts), "Aug 6, 2026");
    }
}
