/// Local wall-clock HH:MM:SS for a unix timestamp.
pub fn format_clock(secs: i64) -> String {
    match chrono::DateTime::from_timestamp(secs, 0) {
        Some(dt) => dt
            .with_timezone(&chrono::Local)
            .format("%H:%M:%S")
            .to_string(),
        None => "--:--:--".to_string(),
    }
}

/// Relative "ago" label for history rows; falls back to clock time
/// once the entry is more than a day old.
pub fn format_relative(now_secs: i64, then_secs: i64) -> String {
    let diff = (now_secs - then_secs).max(0);
    if diff < 60 {
        format!("{diff} seconds ago")
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format_clock(then_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::format_relative;

    #[test]
    fn fresh_entries_count_seconds() {
        assert_eq!(format_relative(1_000_045, 1_000_000), "45 seconds ago");
    }

    #[test]
    fn minute_boundary() {
        assert_eq!(format_relative(1_000_059, 1_000_000), "59 seconds ago");
        assert_eq!(format_relative(1_000_060, 1_000_000), "1 minutes ago");
    }

    #[test]
    fn hour_boundary() {
        assert_eq!(format_relative(1_003_599, 1_000_000), "59 minutes ago");
        assert_eq!(format_relative(1_003_600, 1_000_000), "1 hours ago");
    }

    #[test]
    fn future_timestamps_clamp_to_now() {
        assert_eq!(format_relative(1_000_000, 1_000_030), "0 seconds ago");
    }
}
