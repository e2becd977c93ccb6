//! Human-readable formatting for progress and summary logs

/// Formats a duration in milliseconds, e.g. `850ms`, `4.25s`, `2m5s`, `1h3m`
pub fn format_duration(millis: u64) -> String {
    if millis < 1000 {
        return format!("{millis}ms");
    }

    if millis < 60_000 {
        let seconds = millis as f64 / 1000.0;
        return if seconds >= 10.0 {
            format!("{seconds:.1}s")
        } else {
            format!("{seconds:.2}s")
        };
    }

    let total_seconds = millis / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    match (hours, seconds) {
        (0, 0) => format!("{minutes}m"),
        (0, _) => format!("{minutes}m{seconds}s"),
        (_, 0) if minutes == 0 => format!("{hours}h"),
        (_, 0) => format!("{hours}h{minutes}m"),
        _ => format!("{hours}h{minutes}m{seconds}s"),
    }
}

/// Items per second over the elapsed time, `0.0/s` before anything has elapsed
pub fn format_rate(items: u64, elapsed_ms: u64) -> String {
    if elapsed_ms == 0 {
        return "0.0/s".to_string();
    }
    let per_second = items as f64 * 1000.0 / elapsed_ms as f64;
    format!("{per_second:.1}/s")
}

/// Completion percentage with one decimal
pub fn format_percent(done: usize, total: usize) -> String {
    if total == 0 {
        return "100.0%".to_string();
    }
    format!("{:.1}%", done as f64 * 100.0 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0ms");
        assert_eq!(format_duration(850), "850ms");
        assert_eq!(format_duration(4250), "4.25s");
        assert_eq!(format_duration(12_300), "12.3s");
        assert_eq!(format_duration(120_000), "2m");
        assert_eq!(format_duration(125_000), "2m5s");
        assert_eq!(format_duration(3_600_000), "1h");
        assert_eq!(format_duration(3_780_000), "1h3m");
        assert_eq!(format_duration(3_781_000), "1h3m1s");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(10, 0), "0.0/s");
        assert_eq!(format_rate(500, 2000), "250.0/s");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0, 0), "100.0%");
        assert_eq!(format_percent(1, 3), "33.3%");
    }
}
