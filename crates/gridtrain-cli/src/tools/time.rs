use std::time::Duration;

/// Compact elapsed-time display for the watch spinner.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_seconds = elapsed.as_secs();

    if total_seconds >= 3600 {
        format!(
            "{}h {}m {}s",
            total_seconds / 3600,
            (total_seconds % 3600) / 60,
            total_seconds % 60
        )
    } else if total_seconds >= 60 {
        format!("{}m {}s", total_seconds / 60, total_seconds % 60)
    } else {
        format!("{}s", total_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0s");
        assert_eq!(format_elapsed(Duration::from_secs(42)), "42s");
        assert_eq!(format_elapsed(Duration::from_secs(302)), "5m 2s");
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "1h 2m 3s");
    }
}
