use chrono::{DateTime, Utc};

/// Whole minutes between two moments, truncated toward zero. Time running backwards counts as
/// nothing.
pub fn elapsed_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    (end - start).num_minutes().max(0) as u64
}

/// Formats minutes the way they are shown in the status line, e.g. `3h 04m` or `12m`.
pub fn format_minutes(minutes: f64) -> String {
    let minutes = if minutes.is_finite() && minutes > 0. {
        minutes.trunc() as u64
    } else {
        0
    };
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m}m"),
        (h, m) => format!("{h}h {m:02}m"),
    }
}
