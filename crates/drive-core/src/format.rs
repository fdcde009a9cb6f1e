use chrono::DateTime;

const DAY_SECS: u64 = 24 * 60 * 60;

pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let units = ["B", "KB", "MB", "GB", "TB"];
    let i = (bytes as f64).log(1024.0).floor() as usize;
    let i = i.min(units.len() - 1);
    let val = bytes as f64 / 1024f64.powi(i as i32);
    if i == 0 {
        format!("{} {}", val as u64, units[i])
    } else {
        format!("{:.1} {}", val, units[i])
    }
}

/// Age of a timestamp in whole days, relative to `now` (both Unix seconds).
///
/// Timestamps in the future count as today.
pub fn days_between(modified: u64, now: u64) -> u64 {
    now.saturating_sub(modified) / DAY_SECS
}

/// "Today", "Yesterday", "3 days ago", "2 weeks ago", else the calendar date.
pub fn format_relative_date(modified: u64, now: u64) -> String {
    match days_between(modified, now) {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        d if d < 7 => format!("{} days ago", d),
        d if d < 30 => {
            let weeks = d / 7;
            if weeks == 1 {
                "1 week ago".to_string()
            } else {
                format!("{} weeks ago", weeks)
            }
        }
        _ => DateTime::from_timestamp(modified as i64, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    }
}
