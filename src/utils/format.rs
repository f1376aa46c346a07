//! Human-readable rendering of sizes, speeds and durations

use std::time::Duration;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Shown instead of a number when no meaningful estimate exists
pub const INDETERMINATE: &str = "calculating...";

/// Format a remaining-time estimate. Seconds are rounded up below the hour scale
/// and dropped above it.
pub fn format_time_remaining(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return INDETERMINATE.to_string();
    }

    if seconds < 60.0 {
        format!("{}s", seconds.ceil() as u64)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor() as u64;
        let remaining_seconds = (seconds % 60.0).ceil() as u64;
        format!("{}m {}s", minutes, remaining_seconds)
    } else {
        let hours = (seconds / 3600.0).floor() as u64;
        let minutes = ((seconds % 3600.0) / 60.0).floor() as u64;
        format!("{}h {}m", hours, minutes)
    }
}

/// Format an elapsed duration, e.g. "1h 2m 3s", "4m 5s", "6s"
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes % 60, seconds % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

/// Format a byte count with binary units and at most two decimals
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rendered = format!("{:.2}", value);
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rendered, UNITS[unit])
}

/// Format a throughput in bytes/s as MB/s
pub fn format_speed(bytes_per_sec: f64) -> String {
    let mbps = if bytes_per_sec.is_finite() {
        bytes_per_sec / BYTES_PER_MB
    } else {
        0.0
    };
    format!("{:.2} MB/s", mbps)
}
