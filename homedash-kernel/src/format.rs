//! Formatters partagés par les vues (octets, âge compact).

use chrono::{DateTime, Utc};

const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Unités binaires (base 1024), deux décimales : 1024 -> "1.00KB"
pub fn format_bytes(bytes: f64) -> String {
    if bytes <= 0.0 || !bytes.is_finite() {
        return "0B".to_string();
    }
    let mut size = bytes;
    let mut exp = 0;
    while size >= 1024.0 && exp < UNITS.len() - 1 {
        size /= 1024.0;
        exp += 1;
    }
    format!("{:.2}{}", size, UNITS[exp])
}

/// Âge compact : "42s", "5m", "3h", "2d", "4mo", "1y"
pub fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().unsigned_abs() as f64;
    let minutes = secs / 60.0;
    let hours = minutes / 60.0;
    let days = hours / 24.0;

    if secs < 45.0 {
        format!("{}s", secs as u64)
    } else if minutes < 45.0 {
        format!("{}m", rounded(minutes))
    } else if hours < 24.0 {
        format!("{}h", rounded(hours))
    } else if days < 30.0 {
        format!("{}d", rounded(days))
    } else if days < 365.0 {
        format!("{}mo", rounded(days / 30.0))
    } else {
        format!("{}y", rounded(days / 365.0))
    }
}

fn rounded(value: f64) -> u64 {
    (value.round() as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0.0), "0B");
        assert_eq!(format_bytes(512.0), "512.00B");
        assert_eq!(format_bytes(1024.0), "1.00KB");
        assert_eq!(format_bytes(1536.0), "1.50KB");
        assert_eq!(format_bytes(1_048_576.0), "1.00MB");
        assert_eq!(format_bytes(16.0 * 1024.0 * 1024.0 * 1024.0), "16.00GB");
    }

    #[test]
    fn test_format_bytes_caps_at_largest_unit() {
        let huge = 1024f64.powi(6);
        assert_eq!(format_bytes(huge), "1024.00PB");
    }

    #[test]
    fn test_format_age_buckets() {
        let now = Utc::now();
        assert_eq!(format_age(now - Duration::seconds(12), now), "12s");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5m");
        assert_eq!(format_age(now - Duration::minutes(50), now), "1h");
        assert_eq!(format_age(now - Duration::hours(5), now), "5h");
        assert_eq!(format_age(now - Duration::days(3), now), "3d");
        assert_eq!(format_age(now - Duration::days(95), now), "3mo");
        assert_eq!(format_age(now - Duration::days(800), now), "2y");
    }

    #[test]
    fn test_format_age_future_timestamps_are_symmetric() {
        let now = Utc::now();
        assert_eq!(format_age(now + Duration::minutes(10), now), "10m");
    }
}
