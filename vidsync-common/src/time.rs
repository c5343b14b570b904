//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Seconds since the Unix epoch with millisecond resolution
///
/// Used as the `timestamp` field of sync snapshots.
pub fn unix_timestamp() -> f64 {
    now().timestamp_millis() as f64 / 1000.0
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unix_timestamp_is_recent() {
        let ts = unix_timestamp();
        // 2000-01-01 < ts < 2100-01-01
        assert!(ts > 946_684_800.0);
        assert!(ts < 4_102_444_800.0);
    }

    #[test]
    fn test_unix_timestamp_matches_now() {
        let ts = unix_timestamp();
        let secs = now().timestamp() as f64;
        assert!((ts - secs).abs() < 2.0);
    }

    #[tokio::test]
    async fn test_unix_timestamp_advances() {
        let t1 = unix_timestamp();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let t2 = unix_timestamp();
        assert!(t2 > t1);
    }

    #[test]
    fn test_millis_to_duration() {
        assert_eq!(millis_to_duration(0), Duration::ZERO);
        assert_eq!(millis_to_duration(1000), Duration::from_secs(1));
        assert_eq!(millis_to_duration(500).as_millis(), 500);
    }
}
