//! Timestamp and media-time utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Media position in seconds → alignment time in milliseconds
pub fn seconds_to_millis(seconds: f64) -> f64 {
    seconds * 1000.0
}

/// Alignment time in milliseconds → media position in seconds
pub fn millis_to_seconds(millis: u32) -> f64 {
    millis as f64 / 1000.0
}
