//! Timestamp value object for immutable points in time.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Checks if this timestamp is after another.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Returns the duration from another timestamp to this one.
    ///
    /// Returns negative duration if other is after self.
    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        self.0.signed_duration_since(other.0)
    }

    /// Returns true if `self` lies within `window` before `now` (inclusive).
    ///
    /// Timestamps in the future relative to `now` count as within the window.
    pub fn is_within(&self, window: std::time::Duration, now: &Timestamp) -> bool {
        match Duration::from_std(window) {
            Ok(window) => now.duration_since(self) <= window,
            Err(_) => true,
        }
    }

    /// Creates a timestamp from Unix milliseconds.
    ///
    /// Out-of-range values clamp to the Unix epoch.
    pub fn from_unix_millis(millis: i64) -> Self {
        Self(Utc.timestamp_millis_opt(millis).single().unwrap_or_default())
    }

    /// Returns the timestamp as Unix milliseconds.
    pub fn as_unix_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Creates a new timestamp by adding a std duration.
    pub fn plus(&self, duration: std::time::Duration) -> Self {
        Self(self.0 + Duration::from_std(duration).unwrap_or(Duration::zero()))
    }

    /// Creates a new timestamp by subtracting a std duration.
    pub fn minus(&self, duration: std::time::Duration) -> Self {
        Self(self.0 - Duration::from_std(duration).unwrap_or(Duration::zero()))
    }

    /// RFC 3339 rendering used on the wire and in logs.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use std::thread::sleep;

    #[test]
    fn timestamp_now_creates_current_time() {
        let before = Utc::now();
        let ts = Timestamp::now();
        let after = Utc::now();

        assert!(ts.as_datetime() >= &before);
        assert!(ts.as_datetime() <= &after);
    }

    #[test]
    fn timestamp_ordering_works() {
        let ts1 = Timestamp::now();
        sleep(std::time::Duration::from_millis(10));
        let ts2 = Timestamp::now();

        assert!(ts1 < ts2);
        assert!(ts1.is_before(&ts2));
        assert!(ts2.is_after(&ts1));
    }

    #[test]
    fn timestamp_deserializes_from_rfc3339() {
        let json = "\"2024-01-15T10:30:00Z\"";
        let ts: Timestamp = serde_json::from_str(json).unwrap();

        assert_eq!(ts.as_datetime().year(), 2024);
    }

    #[test]
    fn timestamp_unix_millis_roundtrips() {
        let ts = Timestamp::from_unix_millis(1_705_276_800_123);
        assert_eq!(ts.as_unix_millis(), 1_705_276_800_123);
    }

    #[test]
    fn is_within_respects_window() {
        let now = Timestamp::from_unix_millis(10_000);
        let recent = Timestamp::from_unix_millis(6_000);
        let old = Timestamp::from_unix_millis(4_000);

        assert!(recent.is_within(std::time::Duration::from_secs(5), &now));
        assert!(!old.is_within(std::time::Duration::from_secs(5), &now));
    }

    #[test]
    fn plus_and_minus_shift_by_duration() {
        let ts = Timestamp::from_unix_millis(1_000);
        assert_eq!(ts.plus(std::time::Duration::from_millis(500)).as_unix_millis(), 1_500);
        assert_eq!(ts.minus(std::time::Duration::from_millis(500)).as_unix_millis(), 500);
    }
}
