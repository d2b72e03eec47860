//! Last-known value that survives connectivity loss.

use std::time::Duration;

use crate::domain::foundation::Timestamp;

/// A cached value plus when it was fetched and whether it may be outdated.
///
/// Going stale never discards the value: "known but possibly outdated" is
/// different from "unknown".
#[derive(Debug, Clone, PartialEq)]
pub struct StaleCache<T> {
    value: T,
    fetched_at: Timestamp,
    is_stale: bool,
}

impl<T> StaleCache<T> {
    /// Wraps a freshly fetched value.
    pub fn new(value: T) -> Self {
        Self::fetched_at(value, Timestamp::now())
    }

    /// Wraps a value fetched at a known time.
    pub fn fetched_at(value: T, fetched_at: Timestamp) -> Self {
        Self {
            value,
            fetched_at,
            is_stale: false,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn fetched_time(&self) -> Timestamp {
        self.fetched_at
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    /// Flags the value as possibly outdated.
    pub fn mark_stale(&mut self) {
        self.is_stale = true;
    }

    /// Replaces the value with a fresh one.
    pub fn refresh(&mut self, value: T, fetched_at: Timestamp) {
        self.value = value;
        self.fetched_at = fetched_at;
        self.is_stale = false;
    }

    /// Age relative to `now`; zero if `fetched_at` lies in the future.
    pub fn age(&self, now: &Timestamp) -> Duration {
        now.duration_since(&self.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Marks the value stale once it is older than `ttl`.
    ///
    /// Returns the resulting staleness. Never clears an existing stale flag.
    pub fn refresh_staleness(&mut self, ttl: Duration, now: &Timestamp) -> bool {
        if self.age(now) > ttl {
            self.is_stale = true;
        }
        self.is_stale
    }

    /// True once the value is too old to show at all.
    pub fn is_expired(&self, max_age: Duration, now: &Timestamp) -> bool {
        self.age(now) > max_age
    }

    /// Applies `f` to the value, keeping the freshness metadata.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StaleCache<U> {
        StaleCache {
            value: f(self.value),
            fetched_at: self.fetched_at,
            is_stale: self.is_stale,
        }
    }
}
