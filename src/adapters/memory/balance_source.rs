//! Scripted balance source for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::realtime::BalanceSnapshot;
use crate::ports::BalanceSource;

/// Returns a fixed snapshot, or an error while `set_failing(true)`.
#[derive(Debug, Default)]
pub struct StaticBalanceSource {
    snapshot: Mutex<BalanceSnapshot>,
    failing: Mutex<bool>,
    calls: AtomicUsize,
}

impl StaticBalanceSource {
    pub fn new(snapshot: BalanceSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            failing: Mutex::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_snapshot(&self, snapshot: BalanceSnapshot) {
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    /// Number of `fetch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BalanceSource for StaticBalanceSource {
    async fn fetch(&self, wallet_address: &str) -> Result<BalanceSnapshot, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(
                DomainError::new(ErrorCode::BalanceUnavailable, "balance service unavailable")
                    .with_detail("wallet_address", wallet_address),
            );
        }
        Ok(*self.snapshot.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_snapshot_until_failing() {
        let source = StaticBalanceSource::new(BalanceSnapshot {
            total_balance: 10.0,
            ..Default::default()
        });

        assert_eq!(source.fetch("0xabc").await.unwrap().total_balance, 10.0);

        source.set_failing(true);
        let err = source.fetch("0xabc").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BalanceUnavailable);
        assert_eq!(source.calls(), 2);
    }
}
