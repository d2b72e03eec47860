//! BalanceSource port - the REST boundary the balance monitor reads from.
//!
//! Implementations live outside this crate (wallet and reward endpoints).
//! The realtime layer only decides *when* to fetch and how long a reading
//! stays trustworthy.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::realtime::BalanceSnapshot;

/// Fetches the current balances for a wallet.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Fetch wallet and reward balances for `wallet_address`.
    ///
    /// Errors should use `ErrorCode::BalanceUnavailable`.
    async fn fetch(&self, wallet_address: &str) -> Result<BalanceSnapshot, DomainError>;
}
