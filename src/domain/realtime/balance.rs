//! Wallet and reward balances as reported by the REST layer.

use serde::{Deserialize, Serialize};

/// One balance reading. Amounts are in display units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    #[serde(default)]
    pub total_balance: f64,
    #[serde(default)]
    pub available_balance: f64,
    #[serde(default)]
    pub staked_balance: f64,
    #[serde(default)]
    pub pending_rewards: f64,
    #[serde(default)]
    pub claimable_rewards: f64,
    #[serde(default)]
    pub total_earned_rewards: f64,
    #[serde(default)]
    pub total_claimed_rewards: f64,
}

impl BalanceSnapshot {
    /// Rewards that exist but have not been paid out yet.
    pub fn unclaimed_rewards(&self) -> f64 {
        self.pending_rewards + self.claimable_rewards
    }
}
