//! Identity presented to the event service at connect time.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// Who the shared connection belongs to.
///
/// Sent as the `userId` and `walletAddress` query parameters on every
/// (re)connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub wallet_address: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        wallet_address: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let user_id = user_id.into();
        let wallet_address = wallet_address.into();
        if user_id.trim().is_empty() {
            return Err(ValidationError::empty_field("user_id"));
        }
        if wallet_address.trim().is_empty() {
            return Err(ValidationError::empty_field("wallet_address"));
        }
        Ok(Self {
            user_id,
            wallet_address,
        })
    }

    /// Wallet-only identity, where the account address is also the user id.
    pub fn from_wallet(address: impl Into<String>) -> Result<Self, ValidationError> {
        let address = address.into();
        Self::new(address.clone(), address)
    }

    /// Query parameters in the order the service expects them.
    pub fn query_pairs(&self) -> [(&'static str, &str); 2] {
        [
            ("userId", self.user_id.as_str()),
            ("walletAddress", self.wallet_address.as_str()),
        ]
    }
}
