//! Identity used by the binary when it connects on its own

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::foundation::SessionId;
use crate::domain::realtime::Identity;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    /// Defaults to the wallet address
    pub user_id: Option<String>,

    pub wallet_address: Option<String>,

    /// Session rooms to join (comma-separated)
    pub sessions: Option<String>,
}

impl IdentityConfig {
    /// Connect-time identity, if a wallet is configured.
    pub fn identity(&self) -> Option<Identity> {
        let wallet = self.wallet_address.as_deref()?;
        match self.user_id.as_deref() {
            Some(user_id) => Identity::new(user_id, wallet).ok(),
            None => Identity::from_wallet(wallet).ok(),
        }
    }

    /// Configured session rooms, skipping blanks.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.session_entries()
            .filter_map(|s| SessionId::new(s).ok())
            .collect()
    }

    fn session_entries(&self) -> impl Iterator<Item = &str> {
        self.sessions
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Validate identity configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(wallet) = &self.wallet_address {
            if wallet.trim().is_empty() {
                return Err(ValidationError::MissingRequired("IDENTITY_WALLET_ADDRESS"));
            }
        }
        if let Some(bad) = self.session_entries().find(|s| SessionId::new(*s).is_err()) {
            return Err(ValidationError::InvalidSessionId(bad.to_string()));
        }
        Ok(())
    }
}
