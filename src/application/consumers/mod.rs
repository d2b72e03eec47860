//! Consumer adapters - per-feature bindings onto the shared connection.
//!
//! Each adapter registers listeners on the connection, optionally takes
//! room membership, and projects what it hears into view state it owns.
//! None of them touch the link directly.
//!
//! - `SessionPresence` - participant count and activity for one session room
//! - `NotificationTray` - local notification list with unread tracking
//! - `BalanceMonitor` - last known wallet balance with staleness
//!
//! Teardown is synchronous and idempotent, and also runs on drop.

mod balance_monitor;
mod notification_tray;
mod session_presence;

pub use balance_monitor::{BalanceMonitor, BalanceSettings, BalanceView, RefreshOutcome};
pub use notification_tray::{NotificationTray, UNREAD_WINDOW};
pub use session_presence::{PresenceSettings, PresenceStatus, SessionPresence, SessionPresenceView};

use crate::domain::foundation::ConsumerId;

/// Common contract of every consumer adapter.
pub trait ConsumerAdapter: Send + Sync {
    fn consumer_id(&self) -> ConsumerId;

    /// Remove every listener the adapter registered and release any room
    /// it joined. Calling it again has no further effect.
    fn teardown(&self);

    /// False once torn down.
    fn is_active(&self) -> bool;
}
