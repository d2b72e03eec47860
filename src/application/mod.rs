//! Application layer - the shared connection and its consumers.
//!
//! - `connection` - `TransportConnection`, the one link to the event service
//! - `rooms` - reference-counted room membership
//! - `consumers` - per-feature adapters that project events into views

pub mod connection;
pub mod consumers;
pub mod rooms;

pub use connection::{
    ConnectionSettings, OutboundChannel, TransportConnection, ATTEMPTS_EXHAUSTED, STATE_CHANGED,
};
pub use consumers::{
    BalanceMonitor, BalanceSettings, BalanceView, ConsumerAdapter, NotificationTray,
    PresenceSettings, PresenceStatus, RefreshOutcome, SessionPresence, SessionPresenceView,
    UNREAD_WINDOW,
};
pub use rooms::{Room, RoomSubscriptionManager};
