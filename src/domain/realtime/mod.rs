//! Realtime module - types shared by the connection, its routers, and
//! the consumer adapters.
//!
//! - `connection_state` - `ConnectionState`, `ConnectionStatus`, `ReconnectPolicy`
//! - `events` - inbound wire events (`InboundEvent` and payloads)
//! - `commands` - outbound wire commands (`OutboundCommand`)
//! - `history` - `BoundedHistoryBuffer` for trailing event windows
//! - `stale_cache` - `StaleCache` for last-known values
//! - `identity` - connect-time `Identity`
//! - `balance` - `BalanceSnapshot` read by the balance monitor

mod balance;
mod commands;
mod connection_state;
pub mod events;
mod history;
mod identity;
mod stale_cache;

pub use balance::BalanceSnapshot;
pub use commands::{OutboundCommand, SessionRef};
pub use connection_state::{ConnectionState, ConnectionStatus, ReconnectPolicy};
pub use events::{
    Announcement, ConnectionAck, DisconnectNotice, InboundEvent, Notification, NotificationKind,
    OpaqueEvent, ServerError, SessionInfo, SessionJoined, SessionLeft, SessionUpdate,
    SessionUpdateType,
};
pub use history::{
    BoundedHistoryBuffer, HistoryEntry, NOTIFICATION_HISTORY_CAPACITY,
    SESSION_UPDATE_HISTORY_CAPACITY,
};
pub use identity::Identity;
pub use stale_cache::StaleCache;
