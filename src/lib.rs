//! CoTrain Realtime - event synchronization for the training marketplace
//!
//! One shared connection to the CoTrain event service, fanned out to any
//! number of in-process consumers:
//!
//! - `TransportConnection` owns the link, reconnects with bounded backoff,
//!   and keeps short histories of session updates and notifications.
//! - `RoomSubscriptionManager` reference-counts session room membership
//!   and replays it after every reconnect.
//! - Consumer adapters (`SessionPresence`, `NotificationTray`,
//!   `BalanceMonitor`) project events into view state.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
