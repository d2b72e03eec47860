//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the realtime core and the outside world. Adapters implement these ports.
//!
//! - `Transport` - opens links to the event service
//! - `CommandSink` - delivers room commands over the current link
//! - `BalanceSource` - REST balance snapshots consumed by the balance monitor

mod balance_source;
mod command_sink;
mod transport;

pub use balance_source::BalanceSource;
pub use command_sink::CommandSink;
pub use transport::{Transport, TransportError, TransportFrame, TransportLink};
