//! In-memory adapters for tests and local development.
//!
//! - `InMemoryTransport` - channel-backed `Transport`
//! - `ServerHandle` - drives the simulated event service
//! - `StaticBalanceSource` - scripted `BalanceSource`

mod balance_source;
mod transport;

pub use balance_source::StaticBalanceSource;
pub use transport::{InMemoryTransport, ServerHandle};
