//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the realtime core to external systems:
//! - `events` - In-process event dispatcher
//! - `websocket` - WebSocket transport and wire codec
//! - `memory` - In-memory transport and balance source for tests

pub mod events;
pub mod memory;
pub mod websocket;

pub use events::{EventDispatcher, Subscription};
pub use memory::{InMemoryTransport, ServerHandle, StaticBalanceSource};
pub use websocket::{CodecError, WebSocketTransport};
