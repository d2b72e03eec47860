//! WebSocket adapters for the shared event-service connection.
//!
//! ```text
//!   TransportConnection
//!          │  TransportLink (mpsc in/out)
//!          ▼
//!   WebSocketTransport ── pump task ── tokio-tungstenite socket ── event service
//! ```
//!
//! # Components
//!
//! - [`codec`] - `{"event", "data"}` framing for inbound events and outbound commands
//! - [`client`] - `WebSocketTransport`, the `Transport` port over tokio-tungstenite

pub mod client;
pub mod codec;

pub use client::WebSocketTransport;
pub use codec::{
    decode_command, decode_event, decode_frame, encode_command, encode_event, CodecError,
};
