//! Transport port - Interface for the physical event-service connection.
//!
//! The shared connection never touches a socket directly. It asks a
//! `Transport` to open a link for an identity and then talks to that link
//! through two channels:
//!
//! ```text
//!   TransportConnection ──outbound (String)──▶ adapter ──▶ socket
//!   TransportConnection ◀──inbound (Frame)─── adapter ◀── socket
//! ```
//!
//! Dropping the outbound sender asks the adapter to close the socket.
//! The adapter reports the end of the link with `TransportFrame::Closed`
//! or by dropping its inbound sender.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::domain::realtime::Identity;

/// One inbound unit from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    /// A JSON text message.
    Text(String),
    /// The link ended; no more frames follow.
    Closed { reason: String },
}

/// An open link: handshake completed, identity accepted.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportFrame>,
}

/// Errors that can occur while opening a link.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The service refused or could not be reached.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Opening took longer than the configured timeout.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The link closed before the handshake completed.
    #[error("link closed during handshake")]
    Closed,

    /// The configured endpoint is not a usable WebSocket URL.
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

/// Port for opening links to the event service.
///
/// # Example
///
/// ```ignore
/// let link = transport.open(&identity).await?;
/// link.outbound.send(r#"{"event":"joinSession","data":{"sessionId":"s1"}}"#.into())?;
/// while let Some(frame) = link.inbound.recv().await { /* ... */ }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new link, presenting `identity` during the handshake.
    async fn open(&self, identity: &Identity) -> Result<TransportLink, TransportError>;
}
