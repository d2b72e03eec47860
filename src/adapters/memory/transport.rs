//! In-memory transport for testing.
//!
//! Stands in for the event service: tests drive the "server" side through
//! a `ServerHandle` while the connection under test talks to an
//! `InMemoryTransport`.
//!
//! Features:
//! - Deterministic delivery (frames go straight into the link channels)
//! - Capture of every frame the client sent, decoded as commands
//! - Failure injection: refuse opens, fail the next N opens, stall opens
//! - Forced close of the current link
//!
//! This adapter is for **testing only**.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::adapters::websocket::codec::{decode_command, encode_event};
use crate::domain::realtime::{Identity, OutboundCommand};
use crate::ports::{Transport, TransportError, TransportFrame, TransportLink};

struct ServerLink {
    to_client: mpsc::UnboundedSender<TransportFrame>,
    from_client: mpsc::UnboundedReceiver<String>,
}

#[derive(Default)]
struct ServerState {
    current: Option<ServerLink>,
    opens: usize,
    identities: Vec<Identity>,
    received: Vec<String>,
    refuse: bool,
    fail_next: usize,
    stall: bool,
}

impl ServerState {
    // Move everything the client has sent into `received`; forget the link
    // once the client side has gone away.
    fn drain(&mut self) {
        let mut client_gone = false;
        if let Some(link) = self.current.as_mut() {
            loop {
                match link.from_client.try_recv() {
                    Ok(text) => self.received.push(text),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        client_gone = true;
                        break;
                    }
                }
            }
        }
        if client_gone {
            self.current = None;
        }
    }
}

type Shared = Arc<Mutex<ServerState>>;

fn lock(state: &Shared) -> MutexGuard<'_, ServerState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// `Transport` implementation backed by in-process channels.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    state: Shared,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server-side control handle sharing this transport's state.
    pub fn server(&self) -> ServerHandle {
        ServerHandle {
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn open(&self, identity: &Identity) -> Result<TransportLink, TransportError> {
        let stall = {
            let mut state = lock(&self.state);
            state.opens += 1;
            state.identities.push(identity.clone());

            if state.refuse {
                return Err(TransportError::Connect("connection refused".into()));
            }
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(TransportError::Connect("injected failure".into()));
            }
            state.stall
        };

        if stall {
            futures::future::pending::<()>().await;
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let mut state = lock(&self.state);
        state.drain();
        state.current = Some(ServerLink {
            to_client: inbound_tx,
            from_client: outbound_rx,
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Test-side view of the in-memory "server".
#[derive(Clone)]
pub struct ServerHandle {
    state: Shared,
}

impl ServerHandle {
    /// Push an event to the connected client. Returns `false` with no link.
    pub fn emit(&self, event: &str, data: Value) -> bool {
        match encode_event(event, &data) {
            Ok(text) => self.send_raw(text),
            Err(_) => false,
        }
    }

    /// Push a raw text frame, for malformed-input tests.
    pub fn send_raw(&self, text: impl Into<String>) -> bool {
        let mut state = lock(&self.state);
        state.drain();
        match state.current.as_ref() {
            Some(link) => link.to_client.send(TransportFrame::Text(text.into())).is_ok(),
            None => false,
        }
    }

    /// Drop the current link as if the network failed.
    pub fn close(&self, reason: &str) -> bool {
        let mut state = lock(&self.state);
        state.drain();
        match state.current.take() {
            Some(link) => {
                let _ = link.to_client.send(TransportFrame::Closed {
                    reason: reason.to_string(),
                });
                true
            }
            None => false,
        }
    }

    /// Refuse every open until called again with `false`.
    pub fn refuse_connections(&self, refuse: bool) {
        lock(&self.state).refuse = refuse;
    }

    /// Fail the next `count` opens.
    pub fn fail_next(&self, count: usize) {
        lock(&self.state).fail_next = count;
    }

    /// Make opens hang forever (exercises the connect timeout).
    pub fn stall_connections(&self, stall: bool) {
        lock(&self.state).stall = stall;
    }

    /// Whether a client link is open.
    pub fn is_connected(&self) -> bool {
        let mut state = lock(&self.state);
        state.drain();
        state.current.is_some()
    }

    pub fn open_count(&self) -> usize {
        lock(&self.state).opens
    }

    pub fn last_identity(&self) -> Option<Identity> {
        lock(&self.state).identities.last().cloned()
    }

    /// Every text frame the client has sent, in order.
    pub fn received_frames(&self) -> Vec<String> {
        let mut state = lock(&self.state);
        state.drain();
        state.received.clone()
    }

    /// Every frame the client has sent that decodes as a command.
    pub fn commands(&self) -> Vec<OutboundCommand> {
        self.received_frames()
            .iter()
            .filter_map(|text| decode_command(text).ok())
            .collect()
    }

    /// Count of commands named `name` (e.g. `joinSession`) for `session_id`.
    pub fn count(&self, name: &str, session_id: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.name() == name && c.session_id().as_str() == session_id)
            .count()
    }

    /// Forget captured frames.
    pub fn clear_received(&self) {
        let mut state = lock(&self.state);
        state.drain();
        state.received.clear();
    }
}
