//! WebSocket implementation of the `Transport` port.
//!
//! Each `open` performs one handshake against
//! `<base_url>/<namespace>?userId=..&walletAddress=..` and spawns a pump
//! task that shuttles text frames between the socket and the link
//! channels. The pump ends when either side goes away:
//!
//! - outbound sender dropped → close frame sent, task exits
//! - server close, read error or end of stream → `TransportFrame::Closed`

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::domain::realtime::Identity;
use crate::ports::{Transport, TransportError, TransportFrame, TransportLink};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport for the event service.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    endpoint: Url,
}

impl WebSocketTransport {
    /// Build a transport for `base_url` + `namespace`.
    ///
    /// `http`/`https` bases are mapped to `ws`/`wss`. Any query or fragment
    /// on the base is discarded; identity parameters are added per handshake.
    pub fn new(base_url: &str, namespace: &str) -> Result<Self, TransportError> {
        let mut url = Url::parse(base_url.trim())
            .map_err(|e| TransportError::InvalidUrl(format!("'{}': {}", base_url, e)))?;

        if url.host_str().is_none() {
            return Err(TransportError::InvalidUrl(format!(
                "'{}' must include a host",
                base_url
            )));
        }

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(TransportError::InvalidUrl(format!(
                    "unsupported scheme '{}'; expected http(s) or ws(s)",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| TransportError::InvalidUrl("failed to set WebSocket scheme".into()))?;

        let path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            namespace.trim_matches('/')
        );
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self { endpoint: url })
    }

    /// Namespace endpoint without identity parameters.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Handshake URL for `identity`.
    pub fn url_for(&self, identity: &Identity) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(identity.query_pairs());
        url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, identity: &Identity) -> Result<TransportLink, TransportError> {
        let url = self.url_for(identity);
        tracing::debug!(endpoint = %self.endpoint, user_id = %identity.user_id, "Opening WebSocket");

        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(socket, outbound_rx, inbound_tx));

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

async fn pump(
    socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<TransportFrame>,
) {
    let (mut sink, mut source) = socket.split();

    let reason = loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        break format!("send failed: {}", e);
                    }
                }
                None => {
                    // Link released by the connection; nobody is listening.
                    let _ = sink.send(Message::Close(None)).await;
                    tracing::debug!("WebSocket closed by client");
                    return;
                }
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(TransportFrame::Text(text)).is_err() {
                        let _ = sink.send(Message::Close(None)).await;
                        return;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        if inbound.send(TransportFrame::Text(text)).is_err() {
                            let _ = sink.send(Message::Close(None)).await;
                            return;
                        }
                    }
                    Err(_) => tracing::warn!("Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "server closed connection".to_string());
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => break format!("websocket error: {}", e),
                None => break "stream ended".to_string(),
            },
        }
    };

    tracing::debug!(reason = %reason, "WebSocket link ended");
    let _ = inbound.send(TransportFrame::Closed { reason });
}
