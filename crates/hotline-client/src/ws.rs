//! WebSocket transport for the production client.
//!
//! Provides [`WsTransport`], which bridges the broker's WebSocket link to
//! the [`Transport`] trait. This is a thin layer that just moves frames;
//! protocol logic stays in the Sans-IO [`Engine`](crate::Engine).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hotline_proto::{Frame, FrameHeader};
use thiserror::Error;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::transport::{Transport, TransportEvent};

/// How long a dial may take before it is abandoned (10 seconds).
///
/// The reconnect supervisor has its own dial timeout; this one bounds the
/// time the client task spends inside a single connect call.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Frames buffered in each direction before backpressure applies.
const CHANNEL_CAPACITY: usize = 32;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Dial or WebSocket handshake failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Operation on a link that is not up.
    #[error("link closed")]
    Closed,
}

/// WebSocket link to the broker.
///
/// A connected transport runs an internal task that pumps frames between
/// the socket and a pair of channels. [`close`](Transport::close) aborts
/// the task; dropping the transport without closing leaks it.
pub struct WsTransport {
    connect_timeout: Duration,
    link: Option<WsLink>,
}

struct WsLink {
    to_broker: mpsc::Sender<Frame>,
    events: mpsc::Receiver<TransportEvent>,
    abort_handle: tokio::task::AbortHandle,
}

type WsSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

impl WsTransport {
    /// Create a disconnected transport with the default dial timeout.
    #[must_use]
    pub fn new() -> Self {
        Self { connect_timeout: DEFAULT_DIAL_TIMEOUT, link: None }
    }

    /// Override the dial timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WsTransport {
    type Error = TransportError;

    async fn connect(&mut self, url: &str) -> Result<(), TransportError> {
        self.close();

        let (socket, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Connection("connect timed out".to_string()))?
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let (to_broker_tx, to_broker_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel::<TransportEvent>(CHANNEL_CAPACITY);

        let handle = tokio::spawn(run_link(socket, to_broker_rx, events_tx));

        self.link = Some(WsLink {
            to_broker: to_broker_tx,
            events: events_rx,
            abort_handle: handle.abort_handle(),
        });

        Ok(())
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let Some(link) = self.link.as_ref() else {
            return Err(TransportError::Closed);
        };
        link.to_broker.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        let link = self.link.as_mut()?;
        link.events.recv().await
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    fn close(&mut self) {
        if let Some(link) = self.link.take() {
            link.abort_handle.abort();
        }
    }
}

/// Run the link, bridging between channels and the WebSocket.
///
/// Frames travel as binary messages, one frame per message. Undecodable
/// inbound frames are logged and skipped; socket errors end the pump with
/// a [`TransportEvent::Closed`].
async fn run_link(
    socket: WsSocket,
    mut to_broker: mpsc::Receiver<Frame>,
    events: mpsc::Sender<TransportEvent>,
) {
    let (mut sink, mut stream) = socket.split();

    if events.send(TransportEvent::Opened).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            outgoing = to_broker.recv() => {
                let Some(frame) = outgoing else { break };
                let mut wire = Vec::with_capacity(FrameHeader::SIZE + frame.payload.len());
                if let Err(error) = frame.encode(&mut wire) {
                    tracing::warn!(%error, "dropping unencodable frame");
                    continue;
                }
                if let Err(error) = sink.send(Message::Binary(wire)).await {
                    let reason = Some(error.to_string());
                    let _ = events.send(TransportEvent::Closed { reason }).await;
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Binary(bytes))) => match Frame::decode(&bytes) {
                        Ok(frame) => {
                            if events.send(TransportEvent::Frame(frame)).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => tracing::warn!(%error, "dropping undecodable frame"),
                    },
                    Some(Ok(Message::Close(close))) => {
                        let reason = close
                            .map(|frame| frame.reason.into_owned())
                            .filter(|reason| !reason.is_empty());
                        let _ = events.send(TransportEvent::Closed { reason }).await;
                        break;
                    }
                    // Text frames are not part of the protocol; ping/pong
                    // is handled inside tungstenite.
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        let reason = Some(error.to_string());
                        let _ = events.send(TransportEvent::Closed { reason }).await;
                        break;
                    }
                    None => {
                        let _ = events.send(TransportEvent::Closed { reason: None }).await;
                        break;
                    }
                }
            }
        }
    }
}
