//! WebSocket transport implementation using `tokio-tungstenite`.

use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

/// Wraps a library error into the `std::io::Error` our error variants
/// carry as their source.
fn io_err(
    kind: ErrorKind,
    source: impl std::error::Error + Send + Sync + 'static,
) -> std::io::Error {
    std::io::Error::new(kind, source)
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (tcp, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        let ws = match tokio_tungstenite::accept_async(tcp).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::debug!(%id, %peer, error = %e, "WebSocket upgrade failed");
                return Err(TransportError::AcceptFailed(io_err(
                    ErrorKind::ConnectionRefused,
                    e,
                )));
            }
        };
        tracing::debug!(%id, %peer, "WebSocket connection established");

        // Split the stream so a writer task can send while a reader
        // task sits in recv — each half has its own lock.
        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            sink: Arc::new(Mutex::new(sink)),
            stream: Arc::new(Mutex::new(stream)),
        })
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A single WebSocket connection.
///
/// Cheap to clone; the halves are shared. Concurrent `send` calls
/// serialize on the sink lock, concurrent `recv` calls on the stream
/// lock, and a send never waits on a pending recv.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
    stream: Arc<Mutex<SplitStream<WsStream>>>,
}

impl Clone for WebSocketConnection {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            sink: Arc::clone(&self.sink),
            stream: Arc::clone(&self.stream),
        }
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let frame = Message::Binary(data.to_vec().into());
        let mut sink = self.sink.lock().await;
        sink.send(frame)
            .await
            .map_err(|e| TransportError::SendFailed(io_err(ErrorKind::BrokenPipe, e)))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        while let Some(item) = stream.next().await {
            let msg = item.map_err(|e| {
                TransportError::ReceiveFailed(io_err(ErrorKind::ConnectionReset, e))
            })?;
            match msg {
                Message::Binary(data) => return Ok(Some(data.into())),
                // Browser clients send JSON as text; normalize to bytes.
                Message::Text(text) => return Ok(Some(text.as_bytes().to_vec())),
                Message::Close(_) => return Ok(None),
                // Keepalive and raw frames carry no payload for us.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        // Stream exhausted without a close frame: peer went away.
        Ok(None)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        let mut sink = self.sink.lock().await;
        sink.close()
            .await
            .map_err(|e| TransportError::SendFailed(io_err(ErrorKind::BrokenPipe, e)))
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
