//! Transport layer for Bonfire.
//!
//! Two pieces live here:
//!
//! - The [`Transport`] / [`Connection`] traits that abstract the
//!   bidirectional byte stream a client speaks over (WebSocket by
//!   default), and
//! - The [`Gateway`]: per-connection outbound queues plus named
//!   multicast groups — the "send this frame to everyone in room X"
//!   primitive the synchronization layer is built on.
//!
//! The layer deals strictly in bytes; it knows nothing about rooms,
//! players, or the shape of the protocol.

#![allow(async_fn_in_trait)]

mod error;
mod gateway;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use gateway::{Gateway, OutboundReceiver, OutboundSender};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Opaque identifier for one bidirectional stream.
///
/// Minted on accept, invalidated on disconnect. A reconnecting player
/// gets a fresh `ConnectionId`; it is the player id, not the connection
/// id, that is stable across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Stops accepting new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A single connection that can send and receive bytes.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Sends data to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next message. `Ok(None)` means a clean close.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// The unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
