//! Unified error type for the Bonfire server runtime.

use bonfire_protocol::{GameError, ProtocolError};
use bonfire_storage::StorageError;
use bonfire_transport::TransportError;

/// Top-level error that wraps all layer-specific errors.
///
/// The `#[from]` attributes let the `?` operator lift sub-crate errors
/// automatically, so the server code reads straight through.
#[derive(Debug, thiserror::Error)]
pub enum BonfireError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A storage-level error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A domain error (room, player, game).
    #[error(transparent)]
    Game(#[from] GameError),

    /// An I/O error from the admin listener.
    #[error("admin surface error: {0}")]
    Admin(#[source] std::io::Error),
}
