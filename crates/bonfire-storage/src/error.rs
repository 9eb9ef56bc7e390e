//! Error type for the storage layer.

use bonfire_protocol::GameError;

/// Errors from storage operations. Each failure carries the operation
/// label that produced it, so logs can tell a failed save from a failed
/// cleanup scan.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An operation ran before `initialize()` or after `close()`.
    #[error("storage not initialized")]
    NotInitialized,

    /// The backend rejected or failed the operation.
    #[error("{op} failed: {source}")]
    Backend {
        op: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A stored blob failed to (de)serialize.
    #[error("{op}: serialization failed: {source}")]
    Serde {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Wraps a backend failure with its operation label.
    pub fn backend(
        op: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            op,
            source: Box::new(source),
        }
    }
}

impl From<StorageError> for GameError {
    fn from(err: StorageError) -> Self {
        GameError::storage(err.to_string())
    }
}
