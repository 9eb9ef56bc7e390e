//! Pluggable persistence for room state and metadata.
//!
//! [`Storage`] is the only seam through which the runtime touches a
//! backing database. Two reference adapters ship with it:
//!
//! - [`MemoryStorage`] — process-local maps, for tests and single-node
//!   deployments that accept losing rooms on restart.
//! - [`FirebaseStorage`] — a Realtime-Database-style REST backend, for
//!   surviving restarts.
//!
//! Both present the same semantics: loaded values are independent of
//! future writes, and empty collections round-trip faithfully even when
//! the backend elides them.

mod error;
mod firebase;
mod memory;

pub use error::StorageError;
pub use firebase::FirebaseStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use bonfire_protocol::{GameState, RoomId, RoomMetadata};

/// Durable key-addressed persistence for rooms.
///
/// Implementations must be safe for concurrent use — many rooms share
/// one storage handle. Transient backend failures surface unchanged
/// (no internal retry); higher layers decide what to do.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Prepares the backend (connection, schema). Must be called before
    /// any other operation; until then every op fails with
    /// [`StorageError::NotInitialized`].
    async fn initialize(&self) -> Result<(), StorageError>;

    /// Overwrites the state at `room_id`. Last writer wins.
    async fn save_game_state(
        &self,
        room_id: &RoomId,
        state: &GameState,
    ) -> Result<(), StorageError>;

    /// Loads the state at `room_id`, or `None` if absent.
    ///
    /// The returned state always has a `players` sequence, even if the
    /// backend dropped the empty collection on write.
    async fn load_game_state(&self, room_id: &RoomId)
    -> Result<Option<GameState>, StorageError>;

    /// Removes both state and metadata at `room_id`. Idempotent.
    async fn delete_room(&self, room_id: &RoomId) -> Result<(), StorageError>;

    /// Full replacement of the metadata record.
    async fn upsert_room_metadata(
        &self,
        room_id: &RoomId,
        metadata: &RoomMetadata,
    ) -> Result<(), StorageError>;

    async fn get_room_metadata(
        &self,
        room_id: &RoomId,
    ) -> Result<Option<RoomMetadata>, StorageError>;

    /// All metadata records, in no particular order.
    async fn list_all_room_metadata(&self) -> Result<Vec<RoomMetadata>, StorageError>;

    /// Ids of all rooms whose `last_activity` is strictly below
    /// `threshold_millis`. Implementations may fetch-then-filter.
    async fn list_inactive_room_ids(
        &self,
        threshold_millis: u64,
    ) -> Result<Vec<RoomId>, StorageError>;

    /// Whether state (not merely metadata) exists for `room_id`.
    async fn room_exists(&self, room_id: &RoomId) -> Result<bool, StorageError>;

    /// Releases resources. Subsequent ops fail with `NotInitialized`.
    async fn close(&self) -> Result<(), StorageError>;
}
