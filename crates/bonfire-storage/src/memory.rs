//! In-memory storage adapter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bonfire_protocol::{GameState, RoomId, RoomMetadata};
use tokio::sync::RwLock;

use crate::{Storage, StorageError};

#[derive(Default)]
struct Maps {
    states: HashMap<RoomId, GameState>,
    metadata: HashMap<RoomId, RoomMetadata>,
}

/// Process-local [`Storage`] backed by two maps.
///
/// Values are cloned on both write and read, so a caller mutating a
/// loaded state can never reach back into the store. Rooms do not
/// survive a process restart — use [`crate::FirebaseStorage`] for that.
#[derive(Default)]
pub struct MemoryStorage {
    initialized: AtomicBool,
    inner: RwLock<Maps>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_initialized(&self) -> Result<(), StorageError> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn initialize(&self) -> Result<(), StorageError> {
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn save_game_state(
        &self,
        room_id: &RoomId,
        state: &GameState,
    ) -> Result<(), StorageError> {
        self.ensure_initialized()?;
        let mut inner = self.inner.write().await;
        inner.states.insert(room_id.clone(), state.clone());
        Ok(())
    }

    async fn load_game_state(
        &self,
        room_id: &RoomId,
    ) -> Result<Option<GameState>, StorageError> {
        self.ensure_initialized()?;
        let inner = self.inner.read().await;
        Ok(inner.states.get(room_id).cloned())
    }

    async fn delete_room(&self, room_id: &RoomId) -> Result<(), StorageError> {
        self.ensure_initialized()?;
        let mut inner = self.inner.write().await;
        inner.states.remove(room_id);
        inner.metadata.remove(room_id);
        Ok(())
    }

    async fn upsert_room_metadata(
        &self,
        room_id: &RoomId,
        metadata: &RoomMetadata,
    ) -> Result<(), StorageError> {
        self.ensure_initialized()?;
        let mut inner = self.inner.write().await;
        inner.metadata.insert(room_id.clone(), metadata.clone());
        Ok(())
    }

    async fn get_room_metadata(
        &self,
        room_id: &RoomId,
    ) -> Result<Option<RoomMetadata>, StorageError> {
        self.ensure_initialized()?;
        let inner = self.inner.read().await;
        Ok(inner.metadata.get(room_id).cloned())
    }

    async fn list_all_room_metadata(&self) -> Result<Vec<RoomMetadata>, StorageError> {
        self.ensure_initialized()?;
        let inner = self.inner.read().await;
        Ok(inner.metadata.values().cloned().collect())
    }

    async fn list_inactive_room_ids(
        &self,
        threshold_millis: u64,
    ) -> Result<Vec<RoomId>, StorageError> {
        self.ensure_initialized()?;
        let inner = self.inner.read().await;
        Ok(inner
            .metadata
            .values()
            .filter(|m| m.last_activity < threshold_millis)
            .map(|m| m.room_id.clone())
            .collect())
    }

    async fn room_exists(&self, room_id: &RoomId) -> Result<bool, StorageError> {
        self.ensure_initialized()?;
        let inner = self.inner.read().await;
        Ok(inner.states.contains_key(room_id))
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.initialized.store(false, Ordering::Release);
        let mut inner = self.inner.write().await;
        inner.states.clear();
        inner.metadata.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bonfire_protocol::{Player, PlayerId, RoomStatus};

    fn room(code: &str) -> RoomId {
        RoomId::parse(code).unwrap()
    }

    fn state(code: &str) -> GameState {
        GameState::new(room(code), "lobby")
    }

    fn metadata(code: &str, last_activity: u64) -> RoomMetadata {
        RoomMetadata {
            room_id: room(code),
            created_at: 1,
            last_activity,
            host_player_id: PlayerId::generate(),
            player_count: 0,
            status: RoomStatus::Waiting,
            game_type: "trivia".into(),
        }
    }

    #[tokio::test]
    async fn test_ops_before_initialize_fail() {
        let storage = MemoryStorage::new();
        let result = storage.load_game_state(&room("ABC234")).await;
        assert!(matches!(result, Err(StorageError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_ops_after_close_fail() {
        let storage = MemoryStorage::new();
        storage.initialize().await.unwrap();
        storage.close().await.unwrap();
        let result = storage.room_exists(&room("ABC234")).await;
        assert!(matches!(result, Err(StorageError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let storage = MemoryStorage::new();
        storage.initialize().await.unwrap();

        let mut saved = state("ABC234");
        saved
            .players
            .push(Player::new(PlayerId::generate(), "Alice", true, 10));
        storage.save_game_state(&room("ABC234"), &saved).await.unwrap();

        let loaded = storage.load_game_state(&room("ABC234")).await.unwrap();
        assert_eq!(loaded, Some(saved));
    }

    #[tokio::test]
    async fn test_loaded_state_is_independent_of_store() {
        let storage = MemoryStorage::new();
        storage.initialize().await.unwrap();
        storage
            .save_game_state(&room("ABC234"), &state("ABC234"))
            .await
            .unwrap();

        // Mutating what we got back must not leak into storage.
        let mut loaded = storage
            .load_game_state(&room("ABC234"))
            .await
            .unwrap()
            .unwrap();
        loaded.phase = "mutated".into();

        let fresh = storage
            .load_game_state(&room("ABC234"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.phase, "lobby");
    }

    #[tokio::test]
    async fn test_saved_state_is_independent_of_caller() {
        let storage = MemoryStorage::new();
        storage.initialize().await.unwrap();

        let mut original = state("ABC234");
        storage.save_game_state(&room("ABC234"), &original).await.unwrap();
        original.phase = "mutated".into();

        let loaded = storage
            .load_game_state(&room("ABC234"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.phase, "lobby");
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let storage = MemoryStorage::new();
        storage.initialize().await.unwrap();
        assert_eq!(storage.load_game_state(&room("ABC234")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_room_removes_both_and_is_idempotent() {
        let storage = MemoryStorage::new();
        storage.initialize().await.unwrap();
        storage
            .save_game_state(&room("ABC234"), &state("ABC234"))
            .await
            .unwrap();
        storage
            .upsert_room_metadata(&room("ABC234"), &metadata("ABC234", 5))
            .await
            .unwrap();

        storage.delete_room(&room("ABC234")).await.unwrap();
        assert!(!storage.room_exists(&room("ABC234")).await.unwrap());
        assert_eq!(storage.get_room_metadata(&room("ABC234")).await.unwrap(), None);

        // Deleting again is a no-op.
        storage.delete_room(&room("ABC234")).await.unwrap();
    }

    #[tokio::test]
    async fn test_room_exists_tracks_state_not_metadata() {
        let storage = MemoryStorage::new();
        storage.initialize().await.unwrap();
        storage
            .upsert_room_metadata(&room("ABC234"), &metadata("ABC234", 5))
            .await
            .unwrap();
        // Metadata alone does not make the room exist.
        assert!(!storage.room_exists(&room("ABC234")).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_inactive_filters_by_threshold() {
        let storage = MemoryStorage::new();
        storage.initialize().await.unwrap();
        storage
            .upsert_room_metadata(&room("AAAAAA"), &metadata("AAAAAA", 100))
            .await
            .unwrap();
        storage
            .upsert_room_metadata(&room("BBBBBB"), &metadata("BBBBBB", 500))
            .await
            .unwrap();

        let inactive = storage.list_inactive_room_ids(200).await.unwrap();
        assert_eq!(inactive, vec![room("AAAAAA")]);

        // Threshold is exclusive: last_activity == threshold stays.
        let inactive = storage.list_inactive_room_ids(500).await.unwrap();
        assert_eq!(inactive, vec![room("AAAAAA")]);
    }

    #[tokio::test]
    async fn test_list_all_room_metadata() {
        let storage = MemoryStorage::new();
        storage.initialize().await.unwrap();
        storage
            .upsert_room_metadata(&room("AAAAAA"), &metadata("AAAAAA", 1))
            .await
            .unwrap();
        storage
            .upsert_room_metadata(&room("BBBBBB"), &metadata("BBBBBB", 2))
            .await
            .unwrap();

        let all = storage.list_all_room_metadata().await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
