//! A live room: the game behind its lock plus everything owned with it.

use std::sync::{Arc, Mutex as StdMutex};

use bonfire_protocol::{PlayerId, RoomId, RoomMetadata, RoomStatus};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::game::Game;
use crate::sync::Synchronizer;

/// One active room held in the manager's catalog.
///
/// The room exclusively owns its game, synchronizer, metadata, cleanup
/// timer, and reaper task. The game mutex is the room's serialization
/// domain: every operation that mutates the room acquires it, so rooms
/// evolve in parallel while each room's history stays linear.
pub struct RoomInstance {
    room_id: RoomId,
    game_type: String,
    game: Mutex<Box<dyn Game>>,
    synchronizer: Arc<Synchronizer>,
    metadata: Mutex<RoomMetadata>,
    /// The pending TTL one-shot. At most one is live (cancel before
    /// reassign); room deletion cancels it outright.
    cleanup_timer: StdMutex<Option<JoinHandle<()>>>,
    /// Drains expired disconnect-grace notifications for this room.
    reaper_task: StdMutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RoomInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomInstance")
            .field("room_id", &self.room_id)
            .field("game_type", &self.game_type)
            .finish_non_exhaustive()
    }
}

impl RoomInstance {
    pub fn new(
        room_id: RoomId,
        game_type: String,
        game: Box<dyn Game>,
        synchronizer: Arc<Synchronizer>,
        metadata: RoomMetadata,
    ) -> Self {
        Self {
            room_id,
            game_type,
            game: Mutex::new(game),
            synchronizer,
            metadata: Mutex::new(metadata),
            cleanup_timer: StdMutex::new(None),
            reaper_task: StdMutex::new(None),
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn game_type(&self) -> &str {
        &self.game_type
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }

    /// Enters the room's serialization domain.
    pub async fn game(&self) -> MutexGuard<'_, Box<dyn Game>> {
        self.game.lock().await
    }

    /// Snapshot of the room's metadata.
    pub async fn metadata(&self) -> RoomMetadata {
        self.metadata.lock().await.clone()
    }

    /// Locked access for metadata mutation.
    pub async fn metadata_mut(&self) -> MutexGuard<'_, RoomMetadata> {
        self.metadata.lock().await
    }

    /// Installs a new cleanup timer, cancelling any prior one.
    pub fn arm_cleanup_timer(&self, handle: JoinHandle<()>) {
        let mut slot = self.cleanup_timer.lock().expect("timer lock poisoned");
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    /// Cancels the pending cleanup timer, if any.
    pub fn cancel_cleanup_timer(&self) {
        let mut slot = self.cleanup_timer.lock().expect("timer lock poisoned");
        if let Some(old) = slot.take() {
            old.abort();
        }
    }

    pub(crate) fn attach_reaper_task(&self, handle: JoinHandle<()>) {
        let mut slot = self.reaper_task.lock().expect("reaper lock poisoned");
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    pub(crate) fn stop_reaper_task(&self) {
        let mut slot = self.reaper_task.lock().expect("reaper lock poisoned");
        if let Some(old) = slot.take() {
            old.abort();
        }
    }

    /// The derived read-only listing view.
    pub async fn info(&self) -> RoomInfo {
        let metadata = self.metadata().await;
        let game = self.game().await;
        let host_name = game
            .state()
            .players
            .iter()
            .find(|p| p.is_host)
            .map(|p| p.name.clone());
        RoomInfo {
            room_id: self.room_id.clone(),
            status: metadata.status,
            player_count: metadata.player_count,
            max_players: game.config().max_players,
            host_name,
            game_type: self.game_type.clone(),
            created_at: metadata.created_at,
        }
    }
}

impl Drop for RoomInstance {
    fn drop(&mut self) {
        // Timers must die with the room, not fire into its ghost.
        if let Ok(mut slot) = self.cleanup_timer.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        if let Ok(mut slot) = self.reaper_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

/// Read-only projection of a room for listings and stats.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub status: RoomStatus,
    pub player_count: usize,
    pub max_players: usize,
    pub host_name: Option<String>,
    pub game_type: String,
    pub created_at: u64,
}

/// A partial metadata update, merged over the stored record.
#[derive(Debug, Clone, Default)]
pub struct RoomMetadataPatch {
    pub player_count: Option<usize>,
    pub status: Option<RoomStatus>,
    pub host_player_id: Option<PlayerId>,
}

impl RoomMetadataPatch {
    pub fn player_count(count: usize) -> Self {
        Self {
            player_count: Some(count),
            ..Self::default()
        }
    }

    pub fn status(status: RoomStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Applies the patch in place.
    pub fn apply(&self, metadata: &mut RoomMetadata) {
        if let Some(count) = self.player_count {
            metadata.player_count = count;
        }
        if let Some(status) = self.status {
            metadata.status = status;
        }
        if let Some(host) = self.host_player_id {
            metadata.host_player_id = host;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bonfire_protocol::now_millis;

    #[test]
    fn test_patch_merges_only_set_fields() {
        let host = PlayerId::generate();
        let mut metadata = RoomMetadata {
            room_id: RoomId::parse("ABC234").unwrap(),
            created_at: now_millis(),
            last_activity: now_millis(),
            host_player_id: host,
            player_count: 2,
            status: RoomStatus::Waiting,
            game_type: "trivia".into(),
        };

        RoomMetadataPatch::status(RoomStatus::Playing).apply(&mut metadata);
        assert_eq!(metadata.status, RoomStatus::Playing);
        assert_eq!(metadata.player_count, 2);

        RoomMetadataPatch::player_count(5).apply(&mut metadata);
        assert_eq!(metadata.player_count, 5);
        assert_eq!(metadata.status, RoomStatus::Playing);
        assert_eq!(metadata.host_player_id, host);
    }
}
