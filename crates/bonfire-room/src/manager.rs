//! Room manager: catalog, creation, deletion, TTL cleanup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock, Weak};
use std::time::Duration;

use bonfire_protocol::{
    GameError, PlayerId, RoomId, RoomMetadata, RoomStatus, generate_room_code, now_millis,
};
use bonfire_storage::Storage;
use bonfire_transport::Gateway;
use tokio::task::JoinHandle;

use crate::game::{GameContext, GameFactory, ReaperHandle};
use crate::room::{RoomInfo, RoomInstance, RoomMetadataPatch};
use crate::sync::Synchronizer;

/// How many code mints to try before giving up on a unique room id.
const CODE_MINT_ATTEMPTS: usize = 10;

/// Resource and lifetime limits for the room catalog.
#[derive(Debug, Clone)]
pub struct RoomManagerConfig {
    /// Idle time after which a room is destroyed.
    pub default_ttl: Duration,
    /// Hard cap on simultaneously live rooms.
    pub max_rooms: usize,
    /// Period of the background inactivity scan.
    pub cleanup_interval: Duration,
}

impl Default for RoomManagerConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(24 * 60 * 60),
            max_rooms: 1000,
            cleanup_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// The catalog of live rooms plus the player→room index.
///
/// Shared as an `Arc` across every connection handler and the cleanup
/// task; both maps sit behind their own locks and no lock is ever held
/// across an await.
pub struct RoomManager {
    config: RoomManagerConfig,
    storage: Arc<dyn Storage>,
    gateway: Arc<Gateway>,
    factory: GameFactory,
    rooms: RwLock<HashMap<RoomId, Arc<RoomInstance>>>,
    /// Which room each tracked player belongs to. Retained across
    /// disconnects so a reconnecting player can be routed home.
    players: RwLock<HashMap<PlayerId, RoomId>>,
    cleanup_task: StdMutex<Option<JoinHandle<()>>>,
    /// Handed to timers and reaper loops so they can call back without
    /// keeping the manager alive.
    weak_self: Weak<RoomManager>,
}

impl RoomManager {
    pub fn new(
        config: RoomManagerConfig,
        storage: Arc<dyn Storage>,
        gateway: Arc<Gateway>,
        factory: GameFactory,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            config,
            storage,
            gateway,
            factory,
            rooms: RwLock::new(HashMap::new()),
            players: RwLock::new(HashMap::new()),
            cleanup_task: StdMutex::new(None),
            weak_self: weak.clone(),
        })
    }

    pub fn config(&self) -> &RoomManagerConfig {
        &self.config
    }

    /// Creates a room for the given host and game type.
    ///
    /// The host is *not* joined here — the caller joins them through
    /// the game immediately after and deletes the room if that fails,
    /// so no empty room leaks.
    pub async fn create_room(
        &self,
        host_player_id: PlayerId,
        game_type: &str,
    ) -> Result<Arc<RoomInstance>, GameError> {
        let room = {
            let mut rooms = self.rooms.write().expect("room catalog lock poisoned");
            if rooms.len() >= self.config.max_rooms {
                return Err(GameError::limit_reached(format!(
                    "room limit reached ({})",
                    self.config.max_rooms
                )));
            }

            // Mint a code that is free among live rooms right now.
            let mut minted = None;
            for _ in 0..CODE_MINT_ATTEMPTS {
                let candidate = generate_room_code();
                if !rooms.contains_key(&candidate) {
                    minted = Some(candidate);
                    break;
                }
            }
            let room_id = minted.ok_or_else(GameError::code_exhaustion)?;

            let synchronizer = Arc::new(Synchronizer::new(
                room_id.clone(),
                Arc::clone(&self.storage),
                Arc::clone(&self.gateway),
            ));
            let (reaper, mut reaper_rx) = ReaperHandle::channel();
            let game = (self.factory)(GameContext {
                room_id: room_id.clone(),
                game_type: game_type.to_owned(),
                synchronizer: Arc::clone(&synchronizer),
                reaper,
            })?;

            let now = now_millis();
            let metadata = RoomMetadata {
                room_id: room_id.clone(),
                created_at: now,
                last_activity: now,
                host_player_id,
                player_count: 0,
                status: RoomStatus::Waiting,
                game_type: game_type.to_owned(),
            };

            let room = Arc::new(RoomInstance::new(
                room_id.clone(),
                game_type.to_owned(),
                game,
                synchronizer,
                metadata,
            ));
            rooms.insert(room_id.clone(), Arc::clone(&room));

            // Drain expired disconnect-grace timers for this room.
            let weak = self.weak_self.clone();
            let reaper_room = room_id.clone();
            let task = tokio::spawn(async move {
                while let Some(player_id) = reaper_rx.recv().await {
                    let Some(manager) = weak.upgrade() else { break };
                    manager.reap_player(&reaper_room, player_id).await;
                }
            });
            room.attach_reaper_task(task);
            room
        };

        let metadata = room.metadata().await;
        if let Err(e) = self
            .storage
            .upsert_room_metadata(room.room_id(), &metadata)
            .await
        {
            // Creation is all-or-nothing: roll the catalog entry back.
            self.rooms
                .write()
                .expect("room catalog lock poisoned")
                .remove(room.room_id());
            room.stop_reaper_task();
            return Err(e.into());
        }

        tracing::info!(room_id = %room.room_id(), game_type, "room created");
        Ok(room)
    }

    pub fn get_room(&self, room_id: &RoomId) -> Result<Arc<RoomInstance>, GameError> {
        self.rooms
            .read()
            .expect("room catalog lock poisoned")
            .get(room_id)
            .cloned()
            .ok_or_else(|| GameError::room_not_found(room_id))
    }

    pub fn has_room(&self, room_id: &RoomId) -> bool {
        self.rooms
            .read()
            .expect("room catalog lock poisoned")
            .contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().expect("room catalog lock poisoned").len()
    }

    /// Destroys a room: timers cancelled, players untracked, fan-out
    /// group dissolved, storage cleared. Deleting a missing room is a
    /// no-op — concurrent deletion always resolves in favor of the
    /// first caller.
    pub async fn delete_room(&self, room_id: &RoomId) {
        let removed = self
            .rooms
            .write()
            .expect("room catalog lock poisoned")
            .remove(room_id);
        let Some(room) = removed else { return };

        room.cancel_cleanup_timer();
        room.stop_reaper_task();

        self.players
            .write()
            .expect("player index lock poisoned")
            .retain(|_, rid| rid != room_id);

        room.metadata_mut().await.status = RoomStatus::Closed;
        room.synchronizer().clear_subscribers();
        self.gateway.drop_group(room_id.as_str());

        if let Err(e) = self.storage.delete_room(room_id).await {
            tracing::warn!(%room_id, error = %e, "failed to delete room from storage");
        }

        tracing::info!(%room_id, "room destroyed");
    }

    /// Read-only views of every live room.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let rooms: Vec<Arc<RoomInstance>> = self
            .rooms
            .read()
            .expect("room catalog lock poisoned")
            .values()
            .cloned()
            .collect();
        let mut infos = Vec::with_capacity(rooms.len());
        for room in rooms {
            infos.push(room.info().await);
        }
        infos
    }

    /// Room views matching a predicate.
    pub async fn list_rooms_filtered<F>(&self, predicate: F) -> Vec<RoomInfo>
    where
        F: Fn(&RoomInfo) -> bool,
    {
        self.list_rooms()
            .await
            .into_iter()
            .filter(|info| predicate(info))
            .collect()
    }

    // -- Player→room index -------------------------------------------------

    pub fn track_player(&self, player_id: PlayerId, room_id: RoomId) {
        self.players
            .write()
            .expect("player index lock poisoned")
            .insert(player_id, room_id);
    }

    pub fn untrack_player(&self, player_id: PlayerId) {
        self.players
            .write()
            .expect("player index lock poisoned")
            .remove(&player_id);
    }

    pub fn room_for_player(&self, player_id: PlayerId) -> Option<RoomId> {
        self.players
            .read()
            .expect("player index lock poisoned")
            .get(&player_id)
            .cloned()
    }

    pub fn tracked_player_count(&self) -> usize {
        self.players
            .read()
            .expect("player index lock poisoned")
            .len()
    }

    // -- Activity and metadata ---------------------------------------------

    /// Records activity: bumps `last_activity`, persists, and re-arms
    /// the room's TTL one-shot (cancelling the prior one).
    pub async fn touch_activity(&self, room_id: &RoomId) -> Result<(), GameError> {
        let room = self.get_room(room_id)?;

        let snapshot = {
            let mut metadata = room.metadata_mut().await;
            metadata.last_activity = now_millis();
            metadata.clone()
        };
        self.storage.upsert_room_metadata(room_id, &snapshot).await?;

        let weak = self.weak_self.clone();
        let expiring = room_id.clone();
        let ttl = self.config.default_ttl;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(manager) = weak.upgrade() {
                tracing::info!(room_id = %expiring, "room TTL expired");
                manager.delete_room(&expiring).await;
            }
        });
        room.arm_cleanup_timer(handle);
        Ok(())
    }

    /// Merges a metadata patch and persists the result.
    pub async fn update_room_metadata(
        &self,
        room_id: &RoomId,
        patch: RoomMetadataPatch,
    ) -> Result<(), GameError> {
        let room = self.get_room(room_id)?;
        let snapshot = {
            let mut metadata = room.metadata_mut().await;
            patch.apply(&mut metadata);
            metadata.clone()
        };
        self.storage.upsert_room_metadata(room_id, &snapshot).await?;
        Ok(())
    }

    // -- Cleanup -----------------------------------------------------------

    /// Starts the periodic inactivity scan. Idempotent.
    pub fn start_cleanup(&self) {
        let mut slot = self.cleanup_task.lock().expect("cleanup lock poisoned");
        if slot.is_some() {
            return;
        }
        let weak = self.weak_self.clone();
        let interval = self.config.cleanup_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else { break };
                manager.run_cleanup_scan().await;
            }
        }));
    }

    pub fn stop_cleanup(&self) {
        let mut slot = self.cleanup_task.lock().expect("cleanup lock poisoned");
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    /// One inactivity sweep: ask storage for stale rooms and delete the
    /// ones still in the catalog. Covers timers lost to restarts or
    /// missed fires; failures are logged and never fatal.
    pub async fn run_cleanup_scan(&self) {
        let threshold = now_millis().saturating_sub(self.config.default_ttl.as_millis() as u64);
        match self.storage.list_inactive_room_ids(threshold).await {
            Ok(stale) => {
                for room_id in stale {
                    if self.has_room(&room_id) {
                        tracing::info!(%room_id, "cleanup scan removing idle room");
                        self.delete_room(&room_id).await;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cleanup scan failed");
            }
        }
    }

    /// Stops cleanup, cancels every per-room timer, clears all maps.
    /// Storage stays open — its owner closes it.
    pub async fn shutdown(&self) {
        self.stop_cleanup();
        let rooms: Vec<Arc<RoomInstance>> = {
            let mut map = self.rooms.write().expect("room catalog lock poisoned");
            map.drain().map(|(_, room)| room).collect()
        };
        for room in &rooms {
            room.cancel_cleanup_timer();
            room.stop_reaper_task();
            room.synchronizer().clear_subscribers();
            self.gateway.drop_group(room.room_id().as_str());
        }
        self.players
            .write()
            .expect("player index lock poisoned")
            .clear();
        tracing::info!(rooms = rooms.len(), "room manager shut down");
    }

    /// A player's disconnect grace expired: remove them as if they had
    /// left, under the room's lock so it serializes with live traffic.
    async fn reap_player(&self, room_id: &RoomId, player_id: PlayerId) {
        let Ok(room) = self.get_room(room_id) else {
            return;
        };

        {
            let mut game = room.game().await;
            let still_absent = game
                .state()
                .player(player_id)
                .is_some_and(|p| !p.is_connected);
            if !still_absent {
                // Reconnected (or already gone) before we got here.
                return;
            }
            if let Err(e) = game.leave_player(player_id).await {
                tracing::warn!(%room_id, %player_id, error = %e, "grace expiry removal failed");
                return;
            }
            // Count update happens inside the room's lock so it can't
            // interleave with a racing join or leave.
            let remaining = game.players().len();
            if let Err(e) = self
                .update_room_metadata(room_id, RoomMetadataPatch::player_count(remaining))
                .await
            {
                tracing::warn!(%room_id, error = %e, "metadata update after reap failed");
            }
        }

        room.synchronizer().unregister_player(player_id);
        self.untrack_player(player_id);
        tracing::info!(%room_id, %player_id, "player removed after disconnect grace");
    }
}
