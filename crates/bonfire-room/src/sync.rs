//! Per-room fan-out and persistence binding.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bonfire_protocol::{
    Codec, GameError, GameState, JsonCodec, PlayerId, RoomEvent, RoomId, ServerFrame,
};
use bonfire_storage::Storage;
use bonfire_transport::{ConnectionId, Gateway};
use serde_json::Value;

/// Translates room-level outputs into transport frames for the right
/// subscribers, persisting state along the way.
///
/// Owns the `PlayerId → ConnectionId` subscribers map; a missing entry
/// is a disconnected player. Does not own player or game state — it is
/// constructed before any player registers and outlives none of them.
pub struct Synchronizer {
    room_id: RoomId,
    storage: Arc<dyn Storage>,
    gateway: Arc<Gateway>,
    codec: JsonCodec,
    subscribers: Mutex<HashMap<PlayerId, ConnectionId>>,
    /// Set on room deletion. A closed synchronizer drops every
    /// broadcast, so a straggling mutation can neither reach former
    /// subscribers nor resurrect state in storage.
    closed: AtomicBool,
}

impl Synchronizer {
    pub fn new(room_id: RoomId, storage: Arc<dyn Storage>, gateway: Arc<Gateway>) -> Self {
        Self {
            room_id,
            storage,
            gateway,
            codec: JsonCodec,
            subscribers: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Maps a player to their current connection. Called on initial
    /// join and again on every reconnect; last write wins.
    pub fn register_player(&self, player_id: PlayerId, connection_id: ConnectionId) {
        let mut subs = self.subscribers.lock().expect("subscriber lock poisoned");
        subs.insert(player_id, connection_id);
    }

    /// Drops a player's mapping (leave or disconnect).
    pub fn unregister_player(&self, player_id: PlayerId) {
        let mut subs = self.subscribers.lock().expect("subscriber lock poisoned");
        subs.remove(&player_id);
    }

    /// The connection currently mapped for a player, if any.
    pub fn connection_for(&self, player_id: PlayerId) -> Option<ConnectionId> {
        let subs = self.subscribers.lock().expect("subscriber lock poisoned");
        subs.get(&player_id).copied()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("subscriber lock poisoned").len()
    }

    /// Drops the whole map and marks the synchronizer closed. Called on
    /// room deletion; every later broadcast becomes a no-op.
    pub fn clear_subscribers(&self) {
        self.closed.store(true, Ordering::Release);
        let mut subs = self.subscribers.lock().expect("subscriber lock poisoned");
        subs.clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Persists the state, then publishes a `state:update` to every
    /// connection in the room's fan-out group — in that order, so
    /// recovery can never return a state newer than any client saw.
    pub async fn broadcast_state(&self, state: &GameState) -> Result<(), GameError> {
        if self.is_closed() {
            return Ok(());
        }
        self.storage.save_game_state(&self.room_id, state).await?;
        let frame = ServerFrame::StateUpdate {
            state: state.clone(),
        };
        self.publish(&frame);
        Ok(())
    }

    /// Publishes a `state:sync` to the one connection mapped for
    /// `player_id`. No-op if the player has no live connection. Used
    /// for reconnection hydration; does not persist.
    pub fn send_to_player(&self, player_id: PlayerId, state: &GameState) {
        if self.is_closed() {
            return;
        }
        let Some(connection_id) = self.connection_for(player_id) else {
            return;
        };
        let frame = ServerFrame::StateSync {
            state: state.clone(),
        };
        if let Ok(bytes) = self.encode(&frame) {
            self.gateway.send(connection_id, &bytes);
        }
    }

    /// Publishes a typed `event:emit` to the room.
    pub fn broadcast_event(&self, kind: &str, payload: Value) {
        if self.is_closed() {
            return;
        }
        let frame = ServerFrame::EventEmit {
            event: RoomEvent::new(kind, payload),
        };
        self.publish(&frame);
    }

    /// Publishes a `room:closed` with the given reason to the room.
    pub fn broadcast_closed(&self, reason: &str) {
        // Deliberately works even on a closed synchronizer: the close
        // notice is the last frame a room ever sends.
        let frame = ServerFrame::RoomClosed {
            reason: reason.to_owned(),
        };
        let Ok(bytes) = self.encode(&frame) else { return };
        self.gateway.publish(self.room_id.as_str(), &bytes);
    }

    fn publish(&self, frame: &ServerFrame) {
        match self.encode(frame) {
            Ok(bytes) => self.gateway.publish(self.room_id.as_str(), &bytes),
            Err(e) => {
                tracing::error!(room_id = %self.room_id, error = %e, "failed to encode frame")
            }
        }
    }

    fn encode(&self, frame: &ServerFrame) -> Result<Vec<u8>, bonfire_protocol::ProtocolError> {
        self.codec.encode(frame)
    }
}
