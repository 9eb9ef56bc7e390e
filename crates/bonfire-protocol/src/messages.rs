//! Wire frames: client requests, acknowledgements, server pushes.
//!
//! Every client request carries a `seq` correlator; the server answers
//! with exactly one `ack` frame echoing that `seq`. Unsolicited frames
//! (`state:update`, `event:emit`, ...) may interleave with acks on the
//! same connection but never replace them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorCode, GameError};
use crate::state::GameState;
use crate::types::PlayerId;

/// A request from a client.
///
/// Internally tagged so the wire form reads
/// `{ "type": "room:create", "gameType": ..., "hostName": ... }`.
/// Room ids and names arrive as raw strings — validation happens in the
/// server's dispatch, not during decoding, so a malformed code yields a
/// proper `INVALID_INPUT` ack instead of a decode error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRequest {
    #[serde(rename = "room:create", rename_all = "camelCase")]
    RoomCreate { game_type: String, host_name: String },

    #[serde(rename = "room:join", rename_all = "camelCase")]
    RoomJoin { room_id: String, player_name: String },

    #[serde(rename = "room:leave")]
    RoomLeave,

    #[serde(rename = "game:start")]
    GameStart,

    #[serde(rename = "game:action", rename_all = "camelCase")]
    GameAction {
        action_type: String,
        #[serde(default)]
        payload: Value,
    },

    /// Requests the current state. The optional identity pair is the
    /// reconnection seam: a fresh connection presenting a known
    /// `(roomId, playerId)` is re-attached to that room, replacing the
    /// player's previous connection.
    #[serde(rename = "state:request", rename_all = "camelCase")]
    StateRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<PlayerId>,
    },
}

/// The top-level client frame: a request plus its ack correlator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub seq: u64,
    #[serde(flatten)]
    pub request: ClientRequest,
}

/// A typed room event carried by `event:emit` frames.
///
/// Well-known kinds live in [`events`]; games may emit their own kinds
/// through the same frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl RoomEvent {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// Well-known event kinds emitted by the framework itself.
pub mod events {
    pub const PLAYER_JOINED: &str = "player:joined";
    pub const PLAYER_LEFT: &str = "player:left";
    pub const PLAYER_DISCONNECTED: &str = "player:disconnected";
    pub const PLAYER_RECONNECTED: &str = "player:reconnected";
    pub const GAME_STARTED: &str = "game:started";
    pub const GAME_ENDED: &str = "game:ended";
    pub const PHASE_CHANGED: &str = "phase:changed";
}

/// The acknowledgement for one client request.
///
/// `data` is flattened into the frame body, so a successful
/// `room:create` ack reads
/// `{ "type": "ack", "seq": 1, "success": true, "roomId": ..., "state": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub seq: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Ack {
    /// A bare success ack with no payload.
    pub fn ok(seq: u64) -> Self {
        Self {
            seq,
            success: true,
            error: None,
            code: None,
            data: Map::new(),
        }
    }

    /// A success ack carrying payload fields.
    pub fn ok_with(seq: u64, data: Map<String, Value>) -> Self {
        Self {
            seq,
            success: true,
            error: None,
            code: None,
            data,
        }
    }

    /// A failure ack from a [`GameError`].
    pub fn fail(seq: u64, err: &GameError) -> Self {
        let mut data = Map::new();
        if let Some(details) = &err.details {
            data.insert("details".into(), details.clone());
        }
        Self {
            seq,
            success: false,
            error: Some(err.message.clone()),
            code: Some(err.code),
            data,
        }
    }
}

/// A frame from server to client: the ack stream plus unsolicited
/// pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "ack")]
    Ack(Ack),

    /// Full authoritative state, broadcast room-wide after a mutation.
    #[serde(rename = "state:update")]
    StateUpdate { state: GameState },

    /// Full state targeted at one connection (reconnection hydration).
    #[serde(rename = "state:sync")]
    StateSync { state: GameState },

    #[serde(rename = "event:emit")]
    EventEmit { event: RoomEvent },

    /// Unsolicited error affecting an established session.
    #[serde(rename = "error")]
    Error {
        message: String,
        code: ErrorCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },

    #[serde(rename = "room:closed")]
    RoomClosed { reason: String },
}
