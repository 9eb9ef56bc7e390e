//! The persisted / broadcast data model: players, game state, metadata.
//!
//! These structs travel on the wire (inside `state:update` frames) and
//! through the storage layer, so their serde shape is the contract both
//! sides depend on. Field names are camelCase to match the client SDK.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GameError;
use crate::types::{PlayerId, RoomId};

/// A player inside a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    /// Display name, trimmed and non-empty by the time it gets here.
    pub name: String,
    /// The room creator. Exactly one player per room holds this.
    pub is_host: bool,
    /// Toggled by connect/disconnect; a disconnected player stays in
    /// the room until their grace period expires.
    pub is_connected: bool,
    /// Wall-clock millis when the player joined. Stable across
    /// reconnects — used as the host-reassignment tie-break.
    pub joined_at: u64,
    /// Game-defined extras (avatar, team, score, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl Player {
    /// Creates a connected player joining now.
    pub fn new(id: PlayerId, name: impl Into<String>, is_host: bool, joined_at: u64) -> Self {
        Self {
            id,
            name: name.into(),
            is_host,
            is_connected: true,
            joined_at,
            metadata: None,
        }
    }
}

/// The authoritative state of one room's game.
///
/// Mutated only through `Game` operations; every mutation is followed
/// by a persist-then-broadcast through the room's synchronizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub room_id: RoomId,
    /// One of the phases the game declared in its config.
    pub phase: String,
    /// Ordered join sequence. `#[serde(default)]` because backends that
    /// elide empty collections must still round-trip a zero-player room.
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
    /// Game-defined turn order (may differ from join order).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_order: Option<Vec<PlayerId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_turn_index: Option<usize>,
}

impl GameState {
    /// Fresh state for a newly created room in the given initial phase.
    pub fn new(room_id: RoomId, phase: impl Into<String>) -> Self {
        Self {
            room_id,
            phase: phase.into(),
            players: Vec::new(),
            metadata: None,
            player_order: None,
            current_turn_index: None,
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn has_player(&self, id: PlayerId) -> bool {
        self.player(id).is_some()
    }
}

/// The lifecycle status of a room.
///
/// Transitions are strictly forward:
///
/// ```text
/// waiting → playing → ended → closed
/// ```
///
/// `closed` is set just before deletion; there is no way back to
/// `waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Ended,
    Closed,
}

impl RoomStatus {
    /// Returns the next status in the lifecycle, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Waiting => Some(Self::Playing),
            Self::Playing => Some(Self::Ended),
            Self::Ended => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Returns `true` if the room is accepting first-time joins without
    /// the game's `allow_join_in_progress` opt-in.
    pub fn is_waiting(self) -> bool {
        matches!(self, Self::Waiting)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Playing => write!(f, "playing"),
            Self::Ended => write!(f, "ended"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for RoomStatus {
    type Err = GameError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "waiting" => Ok(Self::Waiting),
            "playing" => Ok(Self::Playing),
            "ended" => Ok(Self::Ended),
            "closed" => Ok(Self::Closed),
            other => Err(GameError::invalid_input(format!(
                "unknown room status: {other:?}"
            ))),
        }
    }
}

/// Bookkeeping record for a room, persisted alongside its state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMetadata {
    pub room_id: RoomId,
    pub created_at: u64,
    /// Updated on every interaction; drives TTL cleanup.
    pub last_activity: u64,
    pub host_player_id: PlayerId,
    pub player_count: usize,
    pub status: RoomStatus,
    /// Which game factory built this room (e.g. `"trivia"`).
    pub game_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_players(n: usize) -> GameState {
        let mut state = GameState::new(RoomId::parse("ABC234").unwrap(), "lobby");
        for i in 0..n {
            state
                .players
                .push(Player::new(PlayerId::generate(), format!("p{i}"), i == 0, i as u64));
        }
        state
    }

    #[test]
    fn test_player_serializes_camel_case() {
        let player = Player::new(PlayerId::generate(), "Alice", true, 42);
        let json = serde_json::to_value(&player).unwrap();
        assert_eq!(json["name"], "Alice");
        assert_eq!(json["isHost"], true);
        assert_eq!(json["isConnected"], true);
        assert_eq!(json["joinedAt"], 42);
        // Absent metadata is omitted entirely, not null.
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_game_state_players_default_on_missing_field() {
        // A backend that dropped the empty players array must still
        // deserialize into `players: []`.
        let json = r#"{"roomId":"ABC234","phase":"lobby"}"#;
        let state: GameState = serde_json::from_str(json).unwrap();
        assert!(state.players.is_empty());
    }

    #[test]
    fn test_game_state_round_trip_with_empty_players() {
        let state = state_with_players(0);
        let bytes = serde_json::to_vec(&state).unwrap();
        let back: GameState = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_game_state_player_lookup() {
        let state = state_with_players(3);
        let second = state.players[1].id;
        assert!(state.has_player(second));
        assert_eq!(state.player(second).unwrap().name, "p1");
        assert!(!state.has_player(PlayerId::generate()));
    }

    #[test]
    fn test_room_status_next_follows_strict_order() {
        assert_eq!(RoomStatus::Waiting.next(), Some(RoomStatus::Playing));
        assert_eq!(RoomStatus::Playing.next(), Some(RoomStatus::Ended));
        assert_eq!(RoomStatus::Ended.next(), Some(RoomStatus::Closed));
        assert_eq!(RoomStatus::Closed.next(), None);
    }

    #[test]
    fn test_room_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RoomStatus::Waiting).unwrap(), "\"waiting\"");
        assert_eq!(serde_json::to_string(&RoomStatus::Playing).unwrap(), "\"playing\"");
    }

    #[test]
    fn test_room_status_parses_its_display_form() {
        for status in [
            RoomStatus::Waiting,
            RoomStatus::Playing,
            RoomStatus::Ended,
            RoomStatus::Closed,
        ] {
            let parsed: RoomStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        // Case and whitespace are forgiven; garbage is not.
        assert_eq!(" Waiting ".parse::<RoomStatus>().unwrap(), RoomStatus::Waiting);
        assert!("lobby".parse::<RoomStatus>().is_err());
    }

    #[test]
    fn test_room_metadata_round_trip() {
        let meta = RoomMetadata {
            room_id: RoomId::parse("XYZ789").unwrap(),
            created_at: 1000,
            last_activity: 2000,
            host_player_id: PlayerId::generate(),
            player_count: 4,
            status: RoomStatus::Playing,
            game_type: "trivia".into(),
        };
        let bytes = serde_json::to_vec(&meta).unwrap();
        let back: RoomMetadata = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, meta);
    }
}
