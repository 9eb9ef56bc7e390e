//! The error taxonomy: stable wire codes plus the tagged error value.
//!
//! Every failure a client can observe maps to one [`ErrorCode`]. The
//! codes are a closed set — game rule code reports its failures through
//! them too (most often `InvalidAction` / `NotImplemented`) so the wire
//! contract never grows ad hoc variants.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable machine-readable error codes.
///
/// Serialized in SCREAMING_SNAKE_CASE (`INVALID_INPUT`, ...) — these
/// strings are the wire contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    RoomNotFound,
    RoomFull,
    NotInRoom,
    Unauthorized,
    InvalidAction,
    PlayerJoinFailed,
    PlayerNotFound,
    InvalidGameState,
    LimitReached,
    CodeExhaustion,
    StorageError,
    NotImplemented,
    RateLimitExceeded,
    InternalError,
}

impl ErrorCode {
    /// HTTP-equivalent status for the admin surface. Pure function of
    /// the code.
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput
            | Self::RoomFull
            | Self::NotInRoom
            | Self::InvalidAction
            | Self::PlayerJoinFailed
            | Self::InvalidGameState
            | Self::NotImplemented => 400,
            Self::Unauthorized => 401,
            Self::RoomNotFound | Self::PlayerNotFound => 404,
            Self::RateLimitExceeded => 429,
            Self::LimitReached
            | Self::CodeExhaustion
            | Self::StorageError
            | Self::InternalError => 500,
        }
    }
}

/// The single tagged error value that flows from any layer to an
/// acknowledgement: `{ code, message, details? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct GameError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl GameError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches structured details to the error.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn room_not_found(room_id: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::RoomNotFound, format!("room {room_id} not found"))
    }

    pub fn room_full(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RoomFull, message)
    }

    pub fn not_in_room() -> Self {
        Self::new(ErrorCode::NotInRoom, "not in a room")
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn invalid_action(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAction, message)
    }

    pub fn player_join_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PlayerJoinFailed, message)
    }

    pub fn player_not_found(player_id: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::PlayerNotFound,
            format!("player {player_id} not found"),
        )
    }

    pub fn invalid_game_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidGameState, message)
    }

    pub fn limit_reached(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::LimitReached, message)
    }

    pub fn code_exhaustion() -> Self {
        Self::new(
            ErrorCode::CodeExhaustion,
            "could not generate a unique room code",
        )
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, message)
    }

    pub fn not_implemented(action: &str) -> Self {
        Self::new(
            ErrorCode::NotImplemented,
            format!("unknown action type: {action}"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

/// Errors from the encode/decode boundary.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
