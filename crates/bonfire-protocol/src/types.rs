//! Identity types and the shared clock helper.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::code::{is_valid_room_code, normalize_room_code};
use crate::error::GameError;

/// A unique, opaque identifier for a player.
///
/// Minted by the server when a player joins and stable across reconnects:
/// a new socket presenting the same `PlayerId` is treated as the same
/// player. Backed by a UUIDv4 so ids never collide across rooms or
/// process restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    /// Mints a fresh player id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PlayerId {
    type Err = GameError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(input.trim())
            .map(Self)
            .map_err(|_| GameError::invalid_input(format!("invalid player id: {input:?}")))
    }
}

/// A room identifier: the canonical 6-character join code.
///
/// Only constructible through [`RoomId::parse`] (which normalizes and
/// validates user input) or [`crate::generate_room_code`], so a held
/// `RoomId` is always in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Parses user-supplied input into a canonical room id.
    ///
    /// Accepts lowercase and surrounding whitespace; rejects anything
    /// that is not 6 characters from the room-code alphabet after
    /// normalization.
    pub fn parse(input: &str) -> Result<Self, GameError> {
        let normalized = normalize_room_code(input);
        if !is_valid_room_code(&normalized) {
            return Err(GameError::invalid_input(format!(
                "invalid room code: {input:?}"
            )));
        }
        Ok(Self(normalized))
    }

    /// Wraps a string that is already known to be canonical.
    ///
    /// Used by the code generator; everything else goes through
    /// [`RoomId::parse`].
    pub(crate) fn from_canonical(code: String) -> Self {
        debug_assert!(is_valid_room_code(&code));
        Self(code)
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Used for `createdAt` / `lastActivity` / `joinedAt`. These values are
/// persisted and compared across process restarts, so they must come
/// from the wall clock rather than a monotonic instant.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
