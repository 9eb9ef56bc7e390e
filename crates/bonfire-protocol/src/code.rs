//! Room-code generation and validation.
//!
//! Room codes are what players read out loud to each other, so the
//! alphabet excludes the visually ambiguous characters `O`, `I`, `0`
//! and `1`.

use rand::Rng;

use crate::types::RoomId;

/// The 32-character alphabet room codes are drawn from.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Every room code is exactly this many characters.
pub const ROOM_CODE_LENGTH: usize = 6;

/// Generates a random room code.
///
/// Uniqueness against live rooms is the caller's job (the room manager
/// retries on collision); this function only guarantees the format.
pub fn generate_room_code() -> RoomId {
    let mut rng = rand::rng();
    let code: String = (0..ROOM_CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..ROOM_CODE_ALPHABET.len());
            ROOM_CODE_ALPHABET[idx] as char
        })
        .collect();
    RoomId::from_canonical(code)
}

/// Returns `true` if `code` is a canonical room code: exactly 6
/// characters, all drawn from [`ROOM_CODE_ALPHABET`].
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LENGTH
        && code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
}

/// Normalizes user input toward canonical form: trims surrounding
/// whitespace and uppercases. Idempotent. Does NOT validate — feed the
/// result to [`is_valid_room_code`] or [`RoomId::parse`].
pub fn normalize_room_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}
