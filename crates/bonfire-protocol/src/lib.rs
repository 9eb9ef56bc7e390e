//! Wire protocol and shared data model for Bonfire.
//!
//! This crate defines the "language" that clients and servers speak:
//!
//! - **Identity** ([`PlayerId`], [`RoomId`]) and the room-code format.
//! - **Data model** ([`Player`], [`GameState`], [`RoomMetadata`]) — the
//!   structures that are both broadcast on the wire and persisted by the
//!   storage layer.
//! - **Messages** ([`ClientFrame`], [`ServerFrame`], [`Ack`]) — the
//!   request/acknowledgement protocol plus unsolicited server pushes.
//! - **Errors** ([`ErrorCode`], [`GameError`], [`ProtocolError`]) — the
//!   closed taxonomy with stable wire codes.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how messages are
//!   converted to/from bytes.
//!
//! # Architecture
//!
//! The protocol layer sits below everything else. It doesn't know about
//! connections, rooms, or storage backends — it only knows the shapes
//! that travel between them.

mod code;
mod codec;
mod error;
mod messages;
mod state;
mod types;

pub use code::{
    ROOM_CODE_ALPHABET, ROOM_CODE_LENGTH, generate_room_code, is_valid_room_code,
    normalize_room_code,
};
pub use codec::{Codec, JsonCodec};
pub use error::{ErrorCode, GameError, ProtocolError};
pub use messages::{Ack, ClientFrame, ClientRequest, RoomEvent, ServerFrame, events};
pub use state::{GameState, Player, RoomMetadata, RoomStatus};
pub use types::{PlayerId, RoomId, now_millis};
