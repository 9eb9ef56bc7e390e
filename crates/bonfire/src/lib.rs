//! # Bonfire
//!
//! Server runtime for social, room-based multiplayer party games.
//!
//! Bonfire terminates realtime client connections, creates and destroys
//! game rooms, routes player requests into per-room game instances,
//! broadcasts authoritative state to connected players, persists rooms
//! through a pluggable storage adapter, and manages the full lifecycle
//! of rooms and players — disconnection, reconnection, grace timeouts,
//! and TTL-driven cleanup. Game rules plug in through the
//! [`Game`](bonfire_room::Game) trait; the runtime is polymorphic over
//! them.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bonfire::prelude::*;
//!
//! # fn factory() -> GameFactory { unimplemented!() }
//! # async fn run() -> Result<(), BonfireError> {
//! let storage = Arc::new(MemoryStorage::new());
//! storage.initialize().await?;
//!
//! let server = BonfireServer::bind(ServerConfig::default(), storage, factory()).await?;
//! server.run().await
//! # }
//! ```

mod admin;
mod error;
mod handler;
mod server;
mod stats;

pub use error::BonfireError;
pub use server::{BonfireServer, ServerConfig, ServerHandle};
pub use stats::ServerStats;

/// Everything a game server binary usually needs.
pub mod prelude {
    pub use crate::{BonfireError, BonfireServer, ServerConfig, ServerHandle, ServerStats};
    pub use bonfire_protocol::{
        ErrorCode, GameError, GameState, Player, PlayerId, RoomId, RoomMetadata, RoomStatus,
    };
    pub use bonfire_room::{
        ActionData, Game, GameBase, GameConfig, GameContext, GameFactory, RoomManagerConfig,
        Synchronizer,
    };
    pub use bonfire_storage::{FirebaseStorage, MemoryStorage, Storage, StorageError};
}
