//! Room lifecycle management for Bonfire.
//!
//! This crate is the orchestration core: it owns the catalog of live
//! rooms, routes every mutation through a per-room serialization
//! domain, fans authoritative state out to subscribed connections, and
//! reclaims idle rooms on two independent TTL mechanisms.
//!
//! The pieces, leaves first:
//!
//! - [`Game`] — the capability contract a game implementation plugs in
//!   through a [`GameFactory`]. [`GameBase`] is the reusable state
//!   container most games embed.
//! - [`Synchronizer`] — per-room fan-out plus the persist-then-publish
//!   binding to storage.
//! - [`RoomInstance`] — one live room: the game behind its lock, the
//!   synchronizer, metadata, and the cleanup timer.
//! - [`RoomManager`] — the catalog: creation, lookup, player tracking,
//!   TTL cleanup, shutdown.
//!
//! # Concurrency model
//!
//! Rooms evolve independently. Within one room, every mutation goes
//! through the room's game mutex, so state observations delivered to
//! any connection are consistent with a single linearization of that
//! room's history. Persistence happens before the corresponding
//! publish, so a recovered state is never newer than what a client saw.

mod base;
mod game;
mod manager;
mod room;
mod sync;

pub use base::GameBase;
pub use game::{ActionData, Game, GameConfig, GameContext, GameFactory, ReaperHandle};
pub use manager::{RoomManager, RoomManagerConfig};
pub use room::{RoomInfo, RoomInstance, RoomMetadataPatch};
pub use sync::Synchronizer;
