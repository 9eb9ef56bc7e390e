//! The `Game` trait — the contract the runtime drives a game through.
//!
//! The core never interprets game rules. It creates a game through the
//! injected factory, funnels player lifecycle and actions into it, and
//! lets the game talk back to its room through the [`Synchronizer`] it
//! was constructed with.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bonfire_protocol::{GameError, GameState, Player, PlayerId, RoomId};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::Synchronizer;

/// Read-only configuration a game declares about itself.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Fewest players required for `start_game` to succeed.
    pub min_players: usize,
    /// Most players a join will be accepted for.
    pub max_players: usize,
    /// The ordered phase list. First entry is the lobby phase a room is
    /// created in; last entry is the terminal phase `end_game` jumps to.
    pub phases: Vec<String>,
    /// How long a disconnected player may be absent before being
    /// treated as having left.
    pub disconnect_timeout: Duration,
    /// Whether players may join after the game has left its initial
    /// phase. Applies to every non-initial phase, not just active play.
    pub allow_join_in_progress: bool,
}

impl GameConfig {
    /// The phase a freshly created room sits in.
    pub fn initial_phase(&self) -> &str {
        self.phases.first().map(String::as_str).unwrap_or("lobby")
    }

    /// The terminal phase.
    pub fn final_phase(&self) -> &str {
        self.phases.last().map(String::as_str).unwrap_or("ended")
    }

    /// Whether `phase` appears in the declared list.
    pub fn declares_phase(&self, phase: &str) -> bool {
        self.phases.iter().any(|p| p == phase)
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 8,
            phases: vec!["lobby".into(), "playing".into(), "ended".into()],
            disconnect_timeout: Duration::from_secs(30),
            allow_join_in_progress: false,
        }
    }
}

/// Optional data a game hands back from an action, passed through to
/// the requester's acknowledgement.
pub type ActionData = Option<Value>;

/// The per-room state machine and rule interpreter.
///
/// Implementations are owned by a [`crate::RoomInstance`] behind its
/// room mutex, so methods take `&mut self` and never race with each
/// other. State changes are published by the game itself (usually via
/// [`GameBase`](crate::GameBase)) — the core does not poll for them.
#[async_trait]
pub trait Game: Send + Sync {
    /// The game's declared configuration.
    fn config(&self) -> &GameConfig;

    /// Snapshot accessor for the current state.
    fn state(&self) -> &GameState;

    /// Convenience accessor for the players sequence.
    fn players(&self) -> &[Player] {
        &self.state().players
    }

    /// Adds a player. Fails if the name is invalid, the room is full,
    /// the player is a duplicate, or the game is in progress and does
    /// not allow late joins.
    async fn join_player(&mut self, player: Player) -> Result<(), GameError>;

    /// Removes a player. If they were the host, the game decides host
    /// reassignment.
    async fn leave_player(&mut self, player_id: PlayerId) -> Result<(), GameError>;

    /// Marks a player disconnected and starts the grace timeout, after
    /// which they are treated as having left.
    async fn disconnect_player(&mut self, player_id: PlayerId);

    /// Cancels a pending grace timeout and marks the player connected
    /// again.
    async fn reconnect_player(&mut self, player_id: PlayerId);

    /// Transitions from the initial phase into play. Fails below
    /// `min_players` or outside the initial phase.
    async fn start_game(&mut self) -> Result<(), GameError>;

    /// Terminal transition. After this the room is eligible for
    /// deletion.
    async fn end_game(&mut self);

    /// The open extension point for game-specific inputs. The core
    /// validates only that `action_type` is non-empty and the player is
    /// present; everything else is the game's business.
    async fn handle_action(
        &mut self,
        player_id: PlayerId,
        action_type: &str,
        payload: Value,
    ) -> Result<ActionData, GameError>;
}

/// Everything a factory gets to build a game for a new room.
pub struct GameContext {
    pub room_id: RoomId,
    /// The label the client asked for (`"trivia"`, ...).
    pub game_type: String,
    /// The room's fan-out and persistence binding.
    pub synchronizer: Arc<Synchronizer>,
    /// Where expired disconnect-grace timers report to.
    pub reaper: ReaperHandle,
}

/// Builds a game instance for a new room.
///
/// Returning an error aborts room creation (e.g. an unknown
/// `game_type`).
pub type GameFactory =
    Arc<dyn Fn(GameContext) -> Result<Box<dyn Game>, GameError> + Send + Sync>;

/// Sender half of a room's reaper channel.
///
/// A game's disconnect-grace timer fires into this; the room manager
/// drains the other end and removes the player under the room's lock,
/// so the removal serializes with everything else touching the room.
#[derive(Clone)]
pub struct ReaperHandle {
    tx: mpsc::UnboundedSender<PlayerId>,
}

impl ReaperHandle {
    /// Creates the handle plus the receiving end the manager drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PlayerId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Reports that a player's grace period expired. Errors (manager
    /// already gone) are ignored — the room is being torn down anyway.
    pub fn expired(&self, player_id: PlayerId) {
        let _ = self.tx.send(player_id);
    }
}
