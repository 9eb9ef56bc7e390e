//! `GameBase`: the reusable state container games embed.
//!
//! The [`Game`](crate::Game) trait is deliberately wide — join, leave,
//! disconnect grace, phase transitions — and almost all of it is the
//! same for every party game. `GameBase` implements that shared core;
//! a concrete game holds one, delegates the lifecycle methods to it,
//! and keeps its own rules in `handle_action`.

use std::collections::HashMap;

use bonfire_protocol::{GameError, GameState, Player, PlayerId, events};
use serde_json::json;
use tokio::task::JoinHandle;

use crate::game::{GameConfig, GameContext, ReaperHandle};
use crate::sync::Synchronizer;
use std::sync::Arc;

/// Shared lifecycle implementation: players, phases, disconnect grace
/// timers, and the broadcast-after-mutation discipline.
pub struct GameBase {
    config: GameConfig,
    state: GameState,
    synchronizer: Arc<Synchronizer>,
    reaper: ReaperHandle,
    /// One pending grace timer per disconnected player.
    /// Invariant: cancel before reassign.
    disconnect_timers: HashMap<PlayerId, JoinHandle<()>>,
}

impl GameBase {
    /// Builds the base for a new room, starting in the config's initial
    /// phase.
    pub fn new(config: GameConfig, ctx: &GameContext) -> Self {
        let state = GameState::new(ctx.room_id.clone(), config.initial_phase());
        Self {
            config,
            state,
            synchronizer: Arc::clone(&ctx.synchronizer),
            reaper: ctx.reaper.clone(),
            disconnect_timers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Mutable access for game rules. Callers own the follow-up
    /// [`publish_state`](Self::publish_state).
    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    pub fn players(&self) -> &[Player] {
        &self.state.players
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }

    /// Persists and broadcasts the current state.
    pub async fn publish_state(&self) -> Result<(), GameError> {
        self.synchronizer.broadcast_state(&self.state).await
    }

    /// Validates and adds a player, then announces them.
    pub async fn join_player(&mut self, mut player: Player) -> Result<(), GameError> {
        let name = player.name.trim();
        if name.is_empty() {
            return Err(GameError::invalid_input("player name must not be empty"));
        }
        if self.state.has_player(player.id) {
            return Err(GameError::player_join_failed("player already in room"));
        }
        if self
            .state
            .players
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(name))
        {
            return Err(GameError::player_join_failed(format!(
                "name {name:?} is already taken"
            )));
        }
        if self.state.players.len() >= self.config.max_players {
            return Err(GameError::room_full(format!(
                "room is full (maximum {} players)",
                self.config.max_players
            )));
        }
        if self.state.phase != self.config.initial_phase() && !self.config.allow_join_in_progress
        {
            return Err(GameError::player_join_failed(
                "cannot join a game in progress",
            ));
        }

        player.name = name.to_owned();
        self.state.players.push(player.clone());
        tracing::info!(
            room_id = %self.state.room_id,
            player_id = %player.id,
            players = self.state.players.len(),
            "player joined"
        );

        self.synchronizer
            .broadcast_event(events::PLAYER_JOINED, json!({ "player": player }));
        self.publish_state().await
    }

    /// Removes a player, reassigning the host role if needed.
    pub async fn leave_player(&mut self, player_id: PlayerId) -> Result<(), GameError> {
        let index = self
            .state
            .players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or_else(|| GameError::player_not_found(player_id))?;

        let removed = self.state.players.remove(index);
        self.cancel_timer(player_id);

        // The host left: promote the longest-joined remaining player.
        if removed.is_host {
            if let Some(successor) = self
                .state
                .players
                .iter_mut()
                .min_by_key(|p| p.joined_at)
            {
                successor.is_host = true;
                tracing::info!(
                    room_id = %self.state.room_id,
                    player_id = %successor.id,
                    "host reassigned"
                );
            }
        }

        tracing::info!(
            room_id = %self.state.room_id,
            %player_id,
            players = self.state.players.len(),
            "player left"
        );

        self.synchronizer.broadcast_event(
            events::PLAYER_LEFT,
            json!({ "playerId": player_id, "name": removed.name }),
        );
        self.publish_state().await
    }

    /// Marks a player disconnected and arms their grace timer.
    pub async fn disconnect_player(&mut self, player_id: PlayerId) {
        let Some(player) = self.state.player_mut(player_id) else {
            return;
        };
        player.is_connected = false;

        let timeout = self.config.disconnect_timeout;
        let reaper = self.reaper.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            reaper.expired(player_id);
        });
        self.arm_timer(player_id, handle);

        tracing::info!(
            room_id = %self.state.room_id,
            %player_id,
            timeout_ms = timeout.as_millis() as u64,
            "player disconnected, grace period started"
        );

        self.synchronizer
            .broadcast_event(events::PLAYER_DISCONNECTED, json!({ "playerId": player_id }));
        if let Err(e) = self.publish_state().await {
            tracing::warn!(room_id = %self.state.room_id, error = %e, "state broadcast failed");
        }
    }

    /// Cancels a pending grace timer and marks the player connected.
    pub async fn reconnect_player(&mut self, player_id: PlayerId) {
        self.cancel_timer(player_id);
        let Some(player) = self.state.player_mut(player_id) else {
            return;
        };
        if player.is_connected {
            return;
        }
        player.is_connected = true;

        tracing::info!(room_id = %self.state.room_id, %player_id, "player reconnected");

        self.synchronizer
            .broadcast_event(events::PLAYER_RECONNECTED, json!({ "playerId": player_id }));
        if let Err(e) = self.publish_state().await {
            tracing::warn!(room_id = %self.state.room_id, error = %e, "state broadcast failed");
        }
    }

    /// Transitions from the initial phase into play.
    pub async fn start_game(&mut self) -> Result<(), GameError> {
        if self.state.phase != self.config.initial_phase() {
            return Err(GameError::invalid_game_state("game already started"));
        }
        if self.state.players.len() < self.config.min_players {
            return Err(GameError::invalid_game_state(format!(
                "need at least {} players to start",
                self.config.min_players
            )));
        }

        let next = self
            .config
            .phases
            .get(1)
            .cloned()
            .unwrap_or_else(|| self.config.final_phase().to_owned());
        let previous = std::mem::replace(&mut self.state.phase, next.clone());

        tracing::info!(room_id = %self.state.room_id, phase = %next, "game started");

        self.synchronizer
            .broadcast_event(events::GAME_STARTED, json!({ "phase": next }));
        self.synchronizer.broadcast_event(
            events::PHASE_CHANGED,
            json!({ "phase": next, "previous": previous }),
        );
        self.publish_state().await
    }

    /// Terminal transition into the final phase.
    pub async fn end_game(&mut self) {
        self.cancel_all_timers();
        let final_phase = self.config.final_phase().to_owned();
        let previous = std::mem::replace(&mut self.state.phase, final_phase.clone());

        tracing::info!(room_id = %self.state.room_id, "game ended");

        self.synchronizer
            .broadcast_event(events::GAME_ENDED, json!({ "phase": final_phase }));
        self.synchronizer.broadcast_event(
            events::PHASE_CHANGED,
            json!({ "phase": final_phase, "previous": previous }),
        );
        if let Err(e) = self.publish_state().await {
            tracing::warn!(room_id = %self.state.room_id, error = %e, "state broadcast failed");
        }
    }

    /// Moves to another declared phase. For game rules advancing play
    /// (round → scoring → round ...).
    pub async fn set_phase(&mut self, phase: &str) -> Result<(), GameError> {
        if !self.config.declares_phase(phase) {
            return Err(GameError::invalid_game_state(format!(
                "phase {phase:?} is not declared by this game"
            )));
        }
        let previous = std::mem::replace(&mut self.state.phase, phase.to_owned());
        self.synchronizer.broadcast_event(
            events::PHASE_CHANGED,
            json!({ "phase": phase, "previous": previous }),
        );
        self.publish_state().await
    }

    fn arm_timer(&mut self, player_id: PlayerId, handle: JoinHandle<()>) {
        if let Some(old) = self.disconnect_timers.insert(player_id, handle) {
            old.abort();
        }
    }

    fn cancel_timer(&mut self, player_id: PlayerId) {
        if let Some(handle) = self.disconnect_timers.remove(&player_id) {
            handle.abort();
        }
    }

    fn cancel_all_timers(&mut self) {
        for (_, handle) in self.disconnect_timers.drain() {
            handle.abort();
        }
    }
}

impl Drop for GameBase {
    fn drop(&mut self) {
        // Room teardown must not leave grace timers ticking.
        self.cancel_all_timers();
    }
}
