//! A minimal trivia party game on top of Bonfire.
//!
//! Shows the intended shape of a game crate: embed `GameBase` for the
//! shared lifecycle, keep the rules in `handle_action`, and wire the
//! server together in `main` from environment variables.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bonfire::prelude::*;
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Game rules
// ---------------------------------------------------------------------------

const QUESTIONS: &[(&str, &str)] = &[
    ("What is the largest planet in the solar system?", "jupiter"),
    ("Which element has the symbol O?", "oxygen"),
    ("How many sides does a hexagon have?", "6"),
    ("What is the capital of Japan?", "tokyo"),
    ("Which ocean is the deepest?", "pacific"),
];

struct TriviaGame {
    base: GameBase,
    round: usize,
    answers: HashMap<PlayerId, String>,
    scores: HashMap<PlayerId, u32>,
}

impl TriviaGame {
    fn config() -> GameConfig {
        GameConfig {
            min_players: 2,
            max_players: 8,
            phases: vec![
                "lobby".into(),
                "question".into(),
                "scores".into(),
                "ended".into(),
            ],
            ..GameConfig::default()
        }
    }

    fn current_question(&self) -> Option<(&'static str, &'static str)> {
        QUESTIONS.get(self.round).copied()
    }

    /// Publishes the current question into the shared state metadata.
    async fn ask_question(&mut self) -> Result<ActionData, GameError> {
        let Some((question, _)) = self.current_question() else {
            self.base.end_game().await;
            return Ok(Some(json!({ "finished": true })));
        };
        self.answers.clear();

        let metadata = self.base.state_mut().metadata.get_or_insert_default();
        metadata.insert("question".into(), json!(question));
        metadata.insert("round".into(), json!(self.round));
        self.base.set_phase("question").await?;
        Ok(Some(json!({ "question": question })))
    }

    async fn submit_answer(
        &mut self,
        player_id: PlayerId,
        payload: Value,
    ) -> Result<ActionData, GameError> {
        if self.base.state().phase != "question" {
            return Err(GameError::invalid_action("no question is open"));
        }
        let Some(answer) = payload.get("answer").and_then(Value::as_str) else {
            return Err(GameError::invalid_action("missing answer"));
        };
        self.answers.insert(player_id, answer.trim().to_lowercase());

        // Score the round once every connected player has answered.
        let connected = self
            .base
            .players()
            .iter()
            .filter(|p| p.is_connected)
            .count();
        if self.answers.len() >= connected {
            self.score_round().await?;
        }
        Ok(Some(json!({ "accepted": true })))
    }

    async fn score_round(&mut self) -> Result<(), GameError> {
        let Some((_, expected)) = self.current_question() else {
            return Ok(());
        };
        for (player_id, answer) in &self.answers {
            if answer == expected {
                *self.scores.entry(*player_id).or_default() += 1;
            }
        }
        self.round += 1;

        let standings = self.standings();
        let metadata = self.base.state_mut().metadata.get_or_insert_default();
        metadata.insert("standings".into(), standings);
        self.base.set_phase("scores").await
    }

    /// Scoreboard sorted best-first, ties broken by name for a stable
    /// display order.
    fn standings(&self) -> Value {
        let mut rows: Vec<(String, PlayerId, u32)> = self
            .base
            .players()
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    p.id,
                    self.scores.get(&p.id).copied().unwrap_or(0),
                )
            })
            .collect();
        rows.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        Value::Array(
            rows.into_iter()
                .map(|(name, id, score)| {
                    json!({ "playerId": id, "name": name, "score": score })
                })
                .collect(),
        )
    }

    fn require_host(&self, player_id: PlayerId) -> Result<(), GameError> {
        let is_host = self
            .base
            .state()
            .player(player_id)
            .is_some_and(|p| p.is_host);
        if is_host {
            Ok(())
        } else {
            Err(GameError::unauthorized("only the host advances rounds"))
        }
    }
}

#[async_trait]
impl Game for TriviaGame {
    fn config(&self) -> &GameConfig {
        self.base.config()
    }

    fn state(&self) -> &GameState {
        self.base.state()
    }

    async fn join_player(&mut self, player: Player) -> Result<(), GameError> {
        self.base.join_player(player).await
    }

    async fn leave_player(&mut self, player_id: PlayerId) -> Result<(), GameError> {
        self.answers.remove(&player_id);
        self.base.leave_player(player_id).await
    }

    async fn disconnect_player(&mut self, player_id: PlayerId) {
        self.base.disconnect_player(player_id).await;
    }

    async fn reconnect_player(&mut self, player_id: PlayerId) {
        self.base.reconnect_player(player_id).await;
    }

    async fn start_game(&mut self) -> Result<(), GameError> {
        self.base.start_game().await?;
        self.ask_question().await.map(|_| ())
    }

    async fn end_game(&mut self) {
        self.base.end_game().await;
    }

    async fn handle_action(
        &mut self,
        player_id: PlayerId,
        action_type: &str,
        payload: Value,
    ) -> Result<ActionData, GameError> {
        match action_type {
            "question:ask" => {
                self.require_host(player_id)?;
                self.ask_question().await
            }
            "question:skip" => {
                // Throw the current question away without scoring it.
                self.require_host(player_id)?;
                if self.base.state().phase != "question" {
                    return Err(GameError::invalid_action("no question is open"));
                }
                self.round += 1;
                self.ask_question().await
            }
            "answer:submit" => self.submit_answer(player_id, payload).await,
            "score:get" => Ok(Some(self.standings())),
            other => Err(GameError::not_implemented(other)),
        }
    }
}

fn trivia_factory() -> GameFactory {
    Arc::new(|ctx: GameContext| {
        Ok(Box::new(TriviaGame {
            base: GameBase::new(TriviaGame::config(), &ctx),
            round: 0,
            answers: HashMap::new(),
            scores: HashMap::new(),
        }) as Box<dyn Game>)
    })
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let port: u16 = std::env::var("BONFIRE_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let admin_key = std::env::var("BONFIRE_ADMIN_KEY").ok();
    let cors_origins: Vec<String> = std::env::var("BONFIRE_CORS_ORIGINS")
        .map(|v| v.split(',').map(|s| s.trim().to_owned()).collect())
        .unwrap_or_default();

    let config = ServerConfig {
        bind_addr: format!("0.0.0.0:{port}"),
        // The admin surface only comes up when a key is configured.
        admin_addr: admin_key
            .as_ref()
            .map(|_| format!("0.0.0.0:{}", port + 1)),
        admin_key,
        cors_origins,
        ..ServerConfig::default()
    };

    let storage = Arc::new(MemoryStorage::new());
    storage.initialize().await?;

    let server = BonfireServer::bind(config, storage.clone(), trivia_factory()).await?;
    tracing::info!(addr = %server.local_addr()?, "trivia server listening");

    let result = server.run().await;
    storage.close().await?;
    result.map_err(Into::into)
}
