//! End-to-end tests: real WebSocket clients against a running server,
//! plus the admin HTTP surface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bonfire::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Mock game: a bare-bones trivia round.
// =========================================================================

struct TriviaGame {
    base: GameBase,
    answers: HashMap<PlayerId, Value>,
}

fn trivia_factory(config: GameConfig) -> GameFactory {
    Arc::new(move |ctx: GameContext| {
        Ok(Box::new(TriviaGame {
            base: GameBase::new(config.clone(), &ctx),
            answers: HashMap::new(),
        }) as Box<dyn Game>)
    })
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
        self.base.start_game().await
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
            "answer:submit" => {
                self.answers.insert(player_id, payload);
                self.base.publish_state().await?;
                Ok(Some(json!({ "accepted": true })))
            }
            "answer:count" => Ok(Some(json!({ "answers": self.answers.len() }))),
            other => Err(GameError::not_implemented(other)),
        }
    }
}

// =========================================================================
// Server and client helpers
// =========================================================================

const ADMIN_KEY: &str = "test-admin-key";

struct TestServer {
    addr: String,
    admin_url: String,
    handle: ServerHandle,
}

async fn start_server_custom(
    game_config: GameConfig,
    manager: RoomManagerConfig,
) -> TestServer {
    let storage = Arc::new(MemoryStorage::new());
    storage.initialize().await.expect("storage init");

    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".into(),
        admin_addr: Some("127.0.0.1:0".into()),
        admin_key: Some(ADMIN_KEY.into()),
        manager,
        ..ServerConfig::default()
    };
    let server = BonfireServer::bind(config, storage, trivia_factory(game_config))
        .await
        .expect("server should bind");

    let addr = server.local_addr().expect("local addr").to_string();
    let admin_url = format!("http://{}", server.admin_addr().expect("admin addr"));
    let handle = server.handle();

    tokio::spawn(async move {
        let _ = server.run().await;
    });
    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;

    TestServer {
        addr,
        admin_url,
        handle,
    }
}

async fn start_server_with(game_config: GameConfig) -> TestServer {
    start_server_custom(game_config, RoomManagerConfig::default()).await
}

async fn start_server() -> TestServer {
    start_server_with(GameConfig::default()).await
}

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, frame: Value) {
    let bytes = serde_json::to_vec(&frame).expect("encode");
    ws.send(Message::Binary(bytes.into())).await.expect("send");
}

/// Receives the next data frame, decoded as JSON.
async fn next_frame(ws: &mut ClientWs) -> Value {
    let deadline = Duration::from_secs(3);
    loop {
        let msg = tokio::time::timeout(deadline, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("transport error");
        match msg {
            Message::Binary(data) => return serde_json::from_slice(&data).expect("decode"),
            Message::Text(text) => return serde_json::from_str(&text).expect("decode"),
            _ => continue,
        }
    }
}

/// Skips pushes until the ack for `seq` arrives.
async fn recv_ack(ws: &mut ClientWs, seq: u64) -> Value {
    loop {
        let frame = next_frame(ws).await;
        if frame["type"] == "ack" && frame["seq"] == seq {
            return frame;
        }
    }
}

/// Skips frames until one of the given type arrives.
async fn recv_push(ws: &mut ClientWs, kind: &str) -> Value {
    loop {
        let frame = next_frame(ws).await;
        if frame["type"] == kind {
            return frame;
        }
    }
}

/// Skips frames until an `event:emit` with the given event kind.
async fn recv_event(ws: &mut ClientWs, kind: &str) -> Value {
    loop {
        let frame = next_frame(ws).await;
        if frame["type"] == "event:emit" && frame["event"]["type"] == kind {
            return frame;
        }
    }
}

/// Creates a room and returns `(room_id, ack frame)`.
async fn create_room(ws: &mut ClientWs, game_type: &str, host_name: &str) -> (String, Value) {
    send(
        ws,
        json!({ "seq": 1, "type": "room:create", "gameType": game_type, "hostName": host_name }),
    )
    .await;
    let ack = recv_ack(ws, 1).await;
    assert_eq!(ack["success"], true, "create failed: {ack}");
    let room_id = ack["roomId"].as_str().expect("roomId").to_string();
    (room_id, ack)
}

/// Joins a room and returns `(player_id, ack frame)`.
async fn join_room(ws: &mut ClientWs, room_id: &str, name: &str) -> (String, Value) {
    send(
        ws,
        json!({ "seq": 1, "type": "room:join", "roomId": room_id, "playerName": name }),
    )
    .await;
    let ack = recv_ack(ws, 1).await;
    assert_eq!(ack["success"], true, "join failed: {ack}");
    let player_id = ack["playerId"].as_str().expect("playerId").to_string();
    (player_id, ack)
}

async fn admin_get(server: &TestServer, path: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!("{}{path}", server.admin_url))
        .header("x-api-key", ADMIN_KEY)
        .send()
        .await
        .expect("admin request")
}

async fn admin_post(server: &TestServer, path: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}{path}", server.admin_url))
        .header("x-api-key", ADMIN_KEY)
        .send()
        .await
        .expect("admin request")
}

// =========================================================================
// Scenario 1: room creation minimal
// =========================================================================

#[tokio::test]
async fn test_room_create_minimal() {
    let server = start_server().await;
    let mut c1 = connect(&server.addr).await;

    let (room_id, ack) = create_room(&mut c1, "trivia", "Alice").await;

    assert_eq!(room_id.len(), 6);
    assert!(bonfire_protocol::is_valid_room_code(&room_id));
    let state = &ack["state"];
    assert_eq!(state["roomId"], room_id.as_str());
    assert_eq!(state["phase"], "lobby");
    let players = state["players"].as_array().expect("players");
    assert_eq!(players.len(), 1);
    assert_eq!(players[0]["name"], "Alice");
    assert_eq!(players[0]["isHost"], true);
    assert_eq!(players[0]["isConnected"], true);
    assert!(players[0]["joinedAt"].as_u64().is_some());

    let stats: Value = admin_get(&server, "/admin/stats").await.json().await.unwrap();
    assert_eq!(stats["totalRooms"], 1);
    assert_eq!(stats["totalPlayers"], 1);
    assert_eq!(stats["totalConnections"], 1);
    assert_eq!(stats["roomsByStatus"]["waiting"], 1);
    assert_eq!(stats["roomsByStatus"]["playing"], 0);
    assert!(stats["uptimeMillis"].as_u64().is_some());
}

// =========================================================================
// Scenario 2: join then start
// =========================================================================

#[tokio::test]
async fn test_join_then_start() {
    let server = start_server().await;
    let mut c1 = connect(&server.addr).await;
    let (room_id, _) = create_room(&mut c1, "trivia", "Alice").await;

    let mut c2 = connect(&server.addr).await;
    let (_bob_id, join_ack) = join_room(&mut c2, &room_id, "Bob").await;
    let names: Vec<&str> = join_ack["state"]["players"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Alice", "Bob"]);

    // Non-host cannot start.
    send(&mut c2, json!({ "seq": 2, "type": "game:start" })).await;
    let ack = recv_ack(&mut c2, 2).await;
    assert_eq!(ack["success"], false);
    assert_eq!(ack["code"], "UNAUTHORIZED");

    // Host can.
    send(&mut c1, json!({ "seq": 2, "type": "game:start" })).await;
    let ack = recv_ack(&mut c1, 2).await;
    assert_eq!(ack["success"], true, "start failed: {ack}");

    // Both connections observe the phase change via broadcast. Earlier
    // lobby-phase updates (from the join) may still be queued; skip
    // past them.
    for ws in [&mut c1, &mut c2] {
        loop {
            let frame = next_frame(ws).await;
            if frame["type"] == "state:update" && frame["state"]["phase"] != "lobby" {
                break;
            }
        }
    }

    let stats: Value = admin_get(&server, "/admin/stats").await.json().await.unwrap();
    assert_eq!(stats["roomsByStatus"]["playing"], 1);
}

// =========================================================================
// Scenario 3: invalid inputs
// =========================================================================

#[tokio::test]
async fn test_invalid_inputs() {
    let server = start_server().await;
    let mut ws = connect(&server.addr).await;

    send(
        &mut ws,
        json!({ "seq": 1, "type": "room:create", "gameType": "", "hostName": "Alice" }),
    )
    .await;
    let ack = recv_ack(&mut ws, 1).await;
    assert_eq!(ack["success"], false);
    assert_eq!(ack["code"], "INVALID_INPUT");

    send(
        &mut ws,
        json!({ "seq": 2, "type": "room:create", "gameType": "trivia", "hostName": "   " }),
    )
    .await;
    let ack = recv_ack(&mut ws, 2).await;
    assert_eq!(ack["code"], "INVALID_INPUT");

    send(
        &mut ws,
        json!({ "seq": 3, "type": "room:join", "roomId": "NOROOM", "playerName": "X" }),
    )
    .await;
    let ack = recv_ack(&mut ws, 3).await;
    assert_eq!(ack["code"], "ROOM_NOT_FOUND");

    send(
        &mut ws,
        json!({ "seq": 4, "type": "room:join", "roomId": "", "playerName": "X" }),
    )
    .await;
    let ack = recv_ack(&mut ws, 4).await;
    assert_eq!(ack["code"], "INVALID_INPUT");

    // A join for a well-formed but unminted code is also not found.
    send(
        &mut ws,
        json!({ "seq": 5, "type": "room:join", "roomId": "ZZZZZZ", "playerName": "X" }),
    )
    .await;
    let ack = recv_ack(&mut ws, 5).await;
    assert_eq!(ack["code"], "ROOM_NOT_FOUND");
}

// =========================================================================
// Scenario 4: capacity
// =========================================================================

#[tokio::test]
async fn test_room_capacity() {
    let server = start_server().await; // max_players = 8
    let mut host = connect(&server.addr).await;
    let (room_id, _) = create_room(&mut host, "trivia", "Alice").await;

    let mut members = Vec::new();
    for i in 0..7 {
        let mut ws = connect(&server.addr).await;
        join_room(&mut ws, &room_id, &format!("Guest{i}")).await;
        members.push(ws);
    }

    // The ninth player bounces.
    let mut ninth = connect(&server.addr).await;
    send(
        &mut ninth,
        json!({ "seq": 1, "type": "room:join", "roomId": room_id, "playerName": "Iggy" }),
    )
    .await;
    let ack = recv_ack(&mut ninth, 1).await;
    assert_eq!(ack["success"], false);
    let code = ack["code"].as_str().unwrap();
    assert!(
        code == "ROOM_FULL" || code == "PLAYER_JOIN_FAILED",
        "unexpected code {code}"
    );
    let message = ack["error"].as_str().unwrap();
    assert!(
        message.contains("full") || message.contains("maximum"),
        "unexpected message {message:?}"
    );
}

// =========================================================================
// Scenario 5: reconnection
// =========================================================================

#[tokio::test]
async fn test_reconnection_rebinds_player_to_new_connection() {
    let server = start_server_with(GameConfig {
        disconnect_timeout: Duration::from_secs(30),
        ..GameConfig::default()
    })
    .await;
    let mut c1 = connect(&server.addr).await;
    let (room_id, _) = create_room(&mut c1, "trivia", "Alice").await;

    let mut c2 = connect(&server.addr).await;
    let (bob_id, _) = join_room(&mut c2, &room_id, "Bob").await;

    // Bob's transport drops.
    drop(c2);
    // Alice sees the disconnect.
    recv_event(&mut c1, "player:disconnected").await;

    // A fresh connection presents Bob's identity.
    let mut c2_new = connect(&server.addr).await;
    send(
        &mut c2_new,
        json!({ "seq": 1, "type": "state:request", "roomId": room_id, "playerId": bob_id }),
    )
    .await;
    let ack = recv_ack(&mut c2_new, 1).await;
    assert_eq!(ack["success"], true, "reconnect failed: {ack}");
    let bob = ack["state"]["players"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["id"] == bob_id.as_str())
        .expect("Bob still in room");
    assert_eq!(bob["isConnected"], true);

    // P9: subsequent broadcasts reach the replacement connection.
    send(
        &mut c1,
        json!({ "seq": 9, "type": "game:action", "actionType": "answer:submit", "payload": {"a": 1} }),
    )
    .await;
    recv_ack(&mut c1, 9).await;
    let update = recv_push(&mut c2_new, "state:update").await;
    assert_eq!(update["state"]["roomId"], room_id.as_str());
}

#[tokio::test]
async fn test_reconnection_with_unknown_identity_fails() {
    let server = start_server().await;
    let mut c1 = connect(&server.addr).await;
    let (room_id, _) = create_room(&mut c1, "trivia", "Alice").await;

    // A player id the room has never seen.
    let mut fresh = connect(&server.addr).await;
    let ghost = PlayerId::generate();
    send(
        &mut fresh,
        json!({ "seq": 1, "type": "state:request", "roomId": room_id, "playerId": ghost }),
    )
    .await;
    let ack = recv_ack(&mut fresh, 1).await;
    assert_eq!(ack["success"], false);
    assert_eq!(ack["code"], "PLAYER_NOT_FOUND");

    // A room that doesn't exist.
    send(
        &mut fresh,
        json!({ "seq": 2, "type": "state:request", "roomId": "ZZZZZZ", "playerId": ghost }),
    )
    .await;
    let ack = recv_ack(&mut fresh, 2).await;
    assert_eq!(ack["code"], "ROOM_NOT_FOUND");

    // Half an identity is no identity.
    send(
        &mut fresh,
        json!({ "seq": 3, "type": "state:request", "playerId": ghost }),
    )
    .await;
    let ack = recv_ack(&mut fresh, 3).await;
    assert_eq!(ack["code"], "NOT_IN_ROOM");
}

#[tokio::test]
async fn test_state_request_is_repeat_safe() {
    let server = start_server().await;
    let mut ws = connect(&server.addr).await;
    create_room(&mut ws, "trivia", "Alice").await;

    for seq in 10..13 {
        send(&mut ws, json!({ "seq": seq, "type": "state:request" })).await;
        let ack = recv_ack(&mut ws, seq).await;
        assert_eq!(ack["success"], true);
        assert_eq!(ack["state"]["phase"], "lobby");
    }
}

#[tokio::test]
async fn test_disconnect_grace_expiry_removes_player() {
    let server = start_server_with(GameConfig {
        disconnect_timeout: Duration::from_millis(100),
        ..GameConfig::default()
    })
    .await;
    let mut c1 = connect(&server.addr).await;
    let (room_id, _) = create_room(&mut c1, "trivia", "Alice").await;

    let mut c2 = connect(&server.addr).await;
    join_room(&mut c2, &room_id, "Bob").await;
    drop(c2);

    // No reconnect within the grace window: Bob is removed as a leave.
    let left = recv_event(&mut c1, "player:left").await;
    assert_eq!(left["event"]["payload"]["name"], "Bob");

    let stats: Value = admin_get(&server, "/admin/stats").await.json().await.unwrap();
    assert_eq!(stats["totalPlayers"], 1);
}

#[tokio::test]
async fn test_idle_room_expires_over_the_wire() {
    let server = start_server_custom(
        GameConfig::default(),
        RoomManagerConfig {
            default_ttl: Duration::from_millis(100),
            ..RoomManagerConfig::default()
        },
    )
    .await;
    let mut ws = connect(&server.addr).await;
    create_room(&mut ws, "trivia", "Alice").await;

    // No further activity: the per-room timer reclaims the room.
    tokio::time::sleep(Duration::from_millis(600)).await;

    let stats: Value = admin_get(&server, "/admin/stats").await.json().await.unwrap();
    assert_eq!(stats["totalRooms"], 0);

    // The connection survives; its stale association heals on use.
    send(&mut ws, json!({ "seq": 2, "type": "state:request" })).await;
    let ack = recv_ack(&mut ws, 2).await;
    assert_eq!(ack["success"], false);
    assert_eq!(ack["code"], "NOT_IN_ROOM");
}

// =========================================================================
// Scenario 6: admin force-end
// =========================================================================

#[tokio::test]
async fn test_admin_force_end_room() {
    let server = start_server().await;
    let mut c1 = connect(&server.addr).await;
    let (room_id, _) = create_room(&mut c1, "trivia", "Alice").await;
    let mut c2 = connect(&server.addr).await;
    join_room(&mut c2, &room_id, "Bob").await;

    let response = admin_post(&server, &format!("/admin/force-end/{room_id}")).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);

    for ws in [&mut c1, &mut c2] {
        let closed = recv_push(ws, "room:closed").await;
        assert!(
            closed["reason"].as_str().unwrap().contains("admin"),
            "reason should mention admin: {closed}"
        );
    }

    // Former members are no longer in a room.
    send(&mut c1, json!({ "seq": 5, "type": "state:request" })).await;
    let ack = recv_ack(&mut c1, 5).await;
    assert_eq!(ack["success"], false);
    assert_eq!(ack["code"], "NOT_IN_ROOM");

    let stats: Value = admin_get(&server, "/admin/stats").await.json().await.unwrap();
    assert_eq!(stats["totalRooms"], 0);
}

#[tokio::test]
async fn test_admin_force_end_unknown_room_is_404() {
    let server = start_server().await;
    let response = admin_post(&server, "/admin/force-end/ZZZZZZ").await;
    assert_eq!(response.status(), 404);
    let response = admin_post(&server, "/admin/force-end/nonsense!").await;
    assert_eq!(response.status(), 404);
}

// =========================================================================
// Admin: kick, auth, health
// =========================================================================

#[tokio::test]
async fn test_admin_kick_severs_room_association_only() {
    let server = start_server().await;
    let mut c1 = connect(&server.addr).await;
    let (room_id, _) = create_room(&mut c1, "trivia", "Alice").await;
    let mut c2 = connect(&server.addr).await;
    let (bob_id, _) = join_room(&mut c2, &room_id, "Bob").await;

    let response = admin_post(&server, &format!("/admin/kick/{room_id}/{bob_id}")).await;
    assert_eq!(response.status(), 200);

    // Bob is told, and the room hears a leave.
    let closed = recv_push(&mut c2, "room:closed").await;
    assert!(closed["reason"].as_str().unwrap().contains("kicked"));
    recv_event(&mut c1, "player:left").await;

    // Bob's transport is still open; his next request just has no room.
    send(&mut c2, json!({ "seq": 3, "type": "state:request" })).await;
    let ack = recv_ack(&mut c2, 3).await;
    assert_eq!(ack["code"], "NOT_IN_ROOM");

    let stats: Value = admin_get(&server, "/admin/stats").await.json().await.unwrap();
    assert_eq!(stats["totalPlayers"], 1);
    assert_eq!(stats["totalRooms"], 1);
}

#[tokio::test]
async fn test_admin_kick_unknown_player_is_404() {
    let server = start_server().await;
    let mut c1 = connect(&server.addr).await;
    let (room_id, _) = create_room(&mut c1, "trivia", "Alice").await;

    let ghost = PlayerId::generate();
    let response = admin_post(&server, &format!("/admin/kick/{room_id}/{ghost}")).await;
    assert_eq!(response.status(), 404);
    let response = admin_post(&server, &format!("/admin/kick/{room_id}/not-a-uuid")).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_admin_rooms_listing_and_status_filter() {
    let server = start_server().await;
    let mut c1 = connect(&server.addr).await;
    let (waiting_room, _) = create_room(&mut c1, "trivia", "Alice").await;

    // A second room that goes into play.
    let mut c2 = connect(&server.addr).await;
    let (playing_room, _) = create_room(&mut c2, "trivia", "Carol").await;
    let mut c3 = connect(&server.addr).await;
    join_room(&mut c3, &playing_room, "Dave").await;
    send(&mut c2, json!({ "seq": 2, "type": "game:start" })).await;
    recv_ack(&mut c2, 2).await;

    let body: Value = admin_get(&server, "/admin/rooms").await.json().await.unwrap();
    assert_eq!(body["total"], 2);
    let listed: Vec<&str> = body["rooms"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["roomId"].as_str().unwrap())
        .collect();
    assert!(listed.contains(&waiting_room.as_str()));
    assert!(listed.contains(&playing_room.as_str()));

    let body: Value = admin_get(&server, "/admin/rooms?status=playing")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 1);
    let room = &body["rooms"][0];
    assert_eq!(room["roomId"], playing_room.as_str());
    assert_eq!(room["status"], "playing");
    assert_eq!(room["playerCount"], 2);
    assert_eq!(room["maxPlayers"], 8);
    assert_eq!(room["hostName"], "Carol");
    assert_eq!(room["gameType"], "trivia");

    let response = admin_get(&server, "/admin/rooms?status=limbo").await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_admin_requires_api_key() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/admin/stats", server.admin_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = client
        .get(format!("{}/admin/stats", server.admin_url))
        .header("x-api-key", "wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_health_is_unauthenticated() {
    let server = start_server().await;
    let response = reqwest::Client::new()
        .get(format!("{}/health", server.admin_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["uptime"].as_u64().is_some());
}

// =========================================================================
// Actions and protocol edges
// =========================================================================

#[tokio::test]
async fn test_game_action_round_trip_and_unknown_action() {
    let server = start_server().await;
    let mut ws = connect(&server.addr).await;
    create_room(&mut ws, "trivia", "Alice").await;

    send(
        &mut ws,
        json!({ "seq": 2, "type": "game:action", "actionType": "answer:submit", "payload": {"pick": "b"} }),
    )
    .await;
    let ack = recv_ack(&mut ws, 2).await;
    assert_eq!(ack["success"], true);
    assert_eq!(ack["data"]["accepted"], true);

    send(
        &mut ws,
        json!({ "seq": 3, "type": "game:action", "actionType": "answer:count" }),
    )
    .await;
    let ack = recv_ack(&mut ws, 3).await;
    assert_eq!(ack["data"]["answers"], 1);

    send(
        &mut ws,
        json!({ "seq": 4, "type": "game:action", "actionType": "trivia:rig-the-game" }),
    )
    .await;
    let ack = recv_ack(&mut ws, 4).await;
    assert_eq!(ack["success"], false);
    assert_eq!(ack["code"], "NOT_IMPLEMENTED");
}

#[tokio::test]
async fn test_requests_outside_a_room_fail_not_in_room() {
    let server = start_server().await;
    let mut ws = connect(&server.addr).await;

    for (seq, body) in [
        (1, json!({ "seq": 1, "type": "room:leave" })),
        (2, json!({ "seq": 2, "type": "game:start" })),
        (
            3,
            json!({ "seq": 3, "type": "game:action", "actionType": "answer:submit" }),
        ),
        (4, json!({ "seq": 4, "type": "state:request" })),
    ] {
        send(&mut ws, body).await;
        let ack = recv_ack(&mut ws, seq).await;
        assert_eq!(ack["success"], false, "seq {seq} should fail");
        assert_eq!(ack["code"], "NOT_IN_ROOM", "seq {seq}");
    }
}

#[tokio::test]
async fn test_empty_action_type_is_invalid_input() {
    let server = start_server().await;
    let mut ws = connect(&server.addr).await;
    create_room(&mut ws, "trivia", "Alice").await;

    send(
        &mut ws,
        json!({ "seq": 2, "type": "game:action", "actionType": "   " }),
    )
    .await;
    let ack = recv_ack(&mut ws, 2).await;
    assert_eq!(ack["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_acks_arrive_in_request_order() {
    let server = start_server().await;
    let mut ws = connect(&server.addr).await;
    create_room(&mut ws, "trivia", "Alice").await;

    for seq in [21, 22, 23] {
        send(&mut ws, json!({ "seq": seq, "type": "state:request" })).await;
    }
    let mut seen = Vec::new();
    while seen.len() < 3 {
        let frame = next_frame(&mut ws).await;
        if frame["type"] == "ack" {
            seen.push(frame["seq"].as_u64().unwrap());
        }
    }
    assert_eq!(seen, vec![21, 22, 23]);
}

#[tokio::test]
async fn test_malformed_frame_yields_error_push_and_keeps_connection() {
    let server = start_server().await;
    let mut ws = connect(&server.addr).await;

    ws.send(Message::Binary(b"not json".to_vec().into()))
        .await
        .unwrap();
    let error = recv_push(&mut ws, "error").await;
    assert_eq!(error["code"], "INVALID_INPUT");

    // The connection survives and still works.
    create_room(&mut ws, "trivia", "Alice").await;
}

#[tokio::test]
async fn test_leave_then_rejoin_elsewhere() {
    let server = start_server().await;
    let mut c1 = connect(&server.addr).await;
    let (room_id, _) = create_room(&mut c1, "trivia", "Alice").await;
    let mut c2 = connect(&server.addr).await;
    join_room(&mut c2, &room_id, "Bob").await;

    send(&mut c2, json!({ "seq": 2, "type": "room:leave" })).await;
    let ack = recv_ack(&mut c2, 2).await;
    assert_eq!(ack["success"], true);
    recv_event(&mut c1, "player:left").await;

    // The freed connection can host its own room now.
    send(
        &mut c2,
        json!({ "seq": 3, "type": "room:create", "gameType": "trivia", "hostName": "Bob" }),
    )
    .await;
    let ack = recv_ack(&mut c2, 3).await;
    assert_eq!(ack["success"], true);

    let stats: Value = admin_get(&server, "/admin/stats").await.json().await.unwrap();
    assert_eq!(stats["totalRooms"], 2);
    assert_eq!(stats["totalPlayers"], 2);
}

#[tokio::test]
async fn test_player_count_tracks_state_after_each_request() {
    let server = start_server().await;
    let mut c1 = connect(&server.addr).await;
    let (room_id, _) = create_room(&mut c1, "trivia", "Alice").await;

    let mut c2 = connect(&server.addr).await;
    let (_, join_ack) = join_room(&mut c2, &room_id, "Bob").await;
    assert_eq!(join_ack["state"]["players"].as_array().unwrap().len(), 2);
    let stats: Value = admin_get(&server, "/admin/stats").await.json().await.unwrap();
    assert_eq!(stats["totalPlayers"], 2);

    send(&mut c2, json!({ "seq": 2, "type": "room:leave" })).await;
    recv_ack(&mut c2, 2).await;
    let stats: Value = admin_get(&server, "/admin/stats").await.json().await.unwrap();
    assert_eq!(stats["totalPlayers"], 1);
}

#[tokio::test]
async fn test_join_rejected_once_game_is_in_progress() {
    let server = start_server().await;
    let mut c1 = connect(&server.addr).await;
    let (room_id, _) = create_room(&mut c1, "trivia", "Alice").await;
    let mut c2 = connect(&server.addr).await;
    join_room(&mut c2, &room_id, "Bob").await;

    send(&mut c1, json!({ "seq": 2, "type": "game:start" })).await;
    let ack = recv_ack(&mut c1, 2).await;
    assert_eq!(ack["success"], true);

    let mut late = connect(&server.addr).await;
    send(
        &mut late,
        json!({ "seq": 1, "type": "room:join", "roomId": room_id, "playerName": "Carol" }),
    )
    .await;
    let ack = recv_ack(&mut late, 1).await;
    assert_eq!(ack["success"], false);
    assert_eq!(ack["code"], "PLAYER_JOIN_FAILED");
    assert!(ack["error"].as_str().unwrap().contains("progress"));
}

#[tokio::test]
async fn test_host_leave_promotes_next_player_over_the_wire() {
    let server = start_server().await;
    let mut c1 = connect(&server.addr).await;
    let (room_id, _) = create_room(&mut c1, "trivia", "Alice").await;
    let mut c2 = connect(&server.addr).await;
    let (bob_id, _) = join_room(&mut c2, &room_id, "Bob").await;

    send(&mut c1, json!({ "seq": 2, "type": "room:leave" })).await;
    recv_ack(&mut c1, 2).await;

    // Bob observes the promotion in the broadcast state.
    let promoted = loop {
        let frame = next_frame(&mut c2).await;
        if frame["type"] != "state:update" {
            continue;
        }
        let players = frame["state"]["players"].as_array().unwrap().clone();
        if players.len() == 1 {
            break players[0].clone();
        }
    };
    assert_eq!(promoted["id"], bob_id.as_str());
    assert_eq!(promoted["isHost"], true);

    // And the server now treats him as host: game:start is no longer
    // UNAUTHORIZED, it fails on the player minimum instead.
    send(&mut c2, json!({ "seq": 3, "type": "game:start" })).await;
    let ack = recv_ack(&mut c2, 3).await;
    assert_eq!(ack["success"], false);
    assert_eq!(ack["code"], "INVALID_GAME_STATE");
}

#[tokio::test]
async fn test_create_while_already_joined_is_rejected() {
    let server = start_server().await;
    let mut ws = connect(&server.addr).await;
    create_room(&mut ws, "trivia", "Alice").await;

    send(
        &mut ws,
        json!({ "seq": 2, "type": "room:create", "gameType": "trivia", "hostName": "Alice2" }),
    )
    .await;
    let ack = recv_ack(&mut ws, 2).await;
    assert_eq!(ack["success"], false);
    assert_eq!(ack["code"], "INVALID_INPUT");

    // One connection, one room: the catalog did not grow.
    let stats: Value = admin_get(&server, "/admin/stats").await.json().await.unwrap();
    assert_eq!(stats["totalRooms"], 1);
}

#[tokio::test]
async fn test_concurrent_joins_keep_count_consistent() {
    let server = start_server().await;
    let mut host = connect(&server.addr).await;
    let (room_id, _) = create_room(&mut host, "trivia", "Alice").await;

    // Five players race into the same room; the count in metadata must
    // settle at exactly the number of players in state.
    let mut tasks = Vec::new();
    for i in 0..5 {
        let addr = server.addr.clone();
        let room_id = room_id.clone();
        tasks.push(tokio::spawn(async move {
            let mut ws = connect(&addr).await;
            join_room(&mut ws, &room_id, &format!("Racer{i}")).await;
            ws
        }));
    }
    let mut members = Vec::new();
    for task in tasks {
        members.push(task.await.expect("join task"));
    }

    send(&mut host, json!({ "seq": 5, "type": "state:request" })).await;
    let ack = recv_ack(&mut host, 5).await;
    assert_eq!(ack["state"]["players"].as_array().unwrap().len(), 6);

    let stats: Value = admin_get(&server, "/admin/stats").await.json().await.unwrap();
    assert_eq!(stats["totalPlayers"], 6);
    assert_eq!(stats["totalRooms"], 1);
}

#[tokio::test]
async fn test_graceful_shutdown_notifies_connections() {
    let server = start_server().await;
    let mut c1 = connect(&server.addr).await;
    create_room(&mut c1, "trivia", "Alice").await;

    server.handle.shutdown().await;

    let closed = recv_push(&mut c1, "room:closed").await;
    assert!(
        closed["reason"].as_str().unwrap().contains("shutting down"),
        "unexpected reason: {closed}"
    );
    assert_eq!(server.handle.manager().room_count(), 0);
}
