//! Per-connection handler: frame decoding, request dispatch, and the
//! disconnect flow.
//!
//! Each accepted connection runs one handler task. A writer task drains
//! the connection's gateway queue onto the socket, so acknowledgements
//! and room broadcasts share a single ordered outbound stream; the
//! reader loop decodes frames and dispatches them. Every request gets
//! exactly one ack carrying its `seq`.

use std::sync::Arc;

use bonfire_protocol::{
    Ack, ClientFrame, ClientRequest, Codec, ErrorCode, GameError, Player, PlayerId, RoomId,
    RoomStatus, ServerFrame, now_millis,
};
use bonfire_room::RoomMetadataPatch;
use bonfire_transport::{Connection, ConnectionId, WebSocketConnection};
use serde_json::{Map, Value};

use crate::BonfireError;
use crate::server::{ConnectionContext, ServerState};

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), BonfireError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let mut outbound = state.gateway.register(conn_id);
    state
        .contexts
        .lock()
        .expect("context lock poisoned")
        .insert(conn_id, ConnectionContext::new(conn_id));

    // Writer task: the only place this socket is written, so frame
    // order on the wire matches queue order. Ends when the gateway
    // deregisters the connection (sender dropped) or the socket dies.
    let writer_conn = conn.clone();
    let writer = tokio::spawn(async move {
        while let Some(bytes) = outbound.recv().await {
            if writer_conn.send(&bytes).await.is_err() {
                break;
            }
        }
    });

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        let frame: ClientFrame = match state.codec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "malformed frame");
                let error = ServerFrame::Error {
                    message: "malformed frame".to_string(),
                    code: ErrorCode::InvalidInput,
                    details: None,
                };
                if let Ok(bytes) = state.codec.encode(&error) {
                    state.gateway.send(conn_id, &bytes);
                }
                continue;
            }
        };

        let seq = frame.seq;
        let ack = match dispatch(&state, conn_id, frame.request).await {
            Ok(data) => Ack::ok_with(seq, data),
            Err(e) => Ack::fail(seq, &e),
        };
        match state.codec.encode(&ServerFrame::Ack(ack)) {
            Ok(bytes) => {
                state.gateway.send(conn_id, &bytes);
            }
            Err(e) => {
                tracing::error!(%conn_id, error = %e, "failed to encode ack");
            }
        }
    }

    handle_disconnect(&state, conn_id).await;
    // Deregistration dropped the queue sender, so the writer unwinds
    // on its own; await it to not leak the task.
    let _ = writer.await;
    Ok(())
}

/// Routes one request. Validation failures return without mutating
/// anything; success payloads become ack fields.
async fn dispatch(
    state: &Arc<ServerState>,
    conn_id: ConnectionId,
    request: ClientRequest,
) -> Result<Map<String, Value>, GameError> {
    match request {
        ClientRequest::RoomCreate {
            game_type,
            host_name,
        } => room_create(state, conn_id, &game_type, &host_name).await,
        ClientRequest::RoomJoin {
            room_id,
            player_name,
        } => room_join(state, conn_id, &room_id, &player_name).await,
        ClientRequest::RoomLeave => room_leave(state, conn_id).await,
        ClientRequest::GameStart => game_start(state, conn_id).await,
        ClientRequest::GameAction {
            action_type,
            payload,
        } => game_action(state, conn_id, &action_type, payload).await,
        ClientRequest::StateRequest { room_id, player_id } => {
            state_request(state, conn_id, room_id.as_deref(), player_id).await
        }
    }
}

/// The joined `(player, room)` pair for a connection, or `NOT_IN_ROOM`.
fn joined_identity(
    state: &ServerState,
    conn_id: ConnectionId,
) -> Result<(PlayerId, RoomId), GameError> {
    let ctx = state
        .context_snapshot(conn_id)
        .ok_or_else(GameError::not_in_room)?;
    match (ctx.player_id, ctx.room_id) {
        (Some(player_id), Some(room_id)) => Ok((player_id, room_id)),
        _ => Err(GameError::not_in_room()),
    }
}

fn require_trimmed<'a>(value: &'a str, what: &str) -> Result<&'a str, GameError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GameError::invalid_input(format!("{what} must not be empty")));
    }
    Ok(trimmed)
}

/// Parses a user-supplied room code for lookup. An empty code is an
/// input error; a malformed one is reported as a room that does not
/// exist — from the caller's perspective, that code names no room.
fn parse_room_code(raw: &str) -> Result<RoomId, GameError> {
    let raw = require_trimmed(raw, "room code")?;
    RoomId::parse(raw).map_err(|_| GameError::room_not_found(raw.to_ascii_uppercase()))
}

/// A connection's room vanished underneath it (TTL, admin force-end).
/// Sever the stale association; the caller reports `NOT_IN_ROOM`.
fn heal_stale_context(
    state: &ServerState,
    conn_id: ConnectionId,
    player_id: PlayerId,
) -> GameError {
    state.manager.untrack_player(player_id);
    state.clear_context_for(conn_id);
    GameError::not_in_room()
}

async fn room_create(
    state: &Arc<ServerState>,
    conn_id: ConnectionId,
    game_type: &str,
    host_name: &str,
) -> Result<Map<String, Value>, GameError> {
    let game_type = require_trimmed(game_type, "game type")?;
    let host_name = require_trimmed(host_name, "player name")?;
    if joined_identity(state, conn_id).is_ok() {
        return Err(GameError::invalid_input(
            "connection is already in a room; leave it first",
        ));
    }

    let host_id = PlayerId::generate();
    let room = state.manager.create_room(host_id, game_type).await?;
    let room_id = room.room_id().clone();

    let host = Player::new(host_id, host_name, true, now_millis());
    let snapshot = {
        let mut game = room.game().await;
        if let Err(e) = game.join_player(host).await {
            drop(game);
            // Don't leak an empty room.
            state.manager.delete_room(&room_id).await;
            return Err(GameError::player_join_failed(e.message));
        }
        // Count updates stay inside the room's lock so they apply in
        // join order.
        state
            .manager
            .update_room_metadata(&room_id, RoomMetadataPatch::player_count(1))
            .await?;
        game.state().clone()
    };

    room.synchronizer().register_player(host_id, conn_id);
    state.manager.track_player(host_id, room_id.clone());
    state.set_context(conn_id, Some(host_id), Some(room_id.clone()));
    state.gateway.join_group(room_id.as_str(), conn_id);
    state.manager.touch_activity(&room_id).await?;

    let mut data = Map::new();
    data.insert("roomId".into(), Value::String(room_id.to_string()));
    data.insert(
        "state".into(),
        serde_json::to_value(snapshot).map_err(|e| GameError::internal(e.to_string()))?,
    );
    Ok(data)
}

async fn room_join(
    state: &Arc<ServerState>,
    conn_id: ConnectionId,
    room_id: &str,
    player_name: &str,
) -> Result<Map<String, Value>, GameError> {
    let player_name = require_trimmed(player_name, "player name")?;
    let room_id = parse_room_code(room_id)?;
    if joined_identity(state, conn_id).is_ok() {
        return Err(GameError::invalid_input(
            "connection is already in a room; leave it first",
        ));
    }

    let room = state.manager.get_room(&room_id)?;
    let player_id = PlayerId::generate();
    let player = Player::new(player_id, player_name, false, now_millis());

    let snapshot = {
        let mut game = room.game().await;
        game.join_player(player).await?;
        state
            .manager
            .update_room_metadata(
                &room_id,
                RoomMetadataPatch::player_count(game.players().len()),
            )
            .await?;
        game.state().clone()
    };

    room.synchronizer().register_player(player_id, conn_id);
    state.manager.track_player(player_id, room_id.clone());
    state.set_context(conn_id, Some(player_id), Some(room_id.clone()));
    state.gateway.join_group(room_id.as_str(), conn_id);
    state.manager.touch_activity(&room_id).await?;

    let mut data = Map::new();
    data.insert("playerId".into(), Value::String(player_id.to_string()));
    data.insert(
        "state".into(),
        serde_json::to_value(snapshot).map_err(|e| GameError::internal(e.to_string()))?,
    );
    Ok(data)
}

async fn room_leave(
    state: &Arc<ServerState>,
    conn_id: ConnectionId,
) -> Result<Map<String, Value>, GameError> {
    let (player_id, room_id) = joined_identity(state, conn_id)?;

    match state.manager.get_room(&room_id) {
        Ok(room) => {
            {
                let mut game = room.game().await;
                game.leave_player(player_id).await?;
                state
                    .manager
                    .update_room_metadata(
                        &room_id,
                        RoomMetadataPatch::player_count(game.players().len()),
                    )
                    .await?;
            }
            room.synchronizer().unregister_player(player_id);
            state.gateway.leave_group(room_id.as_str(), conn_id);
            state.manager.untrack_player(player_id);
            state.clear_context_for(conn_id);
            state.manager.touch_activity(&room_id).await?;
        }
        Err(_) => {
            // The room died under us; just sever the association.
            state.manager.untrack_player(player_id);
            state.clear_context_for(conn_id);
        }
    }

    Ok(Map::new())
}

async fn game_start(
    state: &Arc<ServerState>,
    conn_id: ConnectionId,
) -> Result<Map<String, Value>, GameError> {
    let (player_id, room_id) = joined_identity(state, conn_id)?;
    let room = state
        .manager
        .get_room(&room_id)
        .map_err(|_| heal_stale_context(state, conn_id, player_id))?;

    {
        let mut game = room.game().await;
        let is_host = game
            .state()
            .player(player_id)
            .is_some_and(|p| p.is_host);
        if !is_host {
            return Err(GameError::unauthorized("only the host can start the game"));
        }
        game.start_game().await?;
        state
            .manager
            .update_room_metadata(&room_id, RoomMetadataPatch::status(RoomStatus::Playing))
            .await?;
    }

    state.manager.touch_activity(&room_id).await?;
    Ok(Map::new())
}

async fn game_action(
    state: &Arc<ServerState>,
    conn_id: ConnectionId,
    action_type: &str,
    payload: Value,
) -> Result<Map<String, Value>, GameError> {
    let (player_id, room_id) = joined_identity(state, conn_id)?;
    let action_type = require_trimmed(action_type, "action type")?;
    let room = state
        .manager
        .get_room(&room_id)
        .map_err(|_| heal_stale_context(state, conn_id, player_id))?;

    let result = {
        let mut game = room.game().await;
        if !game.state().has_player(player_id) {
            return Err(GameError::player_not_found(player_id));
        }
        game.handle_action(player_id, action_type, payload).await?
    };

    state.manager.touch_activity(&room_id).await?;

    let mut data = Map::new();
    if let Some(value) = result {
        data.insert("data".into(), value);
    }
    Ok(data)
}

/// The reconnection seam. Re-registers the connection under the
/// (possibly unchanged) player id, re-subscribes it to the room's
/// fan-out group, cancels any pending disconnect grace, and returns the
/// current state. Safe to call repeatedly.
async fn state_request(
    state: &Arc<ServerState>,
    conn_id: ConnectionId,
    room_id_arg: Option<&str>,
    player_id_arg: Option<PlayerId>,
) -> Result<Map<String, Value>, GameError> {
    let (player_id, room_id) = match joined_identity(state, conn_id) {
        Ok(pair) => pair,
        // A fresh connection may adopt a prior identity.
        Err(_) => match (room_id_arg, player_id_arg) {
            (Some(raw_room), Some(player_id)) => {
                let room_id = parse_room_code(raw_room)?;
                let room = state.manager.get_room(&room_id)?;
                let known = room.game().await.state().has_player(player_id);
                if !known {
                    return Err(GameError::player_not_found(player_id));
                }
                (player_id, room_id)
            }
            _ => return Err(GameError::not_in_room()),
        },
    };

    let room = state
        .manager
        .get_room(&room_id)
        .map_err(|_| heal_stale_context(state, conn_id, player_id))?;

    // A new socket on the same player id replaces the prior connection.
    room.synchronizer().register_player(player_id, conn_id);
    state.gateway.join_group(room_id.as_str(), conn_id);
    state.manager.track_player(player_id, room_id.clone());
    state.set_context(conn_id, Some(player_id), Some(room_id.clone()));

    room.game().await.reconnect_player(player_id).await;
    state.manager.touch_activity(&room_id).await?;

    // Hydrate the (possibly new) connection with a targeted sync frame
    // in addition to the ack payload.
    let snapshot = room.game().await.state().clone();
    room.synchronizer().send_to_player(player_id, &snapshot);

    let mut data = Map::new();
    data.insert(
        "state".into(),
        serde_json::to_value(snapshot).map_err(|e| GameError::internal(e.to_string()))?,
    );
    Ok(data)
}

/// Transport-level disconnect. Never an error to the user: the player
/// enters their grace period and the player→room tracking is retained
/// so a later `state:request` can bring them back.
async fn handle_disconnect(state: &Arc<ServerState>, conn_id: ConnectionId) {
    let ctx = state
        .contexts
        .lock()
        .expect("context lock poisoned")
        .remove(&conn_id);
    state.gateway.deregister(conn_id);

    let Some(ctx) = ctx else { return };
    let (Some(player_id), Some(room_id)) = (ctx.player_id, ctx.room_id) else {
        return;
    };

    match state.manager.get_room(&room_id) {
        Ok(room) => {
            room.game().await.disconnect_player(player_id).await;
            room.synchronizer().unregister_player(player_id);
            tracing::info!(
                conn_id = %ctx.connection_id,
                %player_id,
                %room_id,
                "player connection dropped"
            );
        }
        Err(_) => {
            // Room was destroyed concurrently; nothing left to mark.
            tracing::debug!(%conn_id, %room_id, "disconnect after room teardown");
        }
    }
}
