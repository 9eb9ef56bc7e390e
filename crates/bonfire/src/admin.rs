//! The administrative HTTP side-channel.
//!
//! A small axum router served next to the game transport:
//!
//! - `GET  /health` — liveness, unauthenticated.
//! - `GET  /admin/stats` — catalog statistics.
//! - `GET  /admin/rooms` — room listing, optionally `?status=` filtered.
//! - `POST /admin/force-end/{roomId}` — end and destroy a room.
//! - `POST /admin/kick/{roomId}/{playerId}` — sever one player's room
//!   association (their transport stays open).
//!
//! Admin routes require the configured secret in the `x-api-key`
//! header; error responses reuse the wire taxonomy's HTTP mapping.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use bonfire_protocol::{Codec, GameError, PlayerId, RoomId, RoomStatus, ServerFrame};
use bonfire_room::RoomMetadataPatch;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::BonfireError;
use crate::server::ServerState;
use crate::stats::{self, ServerStats};

/// Axum state wrapper for the shared server state.
#[derive(Clone)]
struct AdminState(Arc<ServerState>);

/// Domain errors mapped onto HTTP responses.
struct AdminError(GameError);

impl From<GameError> for AdminError {
    fn from(err: GameError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "success": false,
            "error": self.0.message,
            "code": self.0.code,
        });
        (status, Json(body)).into_response()
    }
}

/// Binds the admin listener and serves it in the background. Returns
/// the bound address.
pub(crate) async fn serve(
    addr: &str,
    state: Arc<ServerState>,
    cors_origins: &[String],
) -> Result<SocketAddr, BonfireError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(BonfireError::Admin)?;
    let local = listener.local_addr().map_err(BonfireError::Admin)?;
    let app = router(state, cors_origins);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "admin surface stopped");
        }
    });
    tracing::info!(addr = %local, "admin surface listening");
    Ok(local)
}

fn router(state: Arc<ServerState>, cors_origins: &[String]) -> Router {
    let admin_state = AdminState(state);

    let cors = if cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> =
            cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let guarded = Router::new()
        .route("/admin/stats", get(get_stats))
        .route("/admin/rooms", get(list_rooms))
        .route("/admin/force-end/{room_id}", post(force_end_room))
        .route("/admin/kick/{room_id}/{player_id}", post(kick_player))
        .route_layer(middleware::from_fn_with_state(
            admin_state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(guarded)
        .layer(cors)
        .with_state(admin_state)
}

/// Rejects admin requests that don't present the configured key.
async fn require_api_key(
    State(state): State<AdminState>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());
    match (&state.0.admin_key, provided) {
        (Some(expected), Some(key)) if key == expected => next.run(request).await,
        _ => AdminError(GameError::unauthorized("missing or invalid admin key")).into_response(),
    }
}

async fn health(State(state): State<AdminState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime": state.0.uptime_millis(),
    }))
}

async fn get_stats(State(state): State<AdminState>) -> Json<ServerStats> {
    Json(stats::collect(&state.0).await)
}

#[derive(Debug, Deserialize)]
struct RoomsQuery {
    /// Restrict the listing to one lifecycle status.
    status: Option<String>,
}

async fn list_rooms(
    State(state): State<AdminState>,
    Query(query): Query<RoomsQuery>,
) -> Result<Json<Value>, AdminError> {
    let rooms = match query.status.as_deref() {
        Some(raw) => {
            let wanted: RoomStatus = raw.parse()?;
            state
                .0
                .manager
                .list_rooms_filtered(|info| info.status == wanted)
                .await
        }
        None => state.0.manager.list_rooms().await,
    };
    let total = rooms.len();
    Ok(Json(json!({ "rooms": rooms, "total": total })))
}

async fn force_end_room(
    State(state): State<AdminState>,
    Path(room_id): Path<String>,
) -> Result<Json<Value>, AdminError> {
    let room_id =
        RoomId::parse(&room_id).map_err(|_| GameError::room_not_found(&room_id))?;
    let room = state.0.manager.get_room(&room_id)?;

    room.game().await.end_game().await;
    if let Err(e) = state
        .0
        .manager
        .update_room_metadata(&room_id, RoomMetadataPatch::status(RoomStatus::Ended))
        .await
    {
        tracing::warn!(%room_id, error = %e, "metadata update before force-end failed");
    }

    // The close notice must be queued before deletion drops the group.
    room.synchronizer().broadcast_closed("room closed by admin");
    state.0.manager.delete_room(&room_id).await;

    tracing::info!(%room_id, "room force-ended by admin");
    Ok(Json(json!({ "success": true })))
}

async fn kick_player(
    State(state): State<AdminState>,
    Path((room_id, player_id)): Path<(String, String)>,
) -> Result<Json<Value>, AdminError> {
    let room_id =
        RoomId::parse(&room_id).map_err(|_| GameError::room_not_found(&room_id))?;
    let room = state.0.manager.get_room(&room_id)?;
    let player_id: PlayerId = player_id
        .parse()
        .map_err(|_| GameError::player_not_found(&player_id))?;

    {
        let mut game = room.game().await;
        if !game.state().has_player(player_id) {
            return Err(GameError::player_not_found(player_id).into());
        }
        game.leave_player(player_id).await?;
        let remaining = game.players().len();
        if let Err(e) = state
            .0
            .manager
            .update_room_metadata(&room_id, RoomMetadataPatch::player_count(remaining))
            .await
        {
            tracing::warn!(%room_id, error = %e, "metadata update after kick failed");
        }
    }

    let connection = room.synchronizer().connection_for(player_id);
    room.synchronizer().unregister_player(player_id);
    state.0.manager.untrack_player(player_id);

    if let Some(connection) = connection {
        // Tell the player, then sever their room association. The
        // transport itself stays open.
        let frame = ServerFrame::RoomClosed {
            reason: "kicked by admin".to_string(),
        };
        if let Ok(bytes) = state.0.codec.encode(&frame) {
            state.0.gateway.send(connection, &bytes);
        }
        state.0.gateway.leave_group(room_id.as_str(), connection);
        state.0.clear_context_for(connection);
    }

    tracing::info!(%room_id, %player_id, "player kicked by admin");
    Ok(Json(json!({ "success": true })))
}
