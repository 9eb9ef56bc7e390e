//! `BonfireServer`: assembly, accept loop, and graceful shutdown.
//!
//! This ties the layers together: transport → protocol → rooms →
//! storage. A server is assembled explicitly from its configuration,
//! a storage handle, and a game factory — no ambient singletons, so
//! tests construct as many fresh servers as they like.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use bonfire_protocol::{Codec, JsonCodec, PlayerId, RoomId, ServerFrame};
use bonfire_room::{GameFactory, RoomManager, RoomManagerConfig};
use bonfire_storage::Storage;
use bonfire_transport::{ConnectionId, Gateway, Transport, WebSocketTransport};

use crate::BonfireError;
use crate::admin;
use crate::handler::handle_connection;
use crate::stats::ServerStats;

/// Server assembly configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the game WebSocket listens on.
    pub bind_addr: String,
    /// Address for the admin HTTP surface; `None` disables it.
    pub admin_addr: Option<String>,
    /// Secret clients of the admin surface present via `x-api-key`.
    /// Admin routes reject everything when unset.
    pub admin_key: Option<String>,
    /// CORS allow-origins for the admin surface. Empty means any.
    pub cors_origins: Vec<String>,
    /// Limits and TTLs for the room catalog.
    pub manager: RoomManagerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            admin_addr: None,
            admin_key: None,
            cors_origins: Vec::new(),
            manager: RoomManagerConfig::default(),
        }
    }
}

/// Per-connection bookkeeping: which player/room this stream speaks
/// for, if any. Mutated only by the connection's own handler task —
/// and by an admin kick, which just blanks the association.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionContext {
    pub connection_id: ConnectionId,
    pub player_id: Option<PlayerId>,
    pub room_id: Option<RoomId>,
}

impl ConnectionContext {
    pub(crate) fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            player_id: None,
            room_id: None,
        }
    }
}

/// Shared server state handed to every connection handler and the
/// admin surface.
pub(crate) struct ServerState {
    pub(crate) manager: Arc<RoomManager>,
    pub(crate) gateway: Arc<Gateway>,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) contexts: StdMutex<HashMap<ConnectionId, ConnectionContext>>,
    pub(crate) started_at: Instant,
    pub(crate) admin_key: Option<String>,
    pub(crate) codec: JsonCodec,
}

impl ServerState {
    pub(crate) fn uptime_millis(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    pub(crate) fn context_snapshot(&self, id: ConnectionId) -> Option<ConnectionContext> {
        self.contexts
            .lock()
            .expect("context lock poisoned")
            .get(&id)
            .cloned()
    }

    pub(crate) fn set_context(
        &self,
        id: ConnectionId,
        player_id: Option<PlayerId>,
        room_id: Option<RoomId>,
    ) {
        let mut contexts = self.contexts.lock().expect("context lock poisoned");
        if let Some(ctx) = contexts.get_mut(&id) {
            ctx.player_id = player_id;
            ctx.room_id = room_id;
        }
    }

    /// Blanks the association of whichever context maps `connection`.
    /// Used by the admin kick; the target's next request sees
    /// `NOT_IN_ROOM`.
    pub(crate) fn clear_context_for(&self, connection: ConnectionId) {
        self.set_context(connection, None, None);
    }
}

/// A running Bonfire server.
pub struct BonfireServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
    admin_addr: Option<SocketAddr>,
}

impl BonfireServer {
    /// Binds the game transport (and the admin surface if configured)
    /// and assembles the runtime.
    ///
    /// `storage` must already be initialized; the server never closes
    /// it — whoever created the storage owns its lifetime.
    pub async fn bind(
        config: ServerConfig,
        storage: Arc<dyn Storage>,
        factory: GameFactory,
    ) -> Result<Self, BonfireError> {
        let transport = WebSocketTransport::bind(&config.bind_addr).await?;
        let gateway = Arc::new(Gateway::new());
        let manager = RoomManager::new(
            config.manager.clone(),
            Arc::clone(&storage),
            Arc::clone(&gateway),
            factory,
        );
        manager.start_cleanup();

        let state = Arc::new(ServerState {
            manager,
            gateway,
            storage,
            contexts: StdMutex::new(HashMap::new()),
            started_at: Instant::now(),
            admin_key: config.admin_key.clone(),
            codec: JsonCodec,
        });

        let admin_addr = match &config.admin_addr {
            Some(addr) => {
                Some(admin::serve(addr, Arc::clone(&state), &config.cors_origins).await?)
            }
            None => None,
        };

        Ok(Self {
            transport,
            state,
            admin_addr,
        })
    }

    /// The address the game WebSocket is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The address the admin surface is bound to, if enabled.
    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    /// A handle for stats and shutdown that outlives [`run`](Self::run).
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Runs the accept loop: each connection gets its own handler task.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), BonfireError> {
        tracing::info!("Bonfire server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Cloneable handle to a running server.
pub struct ServerHandle {
    state: Arc<ServerState>,
}

impl ServerHandle {
    /// Graceful shutdown: every live connection is told the server is
    /// going away, then the room catalog is torn down. Storage stays
    /// open for its owner to close.
    pub async fn shutdown(&self) {
        let frame = ServerFrame::RoomClosed {
            reason: "server shutting down".to_string(),
        };
        if let Ok(bytes) = self.state.codec.encode(&frame) {
            self.state.gateway.broadcast_all(&bytes);
        }
        self.state.manager.shutdown().await;
        tracing::info!("server shut down");
    }

    /// Current server statistics.
    pub async fn stats(&self) -> ServerStats {
        crate::stats::collect(&self.state).await
    }

    /// The room catalog, for embedding servers that need direct access.
    pub fn manager(&self) -> &Arc<RoomManager> {
        &self.state.manager
    }
}

impl Clone for ServerHandle {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}
