//! Server statistics for the admin surface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::server::ServerState;

/// The `GET /admin/stats` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    pub total_rooms: usize,
    /// Players across all rooms, counted from room metadata.
    pub total_players: usize,
    /// Live transport connections, joined to a room or not.
    pub total_connections: usize,
    /// Room count per lifecycle status. Every status is present, zero
    /// or not, so dashboards get a stable shape.
    pub rooms_by_status: BTreeMap<String, usize>,
    pub uptime_millis: u64,
    /// Resident set size in bytes; 0 where the platform doesn't expose
    /// it.
    pub memory_usage: u64,
}

pub(crate) async fn collect(state: &ServerState) -> ServerStats {
    let infos = state.manager.list_rooms().await;

    let mut rooms_by_status: BTreeMap<String, usize> = ["waiting", "playing", "ended", "closed"]
        .into_iter()
        .map(|status| (status.to_string(), 0))
        .collect();
    let mut total_players = 0;
    for info in &infos {
        *rooms_by_status.entry(info.status.to_string()).or_default() += 1;
        total_players += info.player_count;
    }

    ServerStats {
        total_rooms: infos.len(),
        total_players,
        total_connections: state.gateway.connection_count(),
        rooms_by_status,
        uptime_millis: state.uptime_millis(),
        memory_usage: memory_usage_bytes(),
    }
}

/// Resident set size of this process, in bytes.
#[cfg(target_os = "linux")]
fn memory_usage_bytes() -> u64 {
    // /proc/self/statm: size resident shared text lib data dt (pages).
    let Ok(statm) = std::fs::read_to_string("/proc/self/statm") else {
        return 0;
    };
    let resident_pages: u64 = statm
        .split_whitespace()
        .nth(1)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    resident_pages * 4096
}

#[cfg(not(target_os = "linux"))]
fn memory_usage_bytes() -> u64 {
    0
}
