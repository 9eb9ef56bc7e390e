//! The gateway: outbound queues and named multicast groups.
//!
//! Every accepted connection registers an unbounded channel here; a
//! writer task on the connection's side drains it onto the socket.
//! Publishing to a group walks its member set and pushes the same bytes
//! onto each member's queue — so a slow or dead receiver can never
//! block the publisher or its room-mates.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::ConnectionId;

/// Sending half of a connection's outbound queue.
pub type OutboundSender = mpsc::UnboundedSender<Vec<u8>>;
/// Receiving half, drained by the connection's writer task.
pub type OutboundReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// Connection registry plus group membership.
///
/// Groups are addressed by opaque string names; the layer above uses
/// room codes. All methods are synchronous — pushing onto an unbounded
/// channel never awaits — so the gateway can be called from inside any
/// lock without deadlock risk.
#[derive(Default)]
pub struct Gateway {
    inner: Mutex<GatewayInner>,
}

#[derive(Default)]
struct GatewayInner {
    connections: HashMap<ConnectionId, OutboundSender>,
    groups: HashMap<String, HashSet<ConnectionId>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns the receiving half of its
    /// outbound queue. Re-registering an id replaces the old queue.
    pub fn register(&self, id: ConnectionId) -> OutboundReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("gateway lock poisoned");
        inner.connections.insert(id, tx);
        rx
    }

    /// Drops a connection's queue and removes it from every group.
    pub fn deregister(&self, id: ConnectionId) {
        let mut inner = self.inner.lock().expect("gateway lock poisoned");
        inner.connections.remove(&id);
        for members in inner.groups.values_mut() {
            members.remove(&id);
        }
        inner.groups.retain(|_, members| !members.is_empty());
    }

    /// Adds a connection to a named group. No-op if already a member.
    pub fn join_group(&self, group: &str, id: ConnectionId) {
        let mut inner = self.inner.lock().expect("gateway lock poisoned");
        inner.groups.entry(group.to_owned()).or_default().insert(id);
    }

    /// Removes a connection from a named group.
    pub fn leave_group(&self, group: &str, id: ConnectionId) {
        let mut inner = self.inner.lock().expect("gateway lock poisoned");
        if let Some(members) = inner.groups.get_mut(group) {
            members.remove(&id);
            if members.is_empty() {
                inner.groups.remove(group);
            }
        }
    }

    /// Dissolves a group entirely (the connections stay registered).
    pub fn drop_group(&self, group: &str) {
        let mut inner = self.inner.lock().expect("gateway lock poisoned");
        inner.groups.remove(group);
    }

    /// Sends bytes to every member of a group. Members whose queue is
    /// gone are skipped; the disconnect path cleans them up.
    pub fn publish(&self, group: &str, data: &[u8]) {
        let inner = self.inner.lock().expect("gateway lock poisoned");
        let Some(members) = inner.groups.get(group) else {
            return;
        };
        for id in members {
            if let Some(tx) = inner.connections.get(id) {
                let _ = tx.send(data.to_vec());
            }
        }
    }

    /// Sends bytes to one connection. Returns `false` if it is gone.
    pub fn send(&self, id: ConnectionId, data: &[u8]) -> bool {
        let inner = self.inner.lock().expect("gateway lock poisoned");
        match inner.connections.get(&id) {
            Some(tx) => tx.send(data.to_vec()).is_ok(),
            None => false,
        }
    }

    /// Sends bytes to every registered connection.
    pub fn broadcast_all(&self, data: &[u8]) {
        let inner = self.inner.lock().expect("gateway lock poisoned");
        for tx in inner.connections.values() {
            let _ = tx.send(data.to_vec());
        }
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.inner.lock().expect("gateway lock poisoned").connections.len()
    }

    /// Whether a connection is currently a member of a group.
    pub fn is_member(&self, group: &str, id: ConnectionId) -> bool {
        let inner = self.inner.lock().expect("gateway lock poisoned");
        inner
            .groups
            .get(group)
            .is_some_and(|members| members.contains(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    #[test]
    fn test_publish_reaches_all_group_members() {
        let gateway = Gateway::new();
        let mut rx1 = gateway.register(conn(1));
        let mut rx2 = gateway.register(conn(2));
        gateway.join_group("ABC234", conn(1));
        gateway.join_group("ABC234", conn(2));

        gateway.publish("ABC234", b"hello");

        assert_eq!(rx1.try_recv().unwrap(), b"hello");
        assert_eq!(rx2.try_recv().unwrap(), b"hello");
    }

    #[test]
    fn test_publish_skips_non_members() {
        let gateway = Gateway::new();
        let mut rx1 = gateway.register(conn(1));
        let mut rx2 = gateway.register(conn(2));
        gateway.join_group("ABC234", conn(1));

        gateway.publish("ABC234", b"hello");

        assert_eq!(rx1.try_recv().unwrap(), b"hello");
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_leave_group_stops_delivery() {
        let gateway = Gateway::new();
        let mut rx = gateway.register(conn(1));
        gateway.join_group("ABC234", conn(1));
        gateway.leave_group("ABC234", conn(1));

        gateway.publish("ABC234", b"hello");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_deregister_removes_from_every_group() {
        let gateway = Gateway::new();
        let _rx = gateway.register(conn(1));
        gateway.join_group("AAAAAA", conn(1));
        gateway.join_group("BBBBBB", conn(1));

        gateway.deregister(conn(1));

        assert!(!gateway.is_member("AAAAAA", conn(1)));
        assert!(!gateway.is_member("BBBBBB", conn(1)));
        assert_eq!(gateway.connection_count(), 0);
    }

    #[test]
    fn test_drop_group_dissolves_membership_only() {
        let gateway = Gateway::new();
        let mut rx = gateway.register(conn(1));
        gateway.join_group("ABC234", conn(1));

        gateway.drop_group("ABC234");

        gateway.publish("ABC234", b"hello");
        assert!(rx.try_recv().is_err());
        // The connection itself is still reachable directly.
        assert!(gateway.send(conn(1), b"direct"));
        assert_eq!(rx.try_recv().unwrap(), b"direct");
    }

    #[test]
    fn test_send_to_unknown_connection_returns_false() {
        let gateway = Gateway::new();
        assert!(!gateway.send(conn(9), b"nope"));
    }

    #[test]
    fn test_reregister_replaces_queue() {
        let gateway = Gateway::new();
        let mut old_rx = gateway.register(conn(1));
        let mut new_rx = gateway.register(conn(1));

        gateway.send(conn(1), b"fresh");

        assert!(old_rx.try_recv().is_err());
        assert_eq!(new_rx.try_recv().unwrap(), b"fresh");
    }

    #[test]
    fn test_broadcast_all_hits_every_connection() {
        let gateway = Gateway::new();
        let mut rx1 = gateway.register(conn(1));
        let mut rx2 = gateway.register(conn(2));

        gateway.broadcast_all(b"bye");

        assert_eq!(rx1.try_recv().unwrap(), b"bye");
        assert_eq!(rx2.try_recv().unwrap(), b"bye");
    }

    #[test]
    fn test_is_member_tracks_join_and_leave() {
        let gateway = Gateway::new();
        let _rx = gateway.register(conn(1));

        assert!(!gateway.is_member("ABC234", conn(1)));
        gateway.join_group("ABC234", conn(1));
        assert!(gateway.is_member("ABC234", conn(1)));
        assert!(!gateway.is_member("XYZ789", conn(1)));

        gateway.leave_group("ABC234", conn(1));
        assert!(!gateway.is_member("ABC234", conn(1)));
    }

    #[test]
    fn test_publish_to_unknown_group_is_noop() {
        let gateway = Gateway::new();
        let mut rx = gateway.register(conn(1));
        gateway.publish("NOROOM", b"hello");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_does_not_block_publish() {
        let gateway = Gateway::new();
        let rx = gateway.register(conn(1));
        let mut rx2 = gateway.register(conn(2));
        gateway.join_group("ABC234", conn(1));
        gateway.join_group("ABC234", conn(2));
        drop(rx);

        gateway.publish("ABC234", b"hello");
        assert_eq!(rx2.try_recv().unwrap(), b"hello");
    }
}
