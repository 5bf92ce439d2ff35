//! Process-local map from marketplace identities to live WebSocket
//! connections.
//!
//! A party may hold several connections at once (tabs, devices). Each
//! connection joins the room of the identity it authenticated as, and
//! chooses which event kinds it wants delivered. Nothing here is persisted:
//! after a restart clients rejoin on reconnect.

use std::collections::{HashMap, HashSet};

use axum::body::Bytes;
use axum::extract::ws::Message;
use repairlink_core::realtime::{RoomRole, ALL_EVENT_KINDS};
use repairlink_core::types::{DbId, Timestamp};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// A room: one identity on one side of the marketplace.
pub type Room = (RoomRole, DbId);

struct Connection {
    sender: WsSender,
    memberships: HashSet<Room>,
    subscriptions: HashSet<&'static str>,
    connected_at: Timestamp,
}

#[derive(Default)]
struct Rooms {
    connections: HashMap<String, Connection>,
    clients: HashMap<DbId, HashSet<String>>,
    technicians: HashMap<DbId, HashSet<String>>,
}

impl Rooms {
    fn members_mut(&mut self, role: RoomRole) -> &mut HashMap<DbId, HashSet<String>> {
        match role {
            RoomRole::Client => &mut self.clients,
            RoomRole::Technician => &mut self.technicians,
        }
    }

    fn members(&self, role: RoomRole) -> &HashMap<DbId, HashSet<String>> {
        match role {
            RoomRole::Client => &self.clients,
            RoomRole::Technician => &self.technicians,
        }
    }
}

/// Live connections and their room memberships.
///
/// Thread-safe via an interior `RwLock`; wrap in `Arc` and share.
pub struct ConnectionRegistry {
    rooms: RwLock<Rooms>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(Rooms::default()),
        }
    }

    /// Register a new connection, subscribed to every event kind and in no
    /// room yet.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(&self, conn_id: String) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection {
            sender: tx,
            memberships: HashSet::new(),
            subscriptions: ALL_EVENT_KINDS.iter().copied().collect(),
            connected_at: chrono::Utc::now(),
        };
        self.rooms.write().await.connections.insert(conn_id, conn);
        rx
    }

    /// Drop a connection and purge it from every room.
    pub async fn remove(&self, conn_id: &str) {
        let mut guard = self.rooms.write().await;
        let rooms = &mut *guard;
        let Some(conn) = rooms.connections.remove(conn_id) else {
            return;
        };
        for members in [&mut rooms.clients, &mut rooms.technicians] {
            members.retain(|_, conns| {
                conns.remove(conn_id);
                !conns.is_empty()
            });
        }
        tracing::debug!(
            conn_id,
            rooms = conn.memberships.len(),
            connected_secs = (chrono::Utc::now() - conn.connected_at).num_seconds(),
            "Connection purged from registry"
        );
    }

    /// Put a connection in an identity's room. Joining again is a no-op.
    ///
    /// Returns `false` if the connection is unknown.
    pub async fn join(&self, conn_id: &str, role: RoomRole, identity_id: DbId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(conn) = rooms.connections.get_mut(conn_id) else {
            return false;
        };
        conn.memberships.insert((role, identity_id));
        rooms
            .members_mut(role)
            .entry(identity_id)
            .or_default()
            .insert(conn_id.to_string());
        true
    }

    /// Take a connection out of an identity's room. Leaving a room the
    /// connection is not in is a no-op.
    ///
    /// Returns `false` if the connection is unknown.
    pub async fn leave(&self, conn_id: &str, role: RoomRole, identity_id: DbId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(conn) = rooms.connections.get_mut(conn_id) else {
            return false;
        };
        conn.memberships.remove(&(role, identity_id));
        let members = rooms.members_mut(role);
        if let Some(conns) = members.get_mut(&identity_id) {
            conns.remove(conn_id);
            if conns.is_empty() {
                members.remove(&identity_id);
            }
        }
        true
    }

    /// Add event kinds to a connection's subscriptions and return the
    /// resulting set, sorted. `None` if the connection is unknown.
    pub async fn subscribe(
        &self,
        conn_id: &str,
        kinds: &[&'static str],
    ) -> Option<Vec<&'static str>> {
        let mut rooms = self.rooms.write().await;
        let conn = rooms.connections.get_mut(conn_id)?;
        conn.subscriptions.extend(kinds.iter().copied());
        Some(sorted(&conn.subscriptions))
    }

    /// Remove event kinds from a connection's subscriptions and return the
    /// resulting set, sorted. `None` if the connection is unknown.
    pub async fn unsubscribe(
        &self,
        conn_id: &str,
        kinds: &[&'static str],
    ) -> Option<Vec<&'static str>> {
        let mut rooms = self.rooms.write().await;
        let conn = rooms.connections.get_mut(conn_id)?;
        for kind in kinds {
            conn.subscriptions.remove(kind);
        }
        Some(sorted(&conn.subscriptions))
    }

    /// Rooms a connection currently belongs to.
    pub async fn memberships(&self, conn_id: &str) -> Vec<Room> {
        self.rooms
            .read()
            .await
            .connections
            .get(conn_id)
            .map(|c| c.memberships.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Connection ids in an identity's room.
    pub async fn connections_of(&self, role: RoomRole, identity_id: DbId) -> Vec<String> {
        self.rooms
            .read()
            .await
            .members(role)
            .get(&identity_id)
            .map(|conns| conns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether anyone is listening in an identity's room.
    pub async fn is_online(&self, role: RoomRole, identity_id: DbId) -> bool {
        self.rooms
            .read()
            .await
            .members(role)
            .get(&identity_id)
            .is_some_and(|conns| !conns.is_empty())
    }

    /// Push an event message to every connection in an identity's room that
    /// subscribes to `kind`.
    ///
    /// Returns the number of connections the message was handed to. Closed
    /// channels are skipped; their receive loop removes them.
    pub async fn send_to_room(
        &self,
        role: RoomRole,
        identity_id: DbId,
        kind: &str,
        message: Message,
    ) -> usize {
        let rooms = self.rooms.read().await;
        let Some(conn_ids) = rooms.members(role).get(&identity_id) else {
            return 0;
        };
        let mut count = 0;
        for conn in conn_ids.iter().filter_map(|id| rooms.connections.get(id)) {
            if conn.subscriptions.contains(kind) && conn.sender.send(message.clone()).is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Send a message to one connection, ignoring subscriptions. Used for
    /// control replies.
    pub async fn send_to_connection(&self, conn_id: &str, message: Message) -> bool {
        self.rooms
            .read()
            .await
            .connections
            .get(conn_id)
            .is_some_and(|conn| conn.sender.send(message).is_ok())
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.rooms.read().await.connections.len()
    }

    /// Number of identities with at least one connection in the given role.
    pub async fn room_count(&self, role: RoomRole) -> usize {
        self.rooms.read().await.members(role).len()
    }

    /// Send a Ping frame to every connected client.
    pub async fn ping_all(&self) {
        let rooms = self.rooms.read().await;
        for conn in rooms.connections.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every connection, then forget them all.
    pub async fn shutdown_all(&self) {
        let mut rooms = self.rooms.write().await;
        let count = rooms.connections.len();
        for conn in rooms.connections.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        *rooms = Rooms::default();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted(kinds: &HashSet<&'static str>) -> Vec<&'static str> {
    let mut out: Vec<_> = kinds.iter().copied().collect();
    out.sort_unstable();
    out
}
