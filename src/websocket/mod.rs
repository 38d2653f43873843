use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod events;
pub mod gateway;
pub mod presence;

pub use events::ServerEvent;
pub use gateway::Gateway;

/// Unique identifier for a live socket connection
///
/// A user may hold several connections (devices); each gets its own id so it can
/// be excluded from echoes and cleaned up precisely when it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Event fan-out seam injected into every use-case that emits.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Delivers `event` to every connection in the room except `except`.
    async fn emit(&self, room: Uuid, event: ServerEvent, except: Option<ConnectionId>);

    /// Subscribes every live connection of `user_id` to the room.
    async fn join_user(&self, room: Uuid, user_id: Uuid);

    /// Unsubscribes every connection of `user_id` from the room.
    async fn leave_user(&self, room: Uuid, user_id: Uuid);

    /// Drops the room entirely.
    async fn close_room(&self, room: Uuid);
}

#[derive(Clone)]
struct Subscriber {
    id: ConnectionId,
    user_id: Uuid,
    sender: UnboundedSender<String>,
}

/// Connection registry for socket subscribers
///
/// Tracks live connections and which rooms (conversation ids) each is subscribed
/// to. A failed send means the connection is gone; it is dropped silently.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    // room (conversation_id) -> subscribers
    rooms: Arc<RwLock<HashMap<Uuid, Vec<Subscriber>>>>,
    connections: Arc<RwLock<HashMap<ConnectionId, Subscriber>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for `user_id`
    ///
    /// Returns the connection id, the receiver its transport drains, and whether
    /// this is the user's only live connection. The check and the insert happen
    /// under one write lock, so of several devices connecting at once exactly one
    /// sees `true`.
    pub async fn register(
        &self,
        user_id: Uuid,
    ) -> (ConnectionId, UnboundedReceiver<String>, bool) {
        let (tx, rx) = unbounded_channel();
        let id = ConnectionId::new();
        let mut connections = self.connections.write().await;
        let first = !connections.values().any(|s| s.user_id == user_id);
        connections.insert(
            id,
            Subscriber {
                id,
                user_id,
                sender: tx,
            },
        );
        drop(connections);
        tracing::debug!(connection_id = %id, %user_id, first, "registered connection");
        (id, rx, first)
    }

    /// Remove a connection from the registry and from every room
    ///
    /// Must be called when a socket closes. Returns the rooms it was subscribed to.
    pub async fn unregister(&self, id: ConnectionId) -> Vec<Uuid> {
        self.connections.write().await.remove(&id);

        let mut rooms = self.rooms.write().await;
        let mut left = Vec::new();
        rooms.retain(|room_id, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|s| s.id != id);
            if subscribers.len() != before {
                left.push(*room_id);
            }
            !subscribers.is_empty()
        });
        tracing::debug!(connection_id = %id, rooms = left.len(), "unregistered connection");
        left
    }

    /// Subscribe a registered connection to a room. Returns `false` if the
    /// connection is unknown or already subscribed.
    pub async fn join(&self, room: Uuid, id: ConnectionId) -> bool {
        let Some(subscriber) = self.connections.read().await.get(&id).cloned() else {
            return false;
        };
        let mut rooms = self.rooms.write().await;
        let subscribers = rooms.entry(room).or_default();
        if subscribers.iter().any(|s| s.id == id) {
            return false;
        }
        subscribers.push(subscriber);
        tracing::debug!(
            connection_id = %id,
            conversation_id = %room,
            total = subscribers.len(),
            "joined room"
        );
        true
    }

    pub async fn leave(&self, room: Uuid, id: ConnectionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(subscribers) = rooms.get_mut(&room) {
            subscribers.retain(|s| s.id != id);
            if subscribers.is_empty() {
                rooms.remove(&room);
            }
        }
    }

    pub async fn is_subscribed(&self, room: Uuid, id: ConnectionId) -> bool {
        self.rooms
            .read()
            .await
            .get(&room)
            .is_some_and(|subscribers| subscribers.iter().any(|s| s.id == id))
    }

    /// Send a frame to one connection. Returns `false` when it is gone.
    pub async fn send_to(&self, id: ConnectionId, msg: String) -> bool {
        let sent = self
            .connections
            .read()
            .await
            .get(&id)
            .map(|s| s.sender.send(msg).is_ok())
            .unwrap_or(false);
        if !sent {
            tracing::debug!(connection_id = %id, "dropping frame for closed connection");
        }
        sent
    }

    /// Broadcast a frame to all subscribers of a room except `except`
    ///
    /// Automatically cleans up dead senders (where send fails).
    pub async fn broadcast(&self, room: Uuid, msg: String, except: Option<ConnectionId>) {
        let mut rooms = self.rooms.write().await;
        if let Some(subscribers) = rooms.get_mut(&room) {
            let before = subscribers.len();

            subscribers.retain(|subscriber| {
                if Some(subscriber.id) == except {
                    return true;
                }
                subscriber.sender.send(msg.clone()).is_ok()
            });

            let after = subscribers.len();
            if before != after {
                tracing::debug!(
                    conversation_id = %room,
                    dead = before - after,
                    active = after,
                    "broadcast cleaned up dead senders"
                );
            }
            if subscribers.is_empty() {
                rooms.remove(&room);
            }
        }
    }

    /// Number of live connections held by a user
    pub async fn user_connection_count(&self, user_id: Uuid) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .count()
    }

    /// Get subscriber count for a room
    pub async fn subscriber_count(&self, room: Uuid) -> usize {
        let guard = self.rooms.read().await;
        guard.get(&room).map(|v| v.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Broadcaster for ConnectionRegistry {
    async fn emit(&self, room: Uuid, event: ServerEvent, except: Option<ConnectionId>) {
        match event.to_frame() {
            Ok(frame) => self.broadcast(room, frame, except).await,
            Err(e) => tracing::error!(
                error = %e,
                event = event.event_type(),
                "failed to serialize event"
            ),
        }
    }

    async fn join_user(&self, room: Uuid, user_id: Uuid) {
        let ids: Vec<ConnectionId> = self
            .connections
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.id)
            .collect();
        for id in ids {
            self.join(room, id).await;
        }
    }

    async fn leave_user(&self, room: Uuid, user_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        if let Some(subscribers) = rooms.get_mut(&room) {
            subscribers.retain(|s| s.user_id != user_id);
            if subscribers.is_empty() {
                rooms.remove(&room);
            }
        }
    }

    async fn close_room(&self, room: Uuid) {
        self.rooms.write().await.remove(&room);
    }
}
