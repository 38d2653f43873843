//! Ephemeral typing state with a per-room stale sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::{Broadcaster, ConnectionRegistry, ServerEvent};

/// Typing entries keyed by (room, user), never persisted.
///
/// Each room with live subscribers gets one background sweep task that drops
/// entries older than `stale_after` and announces `typing:stop` for them. The task
/// ends on its own once nobody is subscribed to the room.
#[derive(Clone)]
pub struct TypingTracker {
    registry: ConnectionRegistry,
    entries: Arc<Mutex<HashMap<Uuid, HashMap<Uuid, Instant>>>>,
    sweeps: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
    interval: Duration,
    stale_after: Duration,
}

impl TypingTracker {
    pub fn new(registry: ConnectionRegistry, interval: Duration, stale_after: Duration) -> Self {
        Self {
            registry,
            entries: Arc::new(Mutex::new(HashMap::new())),
            sweeps: Arc::new(Mutex::new(HashMap::new())),
            interval,
            stale_after,
        }
    }

    /// Records activity. Returns `true` when the user was not already typing.
    pub async fn touch(&self, room: Uuid, user_id: Uuid, now: Instant) -> bool {
        self.entries
            .lock()
            .await
            .entry(room)
            .or_default()
            .insert(user_id, now)
            .is_none()
    }

    /// Returns `true` when an entry was removed.
    pub async fn clear(&self, room: Uuid, user_id: Uuid) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(users) = entries.get_mut(&room) else {
            return false;
        };
        let removed = users.remove(&user_id).is_some();
        if users.is_empty() {
            entries.remove(&room);
        }
        removed
    }

    /// Drops every entry of the user. Returns the rooms that had one.
    pub async fn clear_user(&self, user_id: Uuid) -> Vec<Uuid> {
        let mut entries = self.entries.lock().await;
        let mut rooms = Vec::new();
        entries.retain(|room, users| {
            if users.remove(&user_id).is_some() {
                rooms.push(*room);
            }
            !users.is_empty()
        });
        rooms
    }

    pub async fn is_typing(&self, room: Uuid, user_id: Uuid) -> bool {
        self.entries
            .lock()
            .await
            .get(&room)
            .is_some_and(|users| users.contains_key(&user_id))
    }

    /// One sweep pass over `room`. Stale users get a `typing:stop` broadcast and are
    /// returned.
    pub async fn sweep_once(&self, room: Uuid, now: Instant) -> Vec<Uuid> {
        let stale: Vec<Uuid> = {
            let mut entries = self.entries.lock().await;
            let Some(users) = entries.get_mut(&room) else {
                return Vec::new();
            };
            let stale: Vec<Uuid> = users
                .iter()
                .filter(|(_, last)| now.saturating_duration_since(**last) >= self.stale_after)
                .map(|(user, _)| *user)
                .collect();
            for user in &stale {
                users.remove(user);
            }
            if users.is_empty() {
                entries.remove(&room);
            }
            stale
        };

        for user_id in &stale {
            self.registry
                .emit(
                    room,
                    ServerEvent::TypingStop {
                        conversation_id: room,
                        user_id: *user_id,
                    },
                    None,
                )
                .await;
        }
        if !stale.is_empty() {
            tracing::debug!(conversation_id = %room, purged = stale.len(), "typing sweep");
        }
        stale
    }

    /// Starts the room's sweep task unless one is already running.
    pub async fn ensure_sweep(&self, room: Uuid) {
        let mut sweeps = self.sweeps.lock().await;
        if sweeps.get(&room).is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let tracker = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tracker.interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tracker.registry.subscriber_count(room).await == 0 && tracker.retire(room).await
                {
                    break;
                }
                tracker.sweep_once(room, Instant::now()).await;
            }
            tracing::debug!(conversation_id = %room, "typing sweep stopped, room is empty");
        });
        sweeps.insert(room, handle);
    }

    /// Cancels the room's sweep task and forgets its typing entries, unless the
    /// room gained a subscriber in the meantime.
    pub async fn stop_sweep(&self, room: Uuid) {
        let mut sweeps = self.sweeps.lock().await;
        // a concurrent join happens before its ensure_sweep, which waits on this lock
        if self.registry.subscriber_count(room).await > 0 {
            return;
        }
        if let Some(handle) = sweeps.remove(&room) {
            handle.abort();
        }
        self.entries.lock().await.remove(&room);
    }

    /// Called by a sweep task that found its room empty. Returns `false` when
    /// the room was rejoined before the sweeps lock was taken.
    async fn retire(&self, room: Uuid) -> bool {
        let mut sweeps = self.sweeps.lock().await;
        if self.registry.subscriber_count(room).await > 0 {
            return false;
        }
        sweeps.remove(&room);
        self.entries.lock().await.remove(&room);
        true
    }

    pub async fn active_sweeps(&self) -> usize {
        self.sweeps
            .lock()
            .await
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}
