//! The connection router: who is connected, where they are, and fan-out.
//!
//! One injected, lock-guarded registry instead of ambient globals. It
//! holds three narrow maps — user → outbound channel, user → current
//! room, room → members — and exposes only get/set/remove plus the
//! broadcast primitives, so it could be swapped for a distributed
//! session store without touching callers.
//!
//! The router never mutates room documents; membership here only mirrors
//! which sockets have attached to a room for event delivery.

use std::collections::{HashMap, HashSet};

use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use shoalfire_protocol::{RoomId, ServerEvent, UserId};

/// Outbound channel for one user's connection.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

#[derive(Default)]
struct RouterInner {
    connections: HashMap<UserId, EventSender>,
    user_rooms: HashMap<UserId, RoomId>,
    room_users: HashMap<RoomId, HashSet<UserId>>,
}

/// Maps authenticated connections to users and users to rooms, and fans
/// events out to everyone attached to a room.
#[derive(Default)]
pub struct Router {
    inner: Mutex<RouterInner>,
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user's outbound channel. A reconnecting user replaces
    /// their previous channel; the stale one is dropped.
    pub async fn register(&self, user_id: UserId, sender: EventSender) {
        let mut inner = self.inner.lock().await;
        if inner.connections.insert(user_id, sender).is_some() {
            debug!(%user_id, "replaced existing connection");
        }
    }

    /// Removes a user's outbound channel. Room attachment is left to the
    /// caller's leave flow so departure events can still be delivered to
    /// the rest of the room.
    pub async fn unregister(&self, user_id: UserId) {
        self.inner.lock().await.connections.remove(&user_id);
    }

    /// Returns `true` if the user currently has a live connection.
    pub async fn is_connected(&self, user_id: UserId) -> bool {
        self.inner.lock().await.connections.contains_key(&user_id)
    }

    /// Attaches a user to a room for event delivery.
    pub async fn attach_room(&self, user_id: UserId, room_id: RoomId) {
        let mut inner = self.inner.lock().await;
        if let Some(previous) = inner.user_rooms.insert(user_id, room_id) {
            if previous != room_id {
                if let Some(members) = inner.room_users.get_mut(&previous) {
                    members.remove(&user_id);
                }
            }
        }
        inner.room_users.entry(room_id).or_default().insert(user_id);
    }

    /// Detaches a user from their current room, returning it.
    pub async fn detach_room(&self, user_id: UserId) -> Option<RoomId> {
        let mut inner = self.inner.lock().await;
        let room_id = inner.user_rooms.remove(&user_id)?;
        if let Some(members) = inner.room_users.get_mut(&room_id) {
            members.remove(&user_id);
            if members.is_empty() {
                inner.room_users.remove(&room_id);
            }
        }
        Some(room_id)
    }

    /// The room a user is currently attached to.
    pub async fn room_of(&self, user_id: UserId) -> Option<RoomId> {
        self.inner.lock().await.user_rooms.get(&user_id).copied()
    }

    /// Users currently attached to a room.
    pub async fn members(&self, room_id: RoomId) -> Vec<UserId> {
        self.inner
            .lock()
            .await
            .room_users
            .get(&room_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Detaches every user from a room (room deleted). Returns who was
    /// attached.
    pub async fn clear_room(&self, room_id: RoomId) -> Vec<UserId> {
        let mut inner = self.inner.lock().await;
        let members: Vec<UserId> = inner
            .room_users
            .remove(&room_id)
            .map(|m| m.into_iter().collect())
            .unwrap_or_default();
        for user_id in &members {
            inner.user_rooms.remove(user_id);
        }
        members
    }

    /// Sends an event to one user. Returns `false` if they have no live
    /// connection; a dead channel is pruned on the spot.
    pub async fn send_to(&self, user_id: UserId, event: ServerEvent) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.connections.get(&user_id) {
            Some(sender) => {
                if sender.send(event).is_err() {
                    inner.connections.remove(&user_id);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    /// Fans an event out to every user attached to a room.
    pub async fn broadcast(&self, room_id: RoomId, event: ServerEvent) {
        self.broadcast_inner(room_id, None, event).await;
    }

    /// Fans an event out to a room, skipping one user (usually the
    /// actor, who got a direct reply instead).
    pub async fn broadcast_except(
        &self,
        room_id: RoomId,
        except: UserId,
        event: ServerEvent,
    ) {
        self.broadcast_inner(room_id, Some(except), event).await;
    }

    async fn broadcast_inner(
        &self,
        room_id: RoomId,
        except: Option<UserId>,
        event: ServerEvent,
    ) {
        let mut inner = self.inner.lock().await;
        let Some(members) = inner.room_users.get(&room_id) else {
            return;
        };
        let targets: Vec<UserId> = members
            .iter()
            .copied()
            .filter(|u| Some(*u) != except)
            .collect();
        let mut dead = Vec::new();
        for user_id in targets {
            if let Some(sender) = inner.connections.get(&user_id) {
                if sender.send(event.clone()).is_err() {
                    dead.push(user_id);
                }
            }
        }
        for user_id in dead {
            inner.connections.remove(&user_id);
        }
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.connections.len()
    }
}

// =========================================================================
// Tests
// =========================================================================
