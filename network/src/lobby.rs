// SPDX-License-Identifier: MIT OR Apache-2.0

//! Room registry for the relay.
//!   * create_room / list_rooms / remove_room / verify_password
//!   * join / leave / broadcast for the WebSocket fan-out
//!   * broadcast LobbyEvent via tokio::sync::broadcast
//!
//! The registry carries no game semantics: a room is a broadcast domain
//! holding at most two players, plus the metadata the lobby screen shows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::{PlayerId, RoomId};

/// Occupancy status shown on the lobby screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
}

/// Public description of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    /// Room identifier; the room name doubles as the id
    pub id: RoomId,
    pub name: String,
    pub host_name: String,
    /// Whether joining requires a password
    pub is_locked: bool,
    /// Winning threshold configured by the host
    pub win_score: u32,
    pub status: RoomStatus,
    pub player_count: usize,
    /// Memory set the room plays with
    pub memory_set_id: String,
}

/// Room creation request, as posted by the lobby screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    pub host_name: String,
    #[serde(default)]
    pub password: String,
    pub win_score: u32,
    #[serde(default = "default_set_id")]
    pub memory_set_id: String,
}

fn default_set_id() -> String {
    "default".to_string()
}

/// Events emitted by the registry.
#[derive(Debug, Clone)]
pub enum LobbyEvent {
    RoomCreated(RoomInfo),
    RoomRemoved(RoomId),
    PlayerJoined {
        room_id: RoomId,
        player_count: usize,
    },
    PlayerLeft {
        room_id: RoomId,
        player_count: usize,
    },
}

/// Errors from the room management surface.
#[derive(Debug, Error)]
pub enum LobbyError {
    #[error("room not found: {0}")]
    NotFound(RoomId),
    #[error("room name already in use: {0}")]
    NameTaken(String),
    #[error("not allowed to remove room {0}")]
    Forbidden(RoomId),
    #[error("wrong password for room {0}")]
    WrongPassword(RoomId),
}

/// Errors from a WebSocket join attempt, mapped to close codes by the
/// relay handler.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("room not found: {0}")]
    NotFound(RoomId),
    #[error("room is full: {0}")]
    Full(RoomId),
}

/// Result of a successful join.
#[derive(Debug, Clone, Copy)]
pub struct JoinOutcome {
    /// True when this join filled the room to two players
    pub matched: bool,
}

struct RoomEntry {
    info: RoomInfo,
    password: String,
    owner_token: String,
    /// Per-member outbound queues for the fan-out
    members: HashMap<PlayerId, mpsc::UnboundedSender<String>>,
    /// Pending delayed removal of an empty room
    cleanup: Option<JoinHandle<()>>,
}

/// Shared room registry behind the relay's REST and WebSocket surfaces.
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<RoomId, RoomEntry>>>,
    events_tx: broadcast::Sender<LobbyEvent>,
    /// Keep a receiver alive so event sends never fail
    _events_rx: broadcast::Receiver<LobbyEvent>,
    /// Grace period before an empty room is removed
    cleanup_grace: Duration,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_cleanup_grace(Duration::from_secs(5))
    }

    pub fn with_cleanup_grace(cleanup_grace: Duration) -> Self {
        let (events_tx, events_rx) = broadcast::channel(100);
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            events_tx,
            _events_rx: events_rx,
            cleanup_grace,
        }
    }

    /// Get a receiver for lobby events.
    pub fn subscribe(&self) -> broadcast::Receiver<LobbyEvent> {
        self.events_tx.subscribe()
    }

    /// Create a room. The room name doubles as its id and must be unique.
    /// Returns the room info and the owner token that authorizes removal.
    pub async fn create_room(
        &self,
        request: CreateRoomRequest,
    ) -> Result<(RoomInfo, String), LobbyError> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&request.name) {
            return Err(LobbyError::NameTaken(request.name));
        }

        let info = RoomInfo {
            id: request.name.clone(),
            name: request.name.clone(),
            host_name: request.host_name,
            is_locked: !request.password.is_empty(),
            win_score: request.win_score,
            status: RoomStatus::Waiting,
            player_count: 0,
            memory_set_id: request.memory_set_id,
        };
        let owner_token = uuid::Uuid::new_v4().to_string();
        rooms.insert(
            request.name,
            RoomEntry {
                info: info.clone(),
                password: request.password,
                owner_token: owner_token.clone(),
                members: HashMap::new(),
                cleanup: None,
            },
        );
        tracing::debug!(room_id = %info.id, "room created");
        let _ = self.events_tx.send(LobbyEvent::RoomCreated(info.clone()));
        Ok((info, owner_token))
    }

    /// List all rooms.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let rooms = self.rooms.read().await;
        rooms.values().map(|entry| entry.info.clone()).collect()
    }

    /// Look up a single room.
    pub async fn room_info(&self, room_id: &str) -> Option<RoomInfo> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).map(|entry| entry.info.clone())
    }

    /// Remove a room. Allowed for the owner (by token) or when the room
    /// is empty.
    pub async fn remove_room(&self, room_id: &str, token: Option<&str>) -> Result<(), LobbyError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms
            .get(room_id)
            .ok_or_else(|| LobbyError::NotFound(room_id.to_string()))?;
        let is_owner = token.is_some_and(|t| t == entry.owner_token);
        let is_empty = entry.members.is_empty();
        if !(is_owner || is_empty) {
            return Err(LobbyError::Forbidden(room_id.to_string()));
        }
        if let Some(entry) = rooms.remove(room_id) {
            if let Some(task) = entry.cleanup {
                task.abort();
            }
        }
        tracing::debug!(room_id, "room removed");
        let _ = self
            .events_tx
            .send(LobbyEvent::RoomRemoved(room_id.to_string()));
        Ok(())
    }

    /// Check a join password.
    pub async fn verify_password(&self, room_id: &str, password: &str) -> Result<(), LobbyError> {
        let rooms = self.rooms.read().await;
        let entry = rooms
            .get(room_id)
            .ok_or_else(|| LobbyError::NotFound(room_id.to_string()))?;
        if entry.password == password {
            Ok(())
        } else {
            Err(LobbyError::WrongPassword(room_id.to_string()))
        }
    }

    /// Register a player's outbound queue with a room. Cancels a pending
    /// empty-room cleanup. A rejoin under the same player id replaces the
    /// previous queue.
    pub async fn join(
        &self,
        room_id: &str,
        player_id: &str,
        tx: mpsc::UnboundedSender<String>,
    ) -> Result<JoinOutcome, JoinError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms
            .get_mut(room_id)
            .ok_or_else(|| JoinError::NotFound(room_id.to_string()))?;

        if entry.members.len() >= 2 && !entry.members.contains_key(player_id) {
            return Err(JoinError::Full(room_id.to_string()));
        }
        if let Some(task) = entry.cleanup.take() {
            task.abort();
            tracing::debug!(room_id, "cleanup cancelled, room rejoined");
        }

        entry.members.insert(player_id.to_string(), tx);
        entry.info.player_count = entry.members.len();
        let matched = entry.members.len() == 2;
        if matched {
            entry.info.status = RoomStatus::Playing;
        }
        tracing::debug!(room_id, player_id, players = entry.members.len(), "player joined");
        let _ = self.events_tx.send(LobbyEvent::PlayerJoined {
            room_id: room_id.to_string(),
            player_count: entry.members.len(),
        });
        Ok(JoinOutcome { matched })
    }

    /// Drop a player from a room. A room left with one player returns to
    /// `Waiting`; an emptied room is removed after the grace period
    /// unless someone rejoins first.
    pub async fn leave(&self, room_id: &str, player_id: &str) {
        let mut rooms = self.rooms.write().await;
        let Some(entry) = rooms.get_mut(room_id) else {
            return;
        };
        entry.members.remove(player_id);
        entry.info.player_count = entry.members.len();
        if entry.members.len() <= 1 {
            entry.info.status = RoomStatus::Waiting;
        }
        tracing::debug!(room_id, player_id, players = entry.members.len(), "player left");
        let _ = self.events_tx.send(LobbyEvent::PlayerLeft {
            room_id: room_id.to_string(),
            player_count: entry.members.len(),
        });

        if entry.members.is_empty() {
            let rooms_handle = self.rooms.clone();
            let events_tx = self.events_tx.clone();
            let grace = self.cleanup_grace;
            let room_key = room_id.to_string();
            entry.cleanup = Some(tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let mut rooms = rooms_handle.write().await;
                let still_empty = rooms
                    .get(&room_key)
                    .is_some_and(|entry| entry.members.is_empty());
                if still_empty {
                    rooms.remove(&room_key);
                    tracing::debug!(room_id = %room_key, "empty room cleaned up");
                    let _ = events_tx.send(LobbyEvent::RoomRemoved(room_key));
                }
            }));
        }
    }

    /// Fan a message out to every member of a room, the sender included.
    /// Members whose queue is gone are pruned on the spot.
    pub async fn broadcast(&self, room_id: &str, message: &str) {
        let mut rooms = self.rooms.write().await;
        let Some(entry) = rooms.get_mut(room_id) else {
            return;
        };
        entry
            .members
            .retain(|player_id, tx| match tx.send(message.to_string()) {
                Ok(()) => true,
                Err(_) => {
                    tracing::debug!(room_id, player_id, "pruning dead member queue");
                    false
                }
            });
        entry.info.player_count = entry.members.len();
    }

    /// Mark a room as playing again; used when a rematch notice passes
    /// through the relay.
    pub async fn mark_playing(&self, room_id: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(entry) = rooms.get_mut(room_id) {
            entry.info.status = RoomStatus::Playing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> CreateRoomRequest {
        CreateRoomRequest {
            name: name.to_string(),
            host_name: "Alice".to_string(),
            password: String::new(),
            win_score: 10,
            memory_set_id: "default".to_string(),
        }
    }

    #[tokio::test]
    async fn create_and_list_rooms() {
        let registry = RoomRegistry::new();
        let mut events = registry.subscribe();
        let (info, token) = registry.create_room(request("forest")).await.unwrap();
        assert_eq!(info.id, "forest");
        assert!(!token.is_empty());
        assert_eq!(registry.list_rooms().await.len(), 1);
        assert!(matches!(
            events.recv().await.unwrap(),
            LobbyEvent::RoomCreated(_)
        ));
    }

    #[tokio::test]
    async fn duplicate_room_name_rejected() {
        let registry = RoomRegistry::new();
        registry.create_room(request("forest")).await.unwrap();
        assert!(matches!(
            registry.create_room(request("forest")).await,
            Err(LobbyError::NameTaken(_))
        ));
    }

    #[tokio::test]
    async fn second_join_flips_room_to_playing() {
        let registry = RoomRegistry::new();
        registry.create_room(request("forest")).await.unwrap();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let outcome = registry.join("forest", "p1", tx1).await.unwrap();
        assert!(!outcome.matched);
        let outcome = registry.join("forest", "p2", tx2).await.unwrap();
        assert!(outcome.matched);

        let info = registry.room_info("forest").await.unwrap();
        assert_eq!(info.status, RoomStatus::Playing);
        assert_eq!(info.player_count, 2);
    }

    #[tokio::test]
    async fn third_player_is_rejected() {
        let registry = RoomRegistry::new();
        registry.create_room(request("forest")).await.unwrap();
        for player in ["p1", "p2"] {
            let (tx, _rx) = mpsc::unbounded_channel();
            registry.join("forest", player, tx).await.unwrap();
        }
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            registry.join("forest", "p3", tx).await,
            Err(JoinError::Full(_))
        ));
    }

    #[tokio::test]
    async fn broadcast_reaches_all_members_including_sender() {
        let registry = RoomRegistry::new();
        registry.create_room(request("forest")).await.unwrap();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.join("forest", "p1", tx1).await.unwrap();
        registry.join("forest", "p2", tx2).await.unwrap();

        registry.broadcast("forest", "p1:SCORE_UP").await;
        assert_eq!(rx1.recv().await.unwrap(), "p1:SCORE_UP");
        assert_eq!(rx2.recv().await.unwrap(), "p1:SCORE_UP");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_room_removed_after_grace() {
        let registry = RoomRegistry::with_cleanup_grace(Duration::from_secs(5));
        registry.create_room(request("forest")).await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.join("forest", "p1", tx).await.unwrap();
        registry.leave("forest", "p1").await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(registry.room_info("forest").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rejoin_cancels_pending_cleanup() {
        let registry = RoomRegistry::with_cleanup_grace(Duration::from_secs(5));
        registry.create_room(request("forest")).await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.join("forest", "p1", tx).await.unwrap();
        registry.leave("forest", "p1").await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.join("forest", "p1", tx).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(registry.room_info("forest").await.is_some());
    }

    #[tokio::test]
    async fn password_verification() {
        let registry = RoomRegistry::new();
        let mut req = request("locked");
        req.password = "hunter2".to_string();
        let (info, _) = registry.create_room(req).await.unwrap();
        assert!(info.is_locked);

        assert!(registry.verify_password("locked", "hunter2").await.is_ok());
        assert!(matches!(
            registry.verify_password("locked", "nope").await,
            Err(LobbyError::WrongPassword(_))
        ));
    }
}
