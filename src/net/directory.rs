//! Room Directory
//!
//! Tracks live rooms and which room each player is in. Join requests land
//! in the first room with a free slot or spin up a fresh one, and empty
//! rooms are torn down on the way out. The registry surface is a trait so
//! a sharded or remote directory can slot in behind the same calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::game::state::PlayerId;
use crate::game::tick::RoomConfig;
use crate::net::protocol::ServerMessage;
use crate::net::room::{Room, RoomError, RoomId};
use crate::net::scheduler::spawn_room_loop;

/// Directory-level failures.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The join was accepted by the directory but refused by the room
    #[error(transparent)]
    Room(#[from] RoomError),
    /// The player has no room assignment
    #[error("player is not in any room")]
    NotAssigned,
    /// The room id is unknown
    #[error("unknown room")]
    UnknownRoom,
}

/// Placement and lookup surface for rooms.
pub trait RoomRegistry {
    /// Place a player into a room, creating one if none has space. Sends
    /// the join handshake over `sender` and returns the room id.
    fn join(
        &self,
        player: PlayerId,
        name: String,
        sender: mpsc::Sender<ServerMessage>,
    ) -> impl std::future::Future<Output = Result<RoomId, DirectoryError>> + Send;

    /// Remove a player from their room; tears the room down when it
    /// empties.
    fn leave(&self, player: PlayerId) -> impl std::future::Future<Output = Result<RoomId, DirectoryError>> + Send;

    /// Look up a room by id.
    fn room(&self, id: RoomId) -> impl std::future::Future<Output = Option<Arc<Room>>> + Send;
}

/// In-process room registry.
pub struct RoomDirectory {
    /// Template applied to every room this directory creates
    config: RoomConfig,
    rooms: RwLock<BTreeMap<RoomId, Arc<Room>>>,
    assignments: RwLock<BTreeMap<PlayerId, RoomId>>,
}

impl RoomDirectory {
    /// Create a directory; rooms it spawns use `config`.
    pub fn new(config: RoomConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            rooms: RwLock::new(BTreeMap::new()),
            assignments: RwLock::new(BTreeMap::new()),
        })
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// The room a player is assigned to, if any.
    pub async fn assignment(&self, player: PlayerId) -> Option<RoomId> {
        self.assignments.read().await.get(&player).copied()
    }

    /// First room with a free slot, or a freshly spawned one.
    async fn room_with_space(&self) -> Arc<Room> {
        {
            let rooms = self.rooms.read().await;
            for room in rooms.values() {
                if room.session_count().await < room.config.max_players {
                    return room.clone();
                }
            }
        }

        let room = Room::new(RoomId::random(), self.config.clone());
        spawn_room_loop(room.clone());
        self.rooms.write().await.insert(room.id, room.clone());
        info!(room = %room.id.to_uuid_string(), "room spawned");
        room
    }

    async fn teardown_if_empty(&self, room_id: RoomId) {
        let mut rooms = self.rooms.write().await;
        let empty = match rooms.get(&room_id) {
            Some(room) => room.session_count().await == 0,
            None => false,
        };
        if empty {
            if let Some(room) = rooms.remove(&room_id) {
                room.shutdown();
                info!(room = %room_id.to_uuid_string(), "empty room torn down");
            }
        }
    }
}

impl RoomRegistry for RoomDirectory {
    async fn join(
        &self,
        player: PlayerId,
        name: String,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<RoomId, DirectoryError> {
        // Re-joining moves the player: drop the old assignment first.
        if self.assignments.read().await.contains_key(&player) {
            let _ = self.leave(player).await;
        }

        let room = self.room_with_space().await;
        room.join(player, name, sender).await?;
        self.assignments.write().await.insert(player, room.id);
        debug!(
            player = %player.to_uuid_string(),
            room = %room.id.to_uuid_string(),
            "player assigned"
        );
        Ok(room.id)
    }

    async fn leave(&self, player: PlayerId) -> Result<RoomId, DirectoryError> {
        let room_id = self
            .assignments
            .write()
            .await
            .remove(&player)
            .ok_or(DirectoryError::NotAssigned)?;

        let room = self
            .rooms
            .read()
            .await
            .get(&room_id)
            .cloned()
            .ok_or(DirectoryError::UnknownRoom)?;
        room.leave(player).await;
        self.teardown_if_empty(room_id).await;
        Ok(room_id)
    }

    async fn room(&self, id: RoomId) -> Option<Arc<Room>> {
        self.rooms.read().await.get(&id).cloned()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> RoomConfig {
        RoomConfig {
            tick_rate: 100,
            max_players: 2,
            ..RoomConfig::default()
        }
    }

    async fn join_one(directory: &RoomDirectory) -> (PlayerId, RoomId) {
        let player = PlayerId::random();
        let (tx, mut rx) = mpsc::channel(256);
        let room_id = directory.join(player, "p".into(), tx).await.unwrap();
        // Keep the channel alive long enough to swallow the handshake.
        rx.recv().await.unwrap();
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        (player, room_id)
    }

    #[tokio::test]
    async fn test_players_fill_rooms_before_new_ones_spawn() {
        let directory = RoomDirectory::new(fast_config());

        let (_, first) = join_one(&directory).await;
        let (_, second) = join_one(&directory).await;
        assert_eq!(first, second);
        assert_eq!(directory.room_count().await, 1);

        // Third player overflows into a fresh room.
        let (_, third) = join_one(&directory).await;
        assert_ne!(first, third);
        assert_eq!(directory.room_count().await, 2);
    }

    #[tokio::test]
    async fn test_leave_tears_down_empty_room() {
        let directory = RoomDirectory::new(fast_config());
        let (player, room_id) = join_one(&directory).await;
        assert!(directory.room(room_id).await.is_some());

        let left = directory.leave(player).await.unwrap();
        assert_eq!(left, room_id);
        assert_eq!(directory.room_count().await, 0);
        assert!(directory.room(room_id).await.is_none());
        assert!(directory.assignment(player).await.is_none());
    }

    #[tokio::test]
    async fn test_leave_without_assignment_fails() {
        let directory = RoomDirectory::new(fast_config());
        let result = directory.leave(PlayerId::random()).await;
        assert!(matches!(result, Err(DirectoryError::NotAssigned)));
    }

    #[tokio::test]
    async fn test_rejoin_moves_player() {
        let directory = RoomDirectory::new(fast_config());
        let (player, first) = join_one(&directory).await;

        let (tx, mut rx) = mpsc::channel(256);
        let second = directory.join(player, "p".into(), tx).await.unwrap();
        rx.recv().await.unwrap();

        assert_eq!(directory.assignment(player).await, Some(second));
        // The first room emptied out and was torn down.
        assert!(directory.room(first).await.is_none() || first == second);
    }
}
