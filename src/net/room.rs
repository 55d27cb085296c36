//! Room Actor
//!
//! One `Room` owns one `RoomState` behind a mutex that only two paths ever
//! take: session joins/leaves and the tick loop. Gameplay traffic never
//! locks; clients push commands onto a bounded queue and the tick loop
//! drains it at the start of each tick, so all simulation work happens on
//! one task.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::game::actions::{self, ActionError, CommandAck};
use crate::game::input::{PlayerCommand, QueuedCommand};
use crate::game::snapshot::{DeltaTracker, RoomSnapshot};
use crate::game::state::{PlayerId, RoomState};
use crate::game::tick::{self, RoomConfig};
use crate::game::MapLayout;
use crate::net::protocol::ServerMessage;

/// Commands buffered between ticks before producers are pushed back.
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Unique room identifier (UUID as bytes).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct RoomId(pub [u8; 16]);

impl RoomId {
    /// Generate a fresh random id.
    pub fn random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }
}

/// Room-level failures.
#[derive(Debug, Error)]
pub enum RoomError {
    /// The engine rejected the underlying action
    #[error("action rejected: {0}")]
    Action(#[from] ActionError),
    /// The command queue is full; the client is sending faster than one
    /// tick can drain
    #[error("command queue full")]
    Backpressure,
    /// The room has shut down
    #[error("room is closed")]
    Closed,
}

/// State behind the room mutex.
struct RoomInner {
    state: RoomState,
    tracker: DeltaTracker,
    sessions: BTreeMap<PlayerId, mpsc::Sender<ServerMessage>>,
    command_rx: mpsc::Receiver<QueuedCommand>,
}

/// A running game room: state, sessions, and the command queue feeding
/// the tick loop.
pub struct Room {
    /// Room identifier
    pub id: RoomId,
    /// Tuning this room was created with
    pub config: RoomConfig,
    command_tx: mpsc::Sender<QueuedCommand>,
    shutdown_tx: watch::Sender<bool>,
    inner: Mutex<RoomInner>,
}

impl Room {
    /// Create a room over the default map.
    pub fn new(id: RoomId, config: RoomConfig) -> Arc<Self> {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (shutdown_tx, _) = watch::channel(false);
        info!(room = %id.to_uuid_string(), tick_rate = config.tick_rate, "room created");
        Arc::new(Self {
            id,
            config,
            command_tx,
            shutdown_tx,
            inner: Mutex::new(RoomInner {
                state: RoomState::new(MapLayout::dust()),
                tracker: DeltaTracker::new(),
                sessions: BTreeMap::new(),
                command_rx,
            }),
        })
    }

    /// Add a player and their outbound channel. Sends `Welcome` and a
    /// full snapshot on success.
    pub async fn join(
        &self,
        player: PlayerId,
        name: String,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        let team = actions::add_player(&mut inner.state, &self.config, player, name)?;
        debug!(
            room = %self.id.to_uuid_string(),
            player = %player.to_uuid_string(),
            team = ?team,
            "player joined"
        );

        let welcome = ServerMessage::Welcome {
            player_id: player,
            room_id: self.id,
            tick_rate: self.config.tick_rate,
            map_name: inner.state.map.name.to_string(),
        };
        let full = ServerMessage::FullState(RoomSnapshot::capture(&inner.state));
        if sender.try_send(welcome).is_err() || sender.try_send(full).is_err() {
            warn!(player = %player.to_uuid_string(), "join handshake dropped, channel full");
        }
        inner.sessions.insert(player, sender);
        Ok(())
    }

    /// Drop a player's session. The entity leaves the simulation at the
    /// next tick boundary.
    pub async fn leave(&self, player: PlayerId) {
        let mut inner = self.inner.lock().await;
        if inner.sessions.remove(&player).is_some() {
            actions::queue_removal(&mut inner.state, player);
            debug!(
                room = %self.id.to_uuid_string(),
                player = %player.to_uuid_string(),
                "player leaving"
            );
        }
    }

    /// Queue a command for the next tick. Never blocks; a full queue
    /// pushes back on the sender instead of stalling the room.
    pub fn queue_command(&self, player: PlayerId, command: PlayerCommand) -> Result<(), RoomError> {
        if *self.shutdown_tx.borrow() {
            return Err(RoomError::Closed);
        }
        self.command_tx
            .try_send(QueuedCommand { player, command })
            .map_err(|_| RoomError::Backpressure)
    }

    /// Run one tick: drain the command queue, advance the simulation, and
    /// broadcast the resulting delta.
    pub async fn run_tick(&self) {
        let mut guard = self.inner.lock().await;
        let RoomInner {
            state,
            tracker,
            sessions,
            command_rx,
        } = &mut *guard;

        while let Ok(queued) = command_rx.try_recv() {
            let ack = actions::dispatch(state, &self.config, queued.player, &queued.command);
            let reply = match ack {
                Ok(CommandAck::Move(ack)) => Some(ServerMessage::MoveAck {
                    seq: ack.seq,
                    position: ack.position,
                }),
                Ok(_) => None,
                Err(error) => Some(ServerMessage::ActionRejected { error }),
            };
            if let Some(reply) = reply {
                if let Some(sender) = sessions.get(&queued.player) {
                    let _ = sender.try_send(reply);
                }
            }
        }

        let summary = tick::advance(state, &self.config);
        let delta = tracker.delta(state, summary.events);
        let message = ServerMessage::Delta(Box::new(delta));

        let mut closed = Vec::new();
        sessions.retain(|id, sender| match sender.try_send(message.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                // A slow consumer skips a delta; the next one still diffs
                // against what the server sent, not what the client saw.
                warn!(player = %id.to_uuid_string(), "delta dropped, channel full");
                true
            }
            Err(TrySendError::Closed(_)) => {
                closed.push(*id);
                false
            }
        });
        for id in closed {
            actions::queue_removal(state, id);
        }
    }

    /// Number of connected sessions.
    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    /// Stop the tick loop and refuse further commands.
    pub fn shutdown(&self) {
        info!(room = %self.id.to_uuid_string(), "room shutting down");
        let _ = self.shutdown_tx.send(true);
    }

    /// A receiver that resolves when [`Room::shutdown`] is called.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}

// =============================================================================
// TESTS
// =============================================================================
