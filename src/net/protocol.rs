//! Protocol Messages
//!
//! Wire format for client-server communication. Messages serialize as
//! tagged JSON for debugging ease; flat payload structs also round-trip
//! through bincode for bandwidth-sensitive paths.

use serde::{Deserialize, Serialize};

use crate::game::actions::ActionError;
use crate::game::input::{MoveInput, PlayerCommand};
use crate::game::snapshot::{RoomSnapshot, StateDelta};
use crate::game::state::{PlayerId, Team, WeaponSlot};
use crate::game::weapons::{BuyItem, GrenadeKind};
use crate::core::vec2::Vec2;
use crate::net::room::RoomId;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the room with a display name.
    Join {
        /// Display name
        name: String,
    },

    /// Sequence-numbered movement input.
    Move(MoveInput),

    /// Fire the equipped weapon.
    Shoot {
        /// Aim direction in radians
        angle: f32,
        /// Client wall-clock (ms) when the shot was taken
        client_timestamp: u64,
    },

    /// Start reloading.
    Reload,

    /// Buy an item during the buy window.
    Buy {
        /// What to buy
        item: BuyItem,
    },

    /// Switch the equipped weapon slot.
    SwitchSlot {
        /// Target slot
        slot: WeaponSlot,
    },

    /// Begin planting the bomb.
    PlantBomb,

    /// Start or stop defusing.
    DefuseBomb {
        /// Whether the defuse key is held
        active: bool,
    },

    /// Throw a carried grenade.
    ThrowGrenade {
        /// Grenade type
        kind: GrenadeKind,
        /// Throw direction in radians
        angle: f32,
    },

    /// Switch teams.
    ChangeTeam {
        /// Target team
        team: Team,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back
        timestamp: u64,
    },

    /// Leave the room.
    Leave,
}

impl ClientMessage {
    /// The engine command this message maps to, if it is one.
    ///
    /// `Join`, `Ping` and `Leave` are session concerns handled before the
    /// command queue and return None.
    pub fn into_command(self) -> Option<PlayerCommand> {
        match self {
            ClientMessage::Move(input) => Some(PlayerCommand::Move(input)),
            ClientMessage::Shoot {
                angle,
                client_timestamp,
            } => Some(PlayerCommand::Shoot {
                angle,
                client_timestamp,
            }),
            ClientMessage::Reload => Some(PlayerCommand::Reload),
            ClientMessage::Buy { item } => Some(PlayerCommand::Buy(item)),
            ClientMessage::SwitchSlot { slot } => Some(PlayerCommand::SwitchSlot(slot)),
            ClientMessage::PlantBomb => Some(PlayerCommand::PlantBomb),
            ClientMessage::DefuseBomb { active } => Some(PlayerCommand::DefuseBomb { active }),
            ClientMessage::ThrowGrenade { kind, angle } => {
                Some(PlayerCommand::ThrowGrenade { kind, angle })
            }
            ClientMessage::ChangeTeam { team } => Some(PlayerCommand::ChangeTeam(team)),
            ClientMessage::Join { .. } | ClientMessage::Ping { .. } | ClientMessage::Leave => None,
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after a successful join.
    Welcome {
        /// Assigned player id
        player_id: PlayerId,
        /// Room the player landed in
        room_id: RoomId,
        /// Simulation rate in Hz
        tick_rate: u32,
        /// Map name
        map_name: String,
    },

    /// Complete room state, sent after Welcome and on resync.
    FullState(RoomSnapshot),

    /// Per-tick diff against the previous broadcast.
    Delta(Box<StateDelta>),

    /// Authoritative position for an applied movement input.
    MoveAck {
        /// Acknowledged input sequence
        seq: u32,
        /// Authoritative position
        position: Vec2,
    },

    /// A command was rejected.
    ActionRejected {
        /// Why it was rejected
        error: ActionError,
    },

    /// Ping response.
    Pong {
        /// Echoed client timestamp
        timestamp: u64,
        /// Server clock (ms) at receipt
        server_time: u64,
    },

    /// The room is shutting down or the player was removed.
    Closed,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Serialize a flat payload (inputs, snapshots) to bincode.
///
/// Tagged enums like [`ClientMessage`] do not round-trip through bincode;
/// use JSON for the envelope and bincode for payload structs only.
pub fn payload_to_bytes<T: Serialize>(payload: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(payload)
}

/// Deserialize a flat payload from bincode.
pub fn payload_from_bytes<'a, T: Deserialize<'a>>(data: &'a [u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(data)
}

// =============================================================================
// TESTS
// =============================================================================
