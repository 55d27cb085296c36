//! Player Commands
//!
//! Closed set of inbound actions, decoded once at the transport boundary.
//! The engine dispatches over this enum, so every action path is checked
//! at compile time instead of branching over stringly-typed payloads.

use serde::{Deserialize, Serialize};

use crate::game::state::{PlayerId, Team, WeaponSlot};
use crate::game::weapons::{BuyItem, GrenadeKind};

/// One movement input from a client.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveInput {
    /// Client-side sequence number (monotonically increasing)
    pub seq: u32,
    /// Requested X delta (world units)
    pub dx: f32,
    /// Requested Y delta (world units)
    pub dy: f32,
    /// New aim direction in radians
    pub aim_angle: f32,
    /// Walking (silent, slower)
    pub walk: bool,
    /// Crouching
    pub crouch: bool,
}

/// A validated player action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PlayerCommand {
    /// Move by a delta
    Move(MoveInput),
    /// Fire the equipped weapon
    Shoot {
        /// Aim direction in radians
        angle: f32,
        /// Client wall-clock (ms) when the shot was taken, for lag
        /// compensation
        client_timestamp: u64,
    },
    /// Start reloading
    Reload,
    /// Buy an item during the buy window
    Buy(BuyItem),
    /// Switch the equipped weapon slot
    SwitchSlot(WeaponSlot),
    /// Begin planting the bomb
    PlantBomb,
    /// Start (`true`) or stop (`false`) defusing
    DefuseBomb {
        /// Whether the defuse key is held
        active: bool,
    },
    /// Throw a carried grenade
    ThrowGrenade {
        /// Grenade type
        kind: GrenadeKind,
        /// Throw direction in radians
        angle: f32,
    },
    /// Switch teams
    ChangeTeam(Team),
}

/// A command queued for a room, tagged with its sender.
#[derive(Clone, Debug)]
pub struct QueuedCommand {
    /// Sending player
    pub player: PlayerId,
    /// The action
    pub command: PlayerCommand,
}
