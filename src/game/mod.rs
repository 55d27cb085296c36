//! Game Simulation
//!
//! Authoritative match simulation: weapons and damage, the round economy,
//! map geometry, per-room state, command validation, the bomb state
//! machine, tick advancement and wire snapshots. Everything in this module
//! is synchronous and runtime-free; the net layer drives it.

pub mod actions;
pub mod bomb;
pub mod economy;
pub mod events;
pub mod input;
pub mod map;
pub mod snapshot;
pub mod state;
pub mod tick;
pub mod weapons;

pub use actions::{ActionError, CommandAck, MoveResult, ShootResult};
pub use bomb::BombState;
pub use economy::{EconomyConfig, RoundWinReason};
pub use events::{GameEvent, GameEventData};
pub use input::{MoveInput, PlayerCommand, QueuedCommand};
pub use map::{MapLayout, SiteId};
pub use snapshot::{DeltaTracker, RoomSnapshot, StateDelta};
pub use state::{PlayerId, PlayerState, RoomState, RoundPhase, Team};
pub use tick::{advance, RoomConfig, TickSummary};
pub use weapons::{calculate_damage, BuyItem, GrenadeKind, WeaponId};
