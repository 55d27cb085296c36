//! Game Events
//!
//! Events generated during simulation, carried into state deltas so
//! clients can play back what happened inside a tick.

use serde::{Deserialize, Serialize};

use crate::core::vec2::Vec2;
use crate::game::economy::RoundWinReason;
use crate::game::map::SiteId;
use crate::game::state::{PlayerId, Team};
use crate::game::weapons::{BuyItem, GrenadeKind, WeaponId};

/// Event payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEventData {
    /// A player joined the room
    PlayerJoined {
        /// New player
        player_id: PlayerId,
        /// Assigned team
        team: Team,
    },

    /// A player left the room
    PlayerLeft {
        /// Departed player
        player_id: PlayerId,
    },

    /// A player switched teams
    TeamChanged {
        /// Player
        player_id: PlayerId,
        /// New team
        team: Team,
    },

    /// A shot connected
    PlayerHit {
        /// Shooter
        attacker: PlayerId,
        /// Target
        victim: PlayerId,
        /// Weapon used
        weapon: WeaponId,
        /// Health damage dealt
        damage: i32,
        /// Whether the hit was a headshot
        headshot: bool,
        /// Victim health after the hit
        remaining_health: i32,
    },

    /// A player died
    PlayerKilled {
        /// Victim
        victim: PlayerId,
        /// Killer, if any (None for bomb/world deaths)
        killer: Option<PlayerId>,
        /// Weapon used, if any
        weapon: Option<WeaponId>,
        /// Whether the killing blow was a headshot
        headshot: bool,
    },

    /// A purchase completed
    ItemPurchased {
        /// Buyer
        player_id: PlayerId,
        /// What was bought
        item: BuyItem,
        /// Money remaining after the purchase
        money_left: i32,
    },

    /// A grenade was thrown
    GrenadeThrown {
        /// Thrower
        player_id: PlayerId,
        /// Grenade type
        kind: GrenadeKind,
    },

    /// A grenade detonated
    GrenadeDetonated {
        /// Grenade type
        kind: GrenadeKind,
        /// Detonation point
        position: Vec2,
    },

    /// Bomb plant started
    BombPlantStarted {
        /// Planter
        player_id: PlayerId,
        /// Target site
        site: SiteId,
    },

    /// Bomb plant was interrupted
    BombPlantCancelled {
        /// Planter
        player_id: PlayerId,
    },

    /// The bomb is armed
    BombPlanted {
        /// Planter
        player_id: PlayerId,
        /// Site
        site: SiteId,
        /// Seconds until detonation
        time_left: f32,
    },

    /// Defuse attempt started
    BombDefuseStarted {
        /// Defuser
        player_id: PlayerId,
        /// Carrying a defuse kit
        has_kit: bool,
    },

    /// Defuse attempt was interrupted; progress is lost
    BombDefuseCancelled {
        /// Defuser
        player_id: PlayerId,
    },

    /// The bomb was defused
    BombDefused {
        /// Defuser
        player_id: PlayerId,
    },

    /// The bomb detonated
    BombExploded {
        /// Detonation point
        position: Vec2,
    },

    /// A new round began
    RoundStarted {
        /// Round number (1-based)
        round: u16,
    },

    /// A round ended
    RoundEnded {
        /// Winning team
        winner: Team,
        /// Why the round ended
        reason: RoundWinReason,
        /// CT rounds won so far
        score_ct: u16,
        /// T rounds won so far
        score_t: u16,
    },

    /// The match is over
    MatchEnded {
        /// Winning team, None on a draw
        winner: Option<Team>,
        /// Final CT score
        score_ct: u16,
        /// Final T score
        score_t: u16,
    },
}

/// A game event with the tick it occurred on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when the event occurred
    pub tick: u64,
    /// Event payload
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u64, data: GameEventData) -> Self {
        Self { tick, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = GameEvent::new(
            42,
            GameEventData::RoundStarted { round: 3 },
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"round_started\""));
        assert!(json.contains("\"tick\":42"));
    }
}
