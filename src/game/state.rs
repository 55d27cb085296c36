//! Room State Definitions
//!
//! Authoritative per-room state: players, pooled bullets, grenade effects,
//! bomb and round sub-state. Players live in a BTreeMap so iteration order
//! is stable across ticks. A `RoomState` is owned by exactly one tick loop
//! and never shared mutably.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::grid::SpatialGrid;
use crate::core::pool::{ObjectPool, Poolable};
use crate::core::vec2::Vec2;
use crate::game::bomb::BombState;
use crate::game::economy::{
    apply_money, kill_reward, EconomyConfig, RoundWinReason, GRENADE_KILL_REWARD,
};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::map::MapLayout;
use crate::game::weapons::{GrenadeKind, WeaponId};
use crate::PLAYER_RADIUS;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier (UUID as bytes).
///
/// Implements Ord for stable BTreeMap ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random id.
    pub fn random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }
}

// =============================================================================
// TEAMS
// =============================================================================

/// The two sides of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    /// Counter-terrorists (defenders)
    Ct,
    /// Terrorists (attackers)
    T,
}

impl Team {
    /// The opposing team.
    pub fn opponent(self) -> Team {
        match self {
            Team::Ct => Team::T,
            Team::T => Team::Ct,
        }
    }
}

/// Which weapon a player is holding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponSlot {
    /// Primary (rifle/SMG/sniper)
    Primary,
    /// Sidearm
    #[default]
    Secondary,
    /// Knife
    Knife,
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// Magazine and reserve for one weapon.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmmoState {
    /// Rounds in the magazine
    pub clip: u16,
    /// Rounds held in reserve
    pub reserve: u16,
}

impl AmmoState {
    /// Full load for a weapon.
    pub fn full(weapon: WeaponId) -> Self {
        let def = weapon.def();
        Self {
            clip: def.clip_size,
            reserve: def.reserve_ammo,
        }
    }
}

/// Carried grenades, capped per type at purchase time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrenadeCounts {
    /// HE grenades
    pub he: u8,
    /// Smoke grenades
    pub smoke: u8,
    /// Flashbangs
    pub flash: u8,
}

impl GrenadeCounts {
    /// Count for one grenade type.
    pub fn get(&self, kind: GrenadeKind) -> u8 {
        match kind {
            GrenadeKind::He => self.he,
            GrenadeKind::Smoke => self.smoke,
            GrenadeKind::Flash => self.flash,
        }
    }

    /// Mutable count for one grenade type.
    pub fn get_mut(&mut self, kind: GrenadeKind) -> &mut u8 {
        match kind {
            GrenadeKind::He => &mut self.he,
            GrenadeKind::Smoke => &mut self.smoke,
            GrenadeKind::Flash => &mut self.flash,
        }
    }
}

/// State of a single player in the room.
#[derive(Clone, Debug)]
pub struct PlayerState {
    /// Unique player ID
    pub id: PlayerId,

    /// Display name
    pub name: String,

    /// Current team
    pub team: Team,

    /// Current position
    pub position: Vec2,

    /// Aim direction in radians
    pub aim_angle: f32,

    /// Health (0-100)
    pub health: i32,

    /// Armor (0-100)
    pub armor: i32,

    /// Helmet from the kevlar upgrade; loadout state shown to clients,
    /// damage resolution uses the armor value alone
    pub has_helmet: bool,

    /// Alive this round
    pub alive: bool,

    /// Cash on hand
    pub money: i32,

    /// Purchased primary weapon
    pub primary: Option<WeaponId>,

    /// Sidearm (always present)
    pub secondary: WeaponId,

    /// Currently equipped slot
    pub slot: WeaponSlot,

    /// Primary weapon ammo
    pub primary_ammo: AmmoState,

    /// Sidearm ammo
    pub secondary_ammo: AmmoState,

    /// Carried grenades
    pub grenades: GrenadeCounts,

    /// Carrying a defuse kit
    pub has_defuse_kit: bool,

    /// Walking (silent, slower) per last movement input
    pub walking: bool,

    /// Crouching per last movement input
    pub crouching: bool,

    /// Highest input sequence applied so far
    pub last_input_seq: u32,

    /// Server clock (ms) of the last shot, if any this round
    pub last_shot_ms: Option<u64>,

    /// Server clock (ms) when an in-progress reload completes
    pub reload_end_ms: Option<u64>,

    /// Server clock (ms) until which the player is flash-blinded
    pub blinded_until_ms: u64,

    /// Kills this match
    pub kills: u32,

    /// Deaths this match
    pub deaths: u32,

    /// Rolling position history for lag compensation: (server ms, position)
    pub history: VecDeque<(u64, Vec2)>,
}

impl PlayerState {
    /// Create a new player at a spawn position.
    pub fn new(id: PlayerId, name: String, team: Team, position: Vec2, starting_money: i32) -> Self {
        let secondary = match team {
            Team::Ct => WeaponId::Usp,
            Team::T => WeaponId::Glock,
        };
        Self {
            id,
            name,
            team,
            position,
            aim_angle: 0.0,
            health: 100,
            armor: 0,
            has_helmet: false,
            alive: true,
            money: starting_money,
            primary: None,
            secondary,
            slot: WeaponSlot::Secondary,
            primary_ammo: AmmoState::default(),
            secondary_ammo: AmmoState::full(secondary),
            grenades: GrenadeCounts::default(),
            has_defuse_kit: false,
            walking: false,
            crouching: false,
            last_input_seq: 0,
            last_shot_ms: None,
            reload_end_ms: None,
            blinded_until_ms: 0,
            kills: 0,
            deaths: 0,
            history: VecDeque::new(),
        }
    }

    /// The weapon currently in hand.
    pub fn equipped(&self) -> WeaponId {
        match self.slot {
            WeaponSlot::Knife => WeaponId::Knife,
            WeaponSlot::Secondary => self.secondary,
            WeaponSlot::Primary => self.primary.unwrap_or(self.secondary),
        }
    }

    /// Ammo for the equipped weapon (None for the knife).
    pub fn equipped_ammo(&self) -> Option<&AmmoState> {
        match self.slot {
            WeaponSlot::Knife => None,
            WeaponSlot::Secondary => Some(&self.secondary_ammo),
            WeaponSlot::Primary => {
                if self.primary.is_some() {
                    Some(&self.primary_ammo)
                } else {
                    Some(&self.secondary_ammo)
                }
            }
        }
    }

    /// Mutable ammo for the equipped weapon (None for the knife).
    pub fn equipped_ammo_mut(&mut self) -> Option<&mut AmmoState> {
        match self.slot {
            WeaponSlot::Knife => None,
            WeaponSlot::Secondary => Some(&mut self.secondary_ammo),
            WeaponSlot::Primary => {
                if self.primary.is_some() {
                    Some(&mut self.primary_ammo)
                } else {
                    Some(&mut self.secondary_ammo)
                }
            }
        }
    }

    /// Reloading at the given server time.
    pub fn is_reloading(&self, now_ms: u64) -> bool {
        self.reload_end_ms.is_some_and(|end| now_ms < end)
    }

    /// Apply a resolved damage result. Returns true if this killed the
    /// player.
    pub fn take_damage(&mut self, health_damage: i32, armor_absorbed: i32) -> bool {
        self.armor = (self.armor - armor_absorbed).max(0);
        self.health -= health_damage;
        if self.health <= 0 {
            self.health = 0;
            self.alive = false;
            return true;
        }
        false
    }

    /// Record the current position into the lag-compensation buffer and
    /// evict entries older than the retention window.
    pub fn record_history(&mut self, now_ms: u64, retention_ms: u64) {
        self.history.push_back((now_ms, self.position));
        while let Some(&(ts, _)) = self.history.front() {
            if now_ms.saturating_sub(ts) > retention_ms {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Position at a past server time, from the history buffer. Falls back
    /// to the oldest known entry, then the live position.
    pub fn position_at(&self, ts_ms: u64) -> Vec2 {
        let mut best: Option<Vec2> = None;
        for &(ts, pos) in &self.history {
            if ts <= ts_ms {
                best = Some(pos);
            } else {
                break;
            }
        }
        best.or_else(|| self.history.front().map(|&(_, pos)| pos))
            .unwrap_or(self.position)
    }

    /// Reset for a new round: respawn, refill health, clear transient
    /// combat state. Money, armor, kit and bought weapons persist.
    pub fn reset_for_round(&mut self, position: Vec2) {
        self.position = position;
        self.health = 100;
        self.alive = true;
        self.walking = false;
        self.crouching = false;
        self.reload_end_ms = None;
        self.blinded_until_ms = 0;
        self.last_shot_ms = None;
        self.history.clear();
    }
}

// =============================================================================
// BULLETS
// =============================================================================

/// A pooled tracer projectile.
///
/// Authoritative damage is resolved at fire time; tracers exist so clients
/// can render in-flight shots, and expire on walls or range.
#[derive(Clone, Debug, Default)]
pub struct BulletState {
    /// Current position
    pub position: Vec2,
    /// Velocity (units/second)
    pub velocity: Vec2,
    /// Shooter
    pub owner: PlayerId,
    /// Weapon that fired it
    pub weapon: WeaponId,
    /// Distance travelled so far
    pub traveled: f32,
    /// Distance budget before expiry
    pub max_distance: f32,
}

impl Poolable for BulletState {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

// =============================================================================
// GRENADE EFFECTS
// =============================================================================

/// An in-flight grenade.
#[derive(Clone, Debug)]
pub struct GrenadeProjectile {
    /// Grenade type
    pub kind: GrenadeKind,
    /// Current position
    pub position: Vec2,
    /// Velocity (units/second)
    pub velocity: Vec2,
    /// Seconds until detonation
    pub fuse: f32,
    /// Thrower
    pub thrower: PlayerId,
}

/// An active smoke screen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SmokeCloud {
    /// Cloud center
    pub position: Vec2,
    /// Cloud radius
    pub radius: f32,
    /// Seconds remaining
    pub remaining: f32,
}

// =============================================================================
// ROUND & SCORES
// =============================================================================

/// Round state machine phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Waiting for both teams to have players
    Warmup,
    /// Buy window; round timer not yet running
    Freeze,
    /// Round in progress
    Live,
    /// Round decided, short pause before the next
    RoundEnd,
    /// Match over
    MatchEnd,
}

/// Per-team match score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamScore {
    /// Rounds won
    pub rounds_won: u16,
    /// Consecutive rounds lost (resets on a win)
    pub loss_streak: u32,
}

/// Scores for both teams.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    /// CT score
    pub ct: TeamScore,
    /// T score
    pub t: TeamScore,
}

impl Scores {
    /// Score entry for a team.
    pub fn team(&self, team: Team) -> &TeamScore {
        match team {
            Team::Ct => &self.ct,
            Team::T => &self.t,
        }
    }

    /// Mutable score entry for a team.
    pub fn team_mut(&mut self, team: Team) -> &mut TeamScore {
        match team {
            Team::Ct => &mut self.ct,
            Team::T => &mut self.t,
        }
    }
}

/// Kill attribution for an elimination.
#[derive(Clone, Copy, Debug)]
pub struct KillCredit {
    /// Killer
    pub killer: PlayerId,
    /// Weapon used, None for grenade kills
    pub weapon: Option<WeaponId>,
    /// Headshot kill
    pub headshot: bool,
}

// =============================================================================
// ROOM STATE
// =============================================================================

/// Authoritative state of one room.
pub struct RoomState {
    /// Static map geometry
    pub map: MapLayout,

    /// All players, keyed by id
    pub players: BTreeMap<PlayerId, PlayerState>,

    /// Active tracer bullets
    pub bullets: ObjectPool<BulletState>,

    /// In-flight grenades
    pub grenades: Vec<GrenadeProjectile>,

    /// Active smoke screens
    pub smokes: Vec<SmokeCloud>,

    /// Bomb sub-state
    pub bomb: BombState,

    /// Current round phase
    pub phase: RoundPhase,

    /// Seconds left in the current phase (freeze/live/round_end)
    pub phase_time_left: f32,

    /// Round number (1-based once play starts)
    pub round_number: u16,

    /// Match scores
    pub scores: Scores,

    /// Monotonic tick counter
    pub tick: u64,

    /// Server clock in milliseconds, advanced by the tick loop
    pub clock_ms: u64,

    /// Spatial index over alive players
    pub grid: SpatialGrid<PlayerId>,

    /// Events emitted since the last drain
    pub pending_events: Vec<GameEvent>,

    /// Disconnects deferred to the next tick boundary
    pub pending_removals: Vec<PlayerId>,

    /// Round outcome recorded while Live, consumed by the phase machine
    pub round_outcome: Option<(Team, RoundWinReason)>,

    /// Round-robin spawn cursors (ct, t)
    pub spawn_cursor: (usize, usize),
}

impl RoomState {
    /// Create an empty room over a map.
    pub fn new(map: MapLayout) -> Self {
        let cell_size = SpatialGrid::<PlayerId>::suggest_cell_size(PLAYER_RADIUS * 2.0);
        Self {
            map,
            players: BTreeMap::new(),
            bullets: ObjectPool::new(32, 256),
            grenades: Vec::new(),
            smokes: Vec::new(),
            bomb: BombState::Idle,
            phase: RoundPhase::Warmup,
            phase_time_left: 0.0,
            round_number: 0,
            scores: Scores::default(),
            tick: 0,
            clock_ms: 0,
            grid: SpatialGrid::new(cell_size),
            pending_events: Vec::new(),
            pending_removals: Vec::new(),
            round_outcome: None,
            spawn_cursor: (0, 0),
        }
    }

    /// Number of players on a team.
    pub fn team_count(&self, team: Team) -> usize {
        self.players.values().filter(|p| p.team == team).count()
    }

    /// Number of alive players on a team.
    pub fn alive_count(&self, team: Team) -> usize {
        self.players
            .values()
            .filter(|p| p.team == team && p.alive)
            .count()
    }

    /// The current bomb carrier, if the bomb is being carried.
    pub fn bomb_carrier(&self) -> Option<PlayerId> {
        match self.bomb {
            BombState::Carried { carrier } => Some(carrier),
            _ => None,
        }
    }

    /// Queue an event for this tick.
    pub fn push_event(&mut self, data: GameEventData) {
        self.pending_events.push(GameEvent::new(self.tick, data));
    }

    /// Drain events accumulated since the last call.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Next spawn position for a team, advancing the round-robin cursor.
    pub fn next_spawn(&mut self, team: Team) -> Vec2 {
        let (ct_cursor, t_cursor) = &mut self.spawn_cursor;
        match team {
            Team::Ct => {
                let pos = self.map.spawn_for(true, *ct_cursor);
                *ct_cursor += 1;
                pos
            }
            Team::T => {
                let pos = self.map.spawn_for(false, *t_cursor);
                *t_cursor += 1;
                pos
            }
        }
    }

    /// Kill a player, credit the killer, drop or recover the bomb, and emit
    /// the kill event. `credit` is None for world/bomb deaths.
    pub fn eliminate(
        &mut self,
        victim_id: PlayerId,
        credit: Option<KillCredit>,
        economy: &EconomyConfig,
    ) {
        let Some(victim) = self.players.get_mut(&victim_id) else {
            return;
        };
        let victim_team = victim.team;
        let victim_pos = victim.position;
        victim.alive = false;
        victim.health = 0;
        victim.deaths += 1;
        victim.reload_end_ms = None;
        self.grid.remove(victim_id);

        // Kill credit in a separate borrow.
        if let Some(credit) = credit {
            if let Some(killer) = self.players.get_mut(&credit.killer) {
                let delta = if killer.team == victim_team {
                    economy.team_kill_penalty
                } else {
                    killer.kills += 1;
                    credit.weapon.map(kill_reward).unwrap_or(GRENADE_KILL_REWARD)
                };
                apply_money(&mut killer.money, delta, economy.max_money);
            }
        }

        // The bomb never dies with its holder.
        match self.bomb {
            BombState::Carried { carrier } if carrier == victim_id => {
                self.bomb = BombState::Dropped {
                    position: victim_pos,
                };
            }
            BombState::Planting { planter, position, .. } if planter == victim_id => {
                debug!(player = %victim_id.to_uuid_string(), "plant interrupted by death");
                self.bomb = BombState::Dropped { position };
                self.push_event(GameEventData::BombPlantCancelled {
                    player_id: victim_id,
                });
            }
            BombState::Defusing {
                defuser,
                position,
                site,
                time_left,
                planter,
                ..
            } if defuser == victim_id => {
                debug!(player = %victim_id.to_uuid_string(), "defuse interrupted by death");
                self.bomb = BombState::Planted {
                    position,
                    site,
                    time_left,
                    planter,
                };
                self.push_event(GameEventData::BombDefuseCancelled {
                    player_id: victim_id,
                });
            }
            _ => {}
        }

        self.push_event(GameEventData::PlayerKilled {
            victim: victim_id,
            killer: credit.map(|c| c.killer),
            weapon: credit.and_then(|c| c.weapon),
            headshot: credit.map(|c| c.headshot).unwrap_or(false),
        });
    }
}

// =============================================================================
// TESTS
// =============================================================================
