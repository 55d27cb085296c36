//! Tick Advancement
//!
//! One call to [`advance`] moves a room forward by exactly one tick:
//! reloads finish, projectiles fly, the bomb progresses, the round phase
//! machine steps, and position history is recorded. The tick loop in the
//! net layer owns the cadence; this module owns the semantics, so every
//! test can drive a room tick by tick with no runtime involved.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::game::actions;
use crate::game::bomb::{tick_bomb, BombState};
use crate::game::economy::{apply_money, EconomyConfig, RoundWinReason};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::state::{
    AmmoState, KillCredit, PlayerId, RoomState, RoundPhase, SmokeCloud, Team, WeaponSlot,
};
use crate::game::weapons::GrenadeKind;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Bomb timings and blast tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BombConfig {
    /// Seconds to plant
    pub plant_time: f32,
    /// Seconds from plant to detonation
    pub timer: f32,
    /// Seconds to defuse bare-handed
    pub defuse_time: f32,
    /// Seconds to defuse with a kit
    pub defuse_time_kit: f32,
    /// Blast radius (world units)
    pub explosion_radius: f32,
    /// Damage at the blast center, falling linearly to zero at the edge
    pub explosion_damage: f32,
    /// Maximum distance from the bomb at which a defuse counts
    pub defuse_range: f32,
}

impl Default for BombConfig {
    fn default() -> Self {
        Self {
            plant_time: 3.0,
            timer: 45.0,
            defuse_time: 10.0,
            defuse_time_kit: 5.0,
            explosion_radius: 500.0,
            explosion_damage: 500.0,
            defuse_range: 50.0,
        }
    }
}

/// Per-room tuning. Deserializable so operators can override defaults per
/// room at creation time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Simulation rate in ticks per second
    pub tick_rate: u32,
    /// Maximum players in the room
    pub max_players: usize,
    /// Buy window length in seconds
    pub freeze_time: f32,
    /// Round length in seconds
    pub round_time: f32,
    /// Pause between round end and the next freeze, in seconds
    pub round_end_time: f32,
    /// Rounds needed to win the match
    pub rounds_to_win: u16,
    /// Hard cap on rounds played
    pub max_rounds: u16,
    /// Lag-compensation history retention in seconds
    pub history_secs: f32,
    /// Player collision radius
    pub player_radius: f32,
    /// Minimum center distance between two players
    pub min_separation: f32,
    /// Bomb timings
    pub bomb: BombConfig,
    /// Economy constants
    pub economy: EconomyConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            tick_rate: crate::DEFAULT_TICK_RATE,
            max_players: 10,
            freeze_time: 15.0,
            round_time: 115.0,
            round_end_time: 5.0,
            rounds_to_win: 16,
            max_rounds: 30,
            history_secs: 2.0,
            player_radius: crate::PLAYER_RADIUS,
            min_separation: 25.0,
            bomb: BombConfig::default(),
            economy: EconomyConfig::default(),
        }
    }
}

impl RoomConfig {
    /// Seconds per tick. A zero rate is treated as 1 Hz.
    #[inline]
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    /// Milliseconds per tick. A zero rate is treated as 1 Hz.
    #[inline]
    pub fn tick_ms(&self) -> u64 {
        (1000.0 / self.tick_rate.max(1) as f64) as u64
    }

    /// Lag-compensation retention window in milliseconds.
    #[inline]
    pub fn history_ms(&self) -> u64 {
        (self.history_secs * 1000.0) as u64
    }
}

/// What one tick produced, for the broadcast path.
#[derive(Clone, Debug)]
pub struct TickSummary {
    /// Tick that just completed
    pub tick: u64,
    /// Events emitted during the tick
    pub events: Vec<GameEvent>,
}

// =============================================================================
// TICK
// =============================================================================

/// Advance the room by one tick.
pub fn advance(room: &mut RoomState, cfg: &RoomConfig) -> TickSummary {
    actions::apply_removals(room);
    actions::finish_reloads(room);

    advance_bullets(room, cfg);
    advance_grenades(room, cfg);
    advance_smokes(room, cfg);
    tick_bomb(room, cfg);
    advance_phase(room, cfg);

    let now = room.clock_ms;
    let retention = cfg.history_ms();
    for player in room.players.values_mut() {
        if player.alive {
            player.record_history(now, retention);
        }
    }

    room.tick += 1;
    room.clock_ms += cfg.tick_ms();

    TickSummary {
        tick: room.tick,
        events: room.take_events(),
    }
}

/// Fly tracers forward and expire them on range or walls.
fn advance_bullets(room: &mut RoomState, cfg: &RoomConfig) {
    let dt = cfg.dt();
    let mut expired = Vec::new();
    for key in room.bullets.active_keys() {
        let Some(bullet) = room.bullets.get_mut(key) else {
            continue;
        };
        let step = bullet.velocity * dt;
        bullet.position = bullet.position + step;
        bullet.traveled += step.length();
        if bullet.traveled >= bullet.max_distance {
            expired.push(key);
        }
    }
    for key in expired {
        room.bullets.release(key);
    }
}

/// Fly grenades and detonate when the fuse runs out.
fn advance_grenades(room: &mut RoomState, cfg: &RoomConfig) {
    let dt = cfg.dt();
    let mut detonations = Vec::new();

    let mut i = 0;
    while i < room.grenades.len() {
        let grenade = &mut room.grenades[i];
        let next = grenade.position + grenade.velocity * dt;
        // Grenades stop against walls instead of passing through.
        if room.map.is_walkable(next, 1.0) {
            grenade.position = next;
        } else {
            grenade.velocity = crate::core::vec2::Vec2::ZERO;
        }
        grenade.fuse -= dt;
        if grenade.fuse <= 0.0 {
            let grenade = room.grenades.swap_remove(i);
            detonations.push(grenade);
        } else {
            i += 1;
        }
    }

    for grenade in detonations {
        detonate(room, cfg, grenade);
    }
}

fn detonate(room: &mut RoomState, cfg: &RoomConfig, grenade: crate::game::state::GrenadeProjectile) {
    let def = grenade.kind.def();
    let position = grenade.position;
    debug!(kind = ?grenade.kind, x = position.x, y = position.y, "grenade detonated");
    room.push_event(GameEventData::GrenadeDetonated {
        kind: grenade.kind,
        position,
    });

    match grenade.kind {
        GrenadeKind::He => {
            let victims: Vec<(PlayerId, f32)> = room
                .players
                .values()
                .filter(|p| p.alive)
                .map(|p| (p.id, p.position.distance(position)))
                .filter(|(_, dist)| *dist < def.outer_radius)
                .collect();
            for (id, dist) in victims {
                let scale = if dist <= def.inner_radius {
                    1.0
                } else {
                    1.0 - (dist - def.inner_radius) / (def.outer_radius - def.inner_radius)
                };
                let damage = (def.damage * scale).round() as i32;
                let killed = room
                    .players
                    .get_mut(&id)
                    .map(|p| p.take_damage(damage, 0))
                    .unwrap_or(false);
                if killed {
                    room.eliminate(
                        id,
                        Some(KillCredit {
                            killer: grenade.thrower,
                            weapon: None,
                            headshot: false,
                        }),
                        &cfg.economy,
                    );
                }
            }
        }
        GrenadeKind::Smoke => {
            room.smokes.push(SmokeCloud {
                position,
                radius: def.outer_radius,
                remaining: def.duration_secs,
            });
        }
        GrenadeKind::Flash => {
            let until = room.clock_ms + (def.duration_secs * 1000.0) as u64;
            for player in room.players.values_mut() {
                if player.alive && player.position.distance(position) < def.outer_radius {
                    player.blinded_until_ms = player.blinded_until_ms.max(until);
                }
            }
        }
    }
}

fn advance_smokes(room: &mut RoomState, cfg: &RoomConfig) {
    let dt = cfg.dt();
    for smoke in &mut room.smokes {
        smoke.remaining -= dt;
    }
    room.smokes.retain(|s| s.remaining > 0.0);
}

// =============================================================================
// ROUND PHASE MACHINE
// =============================================================================

fn advance_phase(room: &mut RoomState, cfg: &RoomConfig) {
    let dt = cfg.dt();
    match room.phase {
        RoundPhase::Warmup => {
            if room.team_count(Team::Ct) >= 1 && room.team_count(Team::T) >= 1 {
                start_round(room, cfg);
            }
        }

        RoundPhase::Freeze => {
            room.phase_time_left -= dt;
            if room.phase_time_left <= 0.0 {
                room.phase = RoundPhase::Live;
                room.phase_time_left = cfg.round_time;
                debug!(round = room.round_number, "round live");
            }
        }

        RoundPhase::Live => {
            room.phase_time_left -= dt;
            check_eliminations(room);
            check_time_expiry(room);
            if let Some((winner, reason)) = room.round_outcome.take() {
                end_round(room, cfg, winner, reason);
            }
        }

        RoundPhase::RoundEnd => {
            room.phase_time_left -= dt;
            if room.phase_time_left <= 0.0 {
                start_round(room, cfg);
            }
        }

        RoundPhase::MatchEnd => {}
    }
}

/// A live bomb keeps the round going even with a side wiped out.
fn bomb_is_live(bomb: &BombState) -> bool {
    matches!(
        bomb,
        BombState::Planting { .. } | BombState::Planted { .. } | BombState::Defusing { .. }
    )
}

fn check_eliminations(room: &mut RoomState) {
    if room.round_outcome.is_some() {
        return;
    }
    let ct_alive = room.alive_count(Team::Ct);
    let t_alive = room.alive_count(Team::T);
    if ct_alive == 0 {
        room.round_outcome = Some((Team::T, RoundWinReason::Elimination));
    } else if t_alive == 0 && !bomb_is_live(&room.bomb) {
        room.round_outcome = Some((Team::Ct, RoundWinReason::Elimination));
    }
}

fn check_time_expiry(room: &mut RoomState) {
    if room.round_outcome.is_some() || room.phase_time_left > 0.0 {
        return;
    }
    // With a bomb in play the bomb decides the round, not the clock.
    if !bomb_is_live(&room.bomb) {
        room.round_outcome = Some((Team::Ct, RoundWinReason::TimeExpired));
    }
}

fn end_round(room: &mut RoomState, cfg: &RoomConfig, winner: Team, reason: RoundWinReason) {
    let loser = winner.opponent();
    room.scores.team_mut(winner).rounds_won += 1;
    room.scores.team_mut(winner).loss_streak = 0;
    room.scores.team_mut(loser).loss_streak += 1;

    let win_bonus = cfg.economy.win_bonus(reason);
    let loss_bonus = cfg.economy.loss_bonus(room.scores.team(loser).loss_streak);
    for player in room.players.values_mut() {
        let delta = if player.team == winner {
            win_bonus
        } else {
            loss_bonus
        };
        apply_money(&mut player.money, delta, cfg.economy.max_money);
    }

    let score_ct = room.scores.ct.rounds_won;
    let score_t = room.scores.t.rounds_won;
    info!(
        round = room.round_number,
        winner = ?winner,
        reason = ?reason,
        score_ct,
        score_t,
        "round ended"
    );
    room.push_event(GameEventData::RoundEnded {
        winner,
        reason,
        score_ct,
        score_t,
    });

    let decided = score_ct >= cfg.rounds_to_win || score_t >= cfg.rounds_to_win;
    let exhausted = room.round_number >= cfg.max_rounds;
    if decided || exhausted {
        let match_winner = if score_ct > score_t {
            Some(Team::Ct)
        } else if score_t > score_ct {
            Some(Team::T)
        } else {
            None
        };
        info!(winner = ?match_winner, score_ct, score_t, "match ended");
        room.phase = RoundPhase::MatchEnd;
        room.phase_time_left = 0.0;
        room.push_event(GameEventData::MatchEnded {
            winner: match_winner,
            score_ct,
            score_t,
        });
    } else {
        room.phase = RoundPhase::RoundEnd;
        room.phase_time_left = cfg.round_end_time;
    }
}

/// Reset the arena for the next round and open the buy window.
pub fn start_round(room: &mut RoomState, cfg: &RoomConfig) {
    room.round_number += 1;
    room.spawn_cursor = (0, 0);
    room.round_outcome = None;
    room.bullets.release_all();
    room.grenades.clear();
    room.smokes.clear();
    room.grid.clear();

    let ids: Vec<PlayerId> = room.players.keys().copied().collect();
    for id in ids {
        let team = match room.players.get(&id) {
            Some(p) => p.team,
            None => continue,
        };
        let spawn = room.next_spawn(team);
        if let Some(player) = room.players.get_mut(&id) {
            // Dying forfeits bought weapons, armor and the kit.
            if !player.alive {
                player.primary = None;
                player.primary_ammo = AmmoState::default();
                player.secondary_ammo = AmmoState::full(player.secondary);
                player.slot = WeaponSlot::Secondary;
                player.armor = 0;
                player.has_helmet = false;
                player.has_defuse_kit = false;
            }
            player.reset_for_round(spawn);
            room.grid.insert(id, spawn, cfg.player_radius);
        }
    }

    // The first T in iteration order starts with the bomb.
    let carrier = room
        .players
        .values()
        .find(|p| p.team == Team::T)
        .map(|p| p.id);
    room.bomb = match carrier {
        Some(carrier) => BombState::Carried { carrier },
        None => BombState::Idle,
    };

    room.phase = RoundPhase::Freeze;
    room.phase_time_left = cfg.freeze_time;
    info!(round = room.round_number, "round started");
    room.push_event(GameEventData::RoundStarted {
        round: room.round_number,
    });
}

// =============================================================================
// TESTS
// =============================================================================
