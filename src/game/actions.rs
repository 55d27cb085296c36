//! Action Processing
//!
//! Validation and application of player commands against room state.
//! Every handler returns a failure result on bad or ill-timed input;
//! nothing here panics on client data, so one malformed command can never
//! take a room down.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::vec2::Vec2;
use crate::game::bomb::BombState;
use crate::game::economy::apply_money;
use crate::game::events::GameEventData;
use crate::game::input::{MoveInput, PlayerCommand};
use crate::game::state::{
    AmmoState, KillCredit, PlayerId, PlayerState, RoomState, RoundPhase, Team, WeaponSlot,
};
use crate::game::tick::RoomConfig;
use crate::game::weapons::{
    calculate_damage, movement_speed, BuyItem, GrenadeKind, WeaponId, CROUCH_MULTIPLIER,
    WALK_MULTIPLIER,
};
use crate::PLAYER_RADIUS;

/// Why an action was rejected.
///
/// Validation errors (bad shape, unknown ids) and state conflicts (legal
/// action at an illegal time) share this type; both are returned, never
/// thrown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionError {
    /// Player id is not in this room
    #[error("unknown player")]
    UnknownPlayer,
    /// Player is already in this room
    #[error("player already joined")]
    AlreadyJoined,
    /// Room is at capacity
    #[error("room is full")]
    RoomFull,
    /// Player is dead
    #[error("player is dead")]
    Dead,
    /// Input contained NaN/infinite or otherwise malformed values
    #[error("malformed input")]
    MalformedInput,
    /// Input sequence not newer than the last applied one
    #[error("stale input sequence")]
    StaleSequence,
    /// Move would leave the map bounds
    #[error("out of bounds")]
    OutOfBounds,
    /// Move would intersect static geometry
    #[error("blocked by geometry")]
    Blocked,
    /// Move would overlap another player
    #[error("overlaps another player")]
    PlayerOverlap,
    /// Fire-rate cooldown has not elapsed
    #[error("weapon on cooldown")]
    Cooldown,
    /// Magazine is empty
    #[error("clip empty")]
    ClipEmpty,
    /// A reload is in progress
    #[error("reloading")]
    Reloading,
    /// Magazine is already full
    #[error("clip already full")]
    ClipFull,
    /// No reserve ammo left
    #[error("no reserve ammo")]
    NoReserve,
    /// The equipped weapon has no magazine
    #[error("weapon cannot be reloaded")]
    NotReloadable,
    /// Purchases are only allowed during the buy window
    #[error("buy window closed")]
    BuyWindowClosed,
    /// Not enough money
    #[error("insufficient funds")]
    InsufficientFunds,
    /// Weapon not available to this team
    #[error("not available to this team")]
    TeamRestricted,
    /// Already carrying this equipment
    #[error("already owned")]
    AlreadyOwned,
    /// Carry limit for this grenade type reached
    #[error("grenade limit reached")]
    GrenadeLimit,
    /// No grenades of that type carried
    #[error("no grenade of that type")]
    NoGrenade,
    /// Action not legal in the current round phase
    #[error("wrong round phase")]
    WrongPhase,
    /// Action reserved for the other team
    #[error("wrong team")]
    WrongTeam,
    /// Player is not the bomb carrier
    #[error("not the bomb carrier")]
    NotCarrier,
    /// Not standing in a bombsite
    #[error("outside bombsite")]
    OutsideSite,
    /// No planted bomb to defuse
    #[error("no bomb planted")]
    NoBombPlanted,
    /// Too far from the bomb
    #[error("too far from the bomb")]
    TooFar,
    /// Team change would unbalance the teams
    #[error("teams would become unbalanced")]
    TeamImbalance,
}

/// Sequence-tagged authoritative position after a movement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveResult {
    /// Acknowledged input sequence
    pub seq: u32,
    /// Authoritative position after the move
    pub position: Vec2,
}

/// A resolved hit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitInfo {
    /// Player that was hit
    pub victim: PlayerId,
    /// Health damage dealt
    pub damage: i32,
    /// Headshot
    pub headshot: bool,
    /// The hit was lethal
    pub killed: bool,
    /// Distance along the shot ray
    pub distance: f32,
}

/// Authoritative result of a shot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShootResult {
    /// Weapon fired
    pub weapon: WeaponId,
    /// Muzzle position
    pub origin: Vec2,
    /// Shot direction in radians
    pub angle: f32,
    /// Hit, if the ray connected
    pub hit: Option<HitInfo>,
}

/// Per-command acknowledgement handed back to the sender's session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CommandAck {
    /// Movement applied
    Move(MoveResult),
    /// Shot resolved
    Shot(ShootResult),
    /// Action applied with no payload
    Done,
}

/// Fraction of the collision radius treated as the head.
const HEAD_RADIUS_FRACTION: f32 = 0.35;

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Add a player to the room, auto-balancing onto the smaller team.
pub fn add_player(
    room: &mut RoomState,
    cfg: &RoomConfig,
    id: PlayerId,
    name: String,
) -> Result<Team, ActionError> {
    if room.players.len() >= cfg.max_players {
        return Err(ActionError::RoomFull);
    }
    if room.players.contains_key(&id) {
        return Err(ActionError::AlreadyJoined);
    }

    let team = if room.team_count(Team::Ct) <= room.team_count(Team::T) {
        Team::Ct
    } else {
        Team::T
    };
    let spawn = room.next_spawn(team);
    let player = PlayerState::new(id, name, team, spawn, cfg.economy.starting_money);
    room.grid.insert(id, spawn, PLAYER_RADIUS);
    room.players.insert(id, player);
    room.push_event(GameEventData::PlayerJoined {
        player_id: id,
        team,
    });
    Ok(team)
}

/// Defer a disconnect to the next tick boundary so the entity set is
/// never mutated mid-iteration.
pub fn queue_removal(room: &mut RoomState, id: PlayerId) {
    if !room.pending_removals.contains(&id) {
        room.pending_removals.push(id);
    }
}

/// Apply deferred removals. Called at the start of every tick.
pub fn apply_removals(room: &mut RoomState) {
    let removals = std::mem::take(&mut room.pending_removals);
    for id in removals {
        let Some(player) = room.players.remove(&id) else {
            continue;
        };
        room.grid.remove(id);

        match room.bomb.clone() {
            BombState::Carried { carrier } if carrier == id => {
                room.bomb = BombState::Dropped {
                    position: player.position,
                };
            }
            BombState::Planting { planter, position, .. } if planter == id => {
                room.bomb = BombState::Dropped { position };
                room.push_event(GameEventData::BombPlantCancelled { player_id: id });
            }
            BombState::Defusing {
                defuser,
                position,
                site,
                time_left,
                planter,
                ..
            } if defuser == id => {
                room.bomb = BombState::Planted {
                    position,
                    site,
                    time_left,
                    planter,
                };
                room.push_event(GameEventData::BombDefuseCancelled { player_id: id });
            }
            _ => {}
        }

        room.push_event(GameEventData::PlayerLeft { player_id: id });
    }
}

// =============================================================================
// MOVEMENT
// =============================================================================

/// Validate and apply one movement input.
///
/// The step is clamped to the player's speed budget for one tick, then
/// rejected outright if it would leave the bounds, clip a wall, or land
/// on another player. A rejected move leaves the position unchanged.
pub fn process_movement(
    room: &mut RoomState,
    cfg: &RoomConfig,
    id: PlayerId,
    input: &MoveInput,
) -> Result<MoveResult, ActionError> {
    let player = room.players.get(&id).ok_or(ActionError::UnknownPlayer)?;
    if !player.alive {
        return Err(ActionError::Dead);
    }
    let delta = Vec2::new(input.dx, input.dy);
    if !delta.is_finite() || !input.aim_angle.is_finite() {
        return Err(ActionError::MalformedInput);
    }
    if input.seq <= player.last_input_seq {
        return Err(ActionError::StaleSequence);
    }

    let mut speed = movement_speed(player.equipped());
    if input.crouch {
        speed *= CROUCH_MULTIPLIER;
    } else if input.walk {
        speed *= WALK_MULTIPLIER;
    }
    let step = delta.clamp_length(speed * cfg.dt());
    let candidate = player.position + step;

    let margin = room.map.bounds_margin;
    if candidate.x < room.map.bounds.min.x + margin
        || candidate.x > room.map.bounds.max.x - margin
        || candidate.y < room.map.bounds.min.y + margin
        || candidate.y > room.map.bounds.max.y - margin
    {
        return Err(ActionError::OutOfBounds);
    }
    if !room.map.is_walkable(candidate, cfg.player_radius) {
        return Err(ActionError::Blocked);
    }

    let min_sep = cfg.min_separation;
    for other_id in room.grid.query_nearby(candidate, min_sep) {
        if other_id == id {
            continue;
        }
        if let Some(other) = room.players.get(&other_id) {
            if other.alive && other.position.distance(candidate) < min_sep {
                return Err(ActionError::PlayerOverlap);
            }
        }
    }

    let player = room
        .players
        .get_mut(&id)
        .ok_or(ActionError::UnknownPlayer)?;
    player.position = candidate;
    player.aim_angle = input.aim_angle;
    player.walking = input.walk;
    player.crouching = input.crouch;
    player.last_input_seq = input.seq;
    room.grid.update(id, candidate);

    Ok(MoveResult {
        seq: input.seq,
        position: candidate,
    })
}

// =============================================================================
// SHOOTING
// =============================================================================

/// Validate and resolve one shot with lag compensation.
///
/// Other players are rewound to their positions at the shooter's
/// perceived time (bounded by the history window), the ray is tested
/// against the rewound bodies through the spatial grid, and everything is
/// restored before damage is applied at current time.
pub fn process_shoot(
    room: &mut RoomState,
    cfg: &RoomConfig,
    id: PlayerId,
    angle: f32,
    client_timestamp: u64,
) -> Result<ShootResult, ActionError> {
    if !matches!(room.phase, RoundPhase::Warmup | RoundPhase::Live) {
        return Err(ActionError::WrongPhase);
    }
    if !angle.is_finite() {
        return Err(ActionError::MalformedInput);
    }

    let now = room.clock_ms;
    let player = room.players.get(&id).ok_or(ActionError::UnknownPlayer)?;
    if !player.alive {
        return Err(ActionError::Dead);
    }
    if player.is_reloading(now) {
        return Err(ActionError::Reloading);
    }

    let weapon = player.equipped();
    let def = weapon.def();
    if let Some(last) = player.last_shot_ms {
        if now < last + def.fire_interval_ms as u64 {
            return Err(ActionError::Cooldown);
        }
    }
    if weapon != WeaponId::Knife {
        let ammo = player.equipped_ammo().ok_or(ActionError::ClipEmpty)?;
        if ammo.clip == 0 {
            return Err(ActionError::ClipEmpty);
        }
    }

    let origin = player.position;
    let dir = Vec2::from_angle(angle);

    // Commit the shot before hit resolution.
    {
        let player = room
            .players
            .get_mut(&id)
            .ok_or(ActionError::UnknownPlayer)?;
        player.last_shot_ms = Some(now);
        player.aim_angle = angle;
        if weapon != WeaponId::Knife {
            if let Some(ammo) = player.equipped_ammo_mut() {
                ammo.clip -= 1;
            }
        }
    }

    // Walls cut the ray before any body can.
    let mut limit = def.max_range;
    if let Some(wall_dist) = room.map.ray_wall_distance(origin, dir, def.max_range) {
        limit = limit.min(wall_dist);
    }

    // Rewind other players to the shooter's perceived time.
    let ts = client_timestamp.clamp(now.saturating_sub(cfg.history_ms()), now);
    let rewound: Vec<(PlayerId, Vec2, Vec2)> = room
        .players
        .values()
        .filter(|p| p.id != id && p.alive)
        .map(|p| (p.id, p.position, p.position_at(ts)))
        .collect();
    for &(other, _, past) in &rewound {
        if let Some(p) = room.players.get_mut(&other) {
            p.position = past;
        }
        room.grid.update(other, past);
    }

    // Broad phase over the ray's bounding box, then exact ray-circle.
    let end = origin + dir * limit;
    let pad = cfg.player_radius;
    let rect_min = Vec2::new(origin.x.min(end.x) - pad, origin.y.min(end.y) - pad);
    let rect_max = Vec2::new(origin.x.max(end.x) + pad, origin.y.max(end.y) + pad);
    let head_radius = cfg.player_radius * HEAD_RADIUS_FRACTION;

    let mut best: Option<HitInfo> = None;
    for candidate in room.grid.query_rect(rect_min, rect_max) {
        if candidate == id {
            continue;
        }
        let Some(target) = room.players.get(&candidate) else {
            continue;
        };
        if !target.alive {
            continue;
        }

        let to_center = target.position - origin;
        let along = to_center.dot(dir);
        if along <= 0.0 || along > limit {
            continue;
        }
        let perp_sq = to_center.length_squared() - along * along;
        let radius = cfg.player_radius;
        if perp_sq > radius * radius {
            continue;
        }

        let entry = along - (radius * radius - perp_sq).max(0.0).sqrt();
        let distance = entry.max(0.0);
        if best.map(|b| distance < b.distance).unwrap_or(true) {
            best = Some(HitInfo {
                victim: candidate,
                damage: 0,
                headshot: perp_sq.sqrt() <= head_radius,
                killed: false,
                distance,
            });
        }
    }

    // Restore current positions before mutating anything.
    for &(other, current, _) in &rewound {
        if let Some(p) = room.players.get_mut(&other) {
            p.position = current;
        }
        room.grid.update(other, current);
    }

    let mut hit = None;
    if let Some(mut info) = best {
        let victim = room
            .players
            .get_mut(&info.victim)
            .ok_or(ActionError::UnknownPlayer)?;
        let result = calculate_damage(weapon, info.distance, victim.armor, info.headshot);
        let killed = victim.take_damage(result.health_damage, result.armor_absorbed);
        let remaining = victim.health;
        info.damage = result.health_damage;
        info.killed = killed;

        room.push_event(GameEventData::PlayerHit {
            attacker: id,
            victim: info.victim,
            weapon,
            damage: result.health_damage,
            headshot: info.headshot,
            remaining_health: remaining,
        });

        if killed {
            room.eliminate(
                info.victim,
                Some(KillCredit {
                    killer: id,
                    weapon: Some(weapon),
                    headshot: info.headshot,
                }),
                &cfg.economy,
            );
        }
        hit = Some(info);
    }

    // Tracer for broadcast; damage was already resolved above.
    if weapon != WeaponId::Knife {
        let flight = hit.map(|h| h.distance).unwrap_or(limit);
        let key = room.bullets.acquire();
        if let Some(bullet) = room.bullets.get_mut(key) {
            bullet.position = origin;
            bullet.velocity = dir * def.bullet_speed;
            bullet.owner = id;
            bullet.weapon = weapon;
            bullet.traveled = 0.0;
            bullet.max_distance = flight;
        }
    }

    Ok(ShootResult {
        weapon,
        origin,
        angle,
        hit,
    })
}

// =============================================================================
// RELOAD & LOADOUT
// =============================================================================

/// Start a reload for the equipped weapon.
pub fn process_reload(
    room: &mut RoomState,
    _cfg: &RoomConfig,
    id: PlayerId,
) -> Result<(), ActionError> {
    let now = room.clock_ms;
    let player = room
        .players
        .get_mut(&id)
        .ok_or(ActionError::UnknownPlayer)?;
    if !player.alive {
        return Err(ActionError::Dead);
    }
    let weapon = player.equipped();
    if weapon == WeaponId::Knife {
        return Err(ActionError::NotReloadable);
    }
    if player.is_reloading(now) {
        return Err(ActionError::Reloading);
    }

    let def = weapon.def();
    let ammo = player.equipped_ammo().ok_or(ActionError::NotReloadable)?;
    if ammo.clip >= def.clip_size {
        return Err(ActionError::ClipFull);
    }
    if ammo.reserve == 0 {
        return Err(ActionError::NoReserve);
    }

    player.reload_end_ms = Some(now + def.reload_ms as u64);
    Ok(())
}

/// Complete any reloads whose duration has elapsed.
pub fn finish_reloads(room: &mut RoomState) {
    let now = room.clock_ms;
    for player in room.players.values_mut() {
        let Some(end) = player.reload_end_ms else {
            continue;
        };
        if now < end {
            continue;
        }
        player.reload_end_ms = None;
        let clip_size = player.equipped().def().clip_size;
        if let Some(ammo) = player.equipped_ammo_mut() {
            let needed = clip_size.saturating_sub(ammo.clip);
            let take = needed.min(ammo.reserve);
            ammo.clip += take;
            ammo.reserve -= take;
        }
    }
}

/// Switch the equipped slot. Cancels an in-progress reload.
pub fn switch_slot(
    room: &mut RoomState,
    id: PlayerId,
    slot: WeaponSlot,
) -> Result<(), ActionError> {
    let player = room
        .players
        .get_mut(&id)
        .ok_or(ActionError::UnknownPlayer)?;
    if !player.alive {
        return Err(ActionError::Dead);
    }
    player.slot = slot;
    player.reload_end_ms = None;
    Ok(())
}

/// Buy an item during the buy window. Deduction and grant are immediate.
pub fn buy(
    room: &mut RoomState,
    cfg: &RoomConfig,
    id: PlayerId,
    item: BuyItem,
) -> Result<(), ActionError> {
    if room.phase != RoundPhase::Freeze {
        return Err(ActionError::BuyWindowClosed);
    }
    let player = room
        .players
        .get_mut(&id)
        .ok_or(ActionError::UnknownPlayer)?;
    if !player.alive {
        return Err(ActionError::Dead);
    }

    let cost = item.cost() as i32;
    if player.money < cost {
        return Err(ActionError::InsufficientFunds);
    }

    match item {
        BuyItem::Weapon { weapon } => {
            if !weapon.purchasable_by(player.team) {
                return Err(ActionError::TeamRestricted);
            }
            if weapon.is_primary() {
                player.primary = Some(weapon);
                player.primary_ammo = AmmoState::full(weapon);
                player.slot = WeaponSlot::Primary;
            } else {
                player.secondary = weapon;
                player.secondary_ammo = AmmoState::full(weapon);
                player.slot = WeaponSlot::Secondary;
            }
        }
        BuyItem::Armor => {
            player.armor = 100;
        }
        BuyItem::ArmorHelmet => {
            player.armor = 100;
            player.has_helmet = true;
        }
        BuyItem::DefuseKit => {
            if player.team != Team::Ct {
                return Err(ActionError::TeamRestricted);
            }
            if player.has_defuse_kit {
                return Err(ActionError::AlreadyOwned);
            }
            player.has_defuse_kit = true;
        }
        BuyItem::Grenade { kind } => {
            let count = player.grenades.get_mut(kind);
            if *count >= kind.def().carry_limit {
                return Err(ActionError::GrenadeLimit);
            }
            *count += 1;
        }
    }

    apply_money(&mut player.money, -cost, cfg.economy.max_money);
    let money_left = player.money;
    room.push_event(GameEventData::ItemPurchased {
        player_id: id,
        item,
        money_left,
    });
    Ok(())
}

// =============================================================================
// BOMB & GRENADES
// =============================================================================

/// Begin planting the bomb at the carrier's position.
pub fn plant_bomb(room: &mut RoomState, id: PlayerId) -> Result<(), ActionError> {
    if room.phase != RoundPhase::Live {
        return Err(ActionError::WrongPhase);
    }
    let player = room.players.get(&id).ok_or(ActionError::UnknownPlayer)?;
    if !player.alive {
        return Err(ActionError::Dead);
    }
    if player.team != Team::T {
        return Err(ActionError::WrongTeam);
    }
    if room.bomb_carrier() != Some(id) {
        return Err(ActionError::NotCarrier);
    }
    let position = player.position;
    let site = room.map.site_at(position).ok_or(ActionError::OutsideSite)?;

    debug!(player = %id.to_uuid_string(), site = ?site, "plant started");
    room.bomb = BombState::Planting {
        planter: id,
        progress: 0.0,
        site,
        position,
    };
    room.push_event(GameEventData::BombPlantStarted {
        player_id: id,
        site,
    });
    Ok(())
}

/// Start or stop a defuse attempt.
pub fn defuse_bomb(
    room: &mut RoomState,
    cfg: &RoomConfig,
    id: PlayerId,
    active: bool,
) -> Result<(), ActionError> {
    if !active {
        if let BombState::Defusing {
            defuser,
            position,
            site,
            time_left,
            planter,
            ..
        } = room.bomb.clone()
        {
            if defuser == id {
                room.bomb = BombState::Planted {
                    position,
                    site,
                    time_left,
                    planter,
                };
                room.push_event(GameEventData::BombDefuseCancelled { player_id: id });
            }
        }
        return Ok(());
    }

    let player = room.players.get(&id).ok_or(ActionError::UnknownPlayer)?;
    if !player.alive {
        return Err(ActionError::Dead);
    }
    if player.team != Team::Ct {
        return Err(ActionError::WrongTeam);
    }
    let BombState::Planted {
        position,
        site,
        time_left,
        planter,
    } = room.bomb.clone()
    else {
        return Err(ActionError::NoBombPlanted);
    };
    if player.position.distance(position) > cfg.bomb.defuse_range {
        return Err(ActionError::TooFar);
    }

    let has_kit = player.has_defuse_kit;
    debug!(player = %id.to_uuid_string(), has_kit, "defuse started");
    room.bomb = BombState::Defusing {
        position,
        site,
        time_left,
        planter,
        defuser: id,
        progress: 0.0,
        has_kit,
    };
    room.push_event(GameEventData::BombDefuseStarted {
        player_id: id,
        has_kit,
    });
    Ok(())
}

/// Throw a carried grenade.
pub fn throw_grenade(
    room: &mut RoomState,
    id: PlayerId,
    kind: GrenadeKind,
    angle: f32,
) -> Result<(), ActionError> {
    if !matches!(room.phase, RoundPhase::Warmup | RoundPhase::Live) {
        return Err(ActionError::WrongPhase);
    }
    if !angle.is_finite() {
        return Err(ActionError::MalformedInput);
    }
    let player = room
        .players
        .get_mut(&id)
        .ok_or(ActionError::UnknownPlayer)?;
    if !player.alive {
        return Err(ActionError::Dead);
    }
    let count = player.grenades.get_mut(kind);
    if *count == 0 {
        return Err(ActionError::NoGrenade);
    }
    *count -= 1;
    let position = player.position;

    let def = kind.def();
    room.grenades.push(crate::game::state::GrenadeProjectile {
        kind,
        position,
        velocity: Vec2::from_angle(angle) * def.throw_speed,
        fuse: def.fuse_secs,
        thrower: id,
    });
    room.push_event(GameEventData::GrenadeThrown {
        player_id: id,
        kind,
    });
    Ok(())
}

// =============================================================================
// TEAMS
// =============================================================================

/// Switch teams. Rejected when it would unbalance the teams by more than
/// one player. Kills the switching player and resets their loadout.
pub fn change_team(
    room: &mut RoomState,
    cfg: &RoomConfig,
    id: PlayerId,
    team: Team,
) -> Result<(), ActionError> {
    let player = room.players.get(&id).ok_or(ActionError::UnknownPlayer)?;
    if player.team == team {
        return Ok(());
    }

    let joining = room.team_count(team) as i32 + 1;
    let leaving = room.team_count(player.team) as i32 - 1;
    if joining - leaving > 1 {
        return Err(ActionError::TeamImbalance);
    }

    if player.alive {
        room.eliminate(id, None, &cfg.economy);
    }
    let player = room
        .players
        .get_mut(&id)
        .ok_or(ActionError::UnknownPlayer)?;
    player.team = team;
    player.primary = None;
    player.primary_ammo = AmmoState::default();
    player.secondary = match team {
        Team::Ct => WeaponId::Usp,
        Team::T => WeaponId::Glock,
    };
    player.secondary_ammo = AmmoState::full(player.secondary);
    player.slot = WeaponSlot::Secondary;
    if team == Team::T {
        player.has_defuse_kit = false;
    }
    room.push_event(GameEventData::TeamChanged { player_id: id, team });
    Ok(())
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Route one queued command to its handler.
pub fn dispatch(
    room: &mut RoomState,
    cfg: &RoomConfig,
    player: PlayerId,
    command: &PlayerCommand,
) -> Result<CommandAck, ActionError> {
    match command {
        PlayerCommand::Move(input) => {
            process_movement(room, cfg, player, input).map(CommandAck::Move)
        }
        PlayerCommand::Shoot {
            angle,
            client_timestamp,
        } => process_shoot(room, cfg, player, *angle, *client_timestamp).map(CommandAck::Shot),
        PlayerCommand::Reload => process_reload(room, cfg, player).map(|_| CommandAck::Done),
        PlayerCommand::Buy(item) => buy(room, cfg, player, *item).map(|_| CommandAck::Done),
        PlayerCommand::SwitchSlot(slot) => {
            switch_slot(room, player, *slot).map(|_| CommandAck::Done)
        }
        PlayerCommand::PlantBomb => plant_bomb(room, player).map(|_| CommandAck::Done),
        PlayerCommand::DefuseBomb { active } => {
            defuse_bomb(room, cfg, player, *active).map(|_| CommandAck::Done)
        }
        PlayerCommand::ThrowGrenade { kind, angle } => {
            throw_grenade(room, player, *kind, *angle).map(|_| CommandAck::Done)
        }
        PlayerCommand::ChangeTeam(team) => {
            change_team(room, cfg, player, *team).map(|_| CommandAck::Done)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::MapLayout;

    fn test_room() -> (RoomState, RoomConfig) {
        (RoomState::new(MapLayout::dust()), RoomConfig::default())
    }

    fn join(room: &mut RoomState, cfg: &RoomConfig) -> PlayerId {
        let id = PlayerId::random();
        add_player(room, cfg, id, "p".into()).unwrap();
        id
    }

    fn place(room: &mut RoomState, id: PlayerId, pos: Vec2) {
        room.players.get_mut(&id).unwrap().position = pos;
        room.grid.update(id, pos);
    }

    #[test]
    fn test_add_player_balances_teams() {
        let (mut room, cfg) = test_room();
        let teams: Vec<Team> = (0..4)
            .map(|_| add_player(&mut room, &cfg, PlayerId::random(), "p".into()).unwrap())
            .collect();
        assert_eq!(teams, vec![Team::Ct, Team::T, Team::Ct, Team::T]);
    }

    #[test]
    fn test_room_capacity_rejects_eleventh() {
        let (mut room, cfg) = test_room();
        for _ in 0..10 {
            join(&mut room, &cfg);
        }
        let result = add_player(&mut room, &cfg, PlayerId::random(), "late".into());
        assert_eq!(result, Err(ActionError::RoomFull));
        assert_eq!(room.players.len(), 10);
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let (mut room, cfg) = test_room();
        let id = join(&mut room, &cfg);
        assert_eq!(
            add_player(&mut room, &cfg, id, "again".into()),
            Err(ActionError::AlreadyJoined)
        );
    }

    #[test]
    fn test_movement_applies_and_acks_sequence() {
        let (mut room, cfg) = test_room();
        let id = join(&mut room, &cfg);
        place(&mut room, id, Vec2::new(640.0, 100.0));

        let result = process_movement(
            &mut room,
            &cfg,
            id,
            &MoveInput {
                seq: 1,
                dx: 5.0,
                dy: 0.0,
                aim_angle: 0.0,
                walk: false,
                crouch: false,
            },
        )
        .unwrap();

        assert_eq!(result.seq, 1);
        assert_eq!(result.position, Vec2::new(645.0, 100.0));
        assert_eq!(room.players[&id].last_input_seq, 1);
    }

    #[test]
    fn test_movement_step_clamped_to_speed() {
        let (mut room, cfg) = test_room();
        let id = join(&mut room, &cfg);
        place(&mut room, id, Vec2::new(640.0, 100.0));

        // Pistol speed 250 u/s at 30 Hz: ~8.33 units per tick.
        let result = process_movement(
            &mut room,
            &cfg,
            id,
            &MoveInput {
                seq: 1,
                dx: 500.0,
                dy: 0.0,
                aim_angle: 0.0,
                walk: false,
                crouch: false,
            },
        )
        .unwrap();
        let moved = result.position.x - 640.0;
        assert!((moved - 250.0 * cfg.dt()).abs() < 1e-3);
    }

    #[test]
    fn test_movement_rejects_out_of_bounds_and_walls() {
        let (mut room, cfg) = test_room();
        let id = join(&mut room, &cfg);

        place(&mut room, id, Vec2::new(22.0, 100.0));
        let oob = process_movement(
            &mut room,
            &cfg,
            id,
            &MoveInput {
                seq: 1,
                dx: -5.0,
                dy: 0.0,
                aim_angle: 0.0,
                walk: false,
                crouch: false,
            },
        );
        assert_eq!(oob, Err(ActionError::OutOfBounds));
        assert_eq!(room.players[&id].position, Vec2::new(22.0, 100.0));

        // Right next to the mid crates.
        place(&mut room, id, Vec2::new(540.0, 300.0));
        let blocked = process_movement(
            &mut room,
            &cfg,
            id,
            &MoveInput {
                seq: 2,
                dx: 8.0,
                dy: 0.0,
                aim_angle: 0.0,
                walk: false,
                crouch: false,
            },
        );
        assert_eq!(blocked, Err(ActionError::Blocked));
    }

    #[test]
    fn test_movement_rejects_player_overlap() {
        let (mut room, cfg) = test_room();
        let a = join(&mut room, &cfg);
        let b = join(&mut room, &cfg);
        place(&mut room, a, Vec2::new(640.0, 100.0));
        place(&mut room, b, Vec2::new(670.0, 100.0));

        let result = process_movement(
            &mut room,
            &cfg,
            a,
            &MoveInput {
                seq: 1,
                dx: 8.0,
                dy: 0.0,
                aim_angle: 0.0,
                walk: false,
                crouch: false,
            },
        );
        assert_eq!(result, Err(ActionError::PlayerOverlap));
    }

    #[test]
    fn test_movement_rejects_stale_and_malformed() {
        let (mut room, cfg) = test_room();
        let id = join(&mut room, &cfg);
        place(&mut room, id, Vec2::new(640.0, 100.0));

        let input = MoveInput {
            seq: 5,
            dx: 1.0,
            dy: 0.0,
            aim_angle: 0.0,
            walk: false,
            crouch: false,
        };
        process_movement(&mut room, &cfg, id, &input).unwrap();
        assert_eq!(
            process_movement(&mut room, &cfg, id, &input),
            Err(ActionError::StaleSequence)
        );

        let nan = MoveInput {
            seq: 6,
            dx: f32::NAN,
            dy: 0.0,
            aim_angle: 0.0,
            walk: false,
            crouch: false,
        };
        assert_eq!(
            process_movement(&mut room, &cfg, id, &nan),
            Err(ActionError::MalformedInput)
        );
        assert_eq!(
            process_movement(&mut room, &cfg, PlayerId::random(), &input),
            Err(ActionError::UnknownPlayer)
        );
    }

    #[test]
    fn test_ak47_body_shot_reduces_health_to_64() {
        let (mut room, cfg) = test_room();
        let shooter = join(&mut room, &cfg); // CT
        let target = join(&mut room, &cfg); // T
        room.phase = RoundPhase::Live;

        place(&mut room, shooter, Vec2::new(400.0, 360.0));
        // Offset below the shot line: inside the body, outside the head ring.
        place(&mut room, target, Vec2::new(500.0, 370.0));
        {
            let p = room.players.get_mut(&shooter).unwrap();
            p.primary = Some(WeaponId::Ak47);
            p.primary_ammo = AmmoState::full(WeaponId::Ak47);
            p.slot = WeaponSlot::Primary;
        }

        let result = process_shoot(&mut room, &cfg, shooter, 0.0, 0).unwrap();
        let hit = result.hit.expect("shot must connect");
        assert_eq!(hit.victim, target);
        assert!(!hit.headshot);
        assert_eq!(hit.damage, 36);
        assert_eq!(room.players[&target].health, 64);
        assert_eq!(room.players[&shooter].primary_ammo.clip, 29);
    }

    #[test]
    fn test_shoot_cooldown_rejected_with_ammo_unchanged() {
        let (mut room, cfg) = test_room();
        let shooter = join(&mut room, &cfg);
        room.phase = RoundPhase::Live;
        place(&mut room, shooter, Vec2::new(640.0, 100.0));

        process_shoot(&mut room, &cfg, shooter, 0.0, 0).unwrap();
        let clip = room.players[&shooter].secondary_ammo.clip;

        // USP interval is 350ms; same tick retry must fail.
        let retry = process_shoot(&mut room, &cfg, shooter, 0.0, 0);
        assert_eq!(retry, Err(ActionError::Cooldown));
        assert_eq!(room.players[&shooter].secondary_ammo.clip, clip);
    }

    #[test]
    fn test_shoot_empty_clip_rejected() {
        let (mut room, cfg) = test_room();
        let shooter = join(&mut room, &cfg);
        room.phase = RoundPhase::Live;
        room.players.get_mut(&shooter).unwrap().secondary_ammo.clip = 0;

        assert_eq!(
            process_shoot(&mut room, &cfg, shooter, 0.0, 0),
            Err(ActionError::ClipEmpty)
        );
    }

    #[test]
    fn test_wall_blocks_shot() {
        let (mut room, cfg) = test_room();
        let shooter = join(&mut room, &cfg);
        let target = join(&mut room, &cfg);
        room.phase = RoundPhase::Live;

        // Mid crates sit between the two.
        place(&mut room, shooter, Vec2::new(400.0, 305.0));
        place(&mut room, target, Vec2::new(800.0, 305.0));

        let result = process_shoot(&mut room, &cfg, shooter, 0.0, 0).unwrap();
        assert!(result.hit.is_none());
        assert_eq!(room.players[&target].health, 100);
    }

    #[test]
    fn test_lag_compensated_shot_hits_past_position() {
        // 100ms ticks
        let cfg = RoomConfig {
            tick_rate: 10,
            ..RoomConfig::default()
        };
        let mut room = RoomState::new(MapLayout::dust());
        let shooter = PlayerId::random();
        add_player(&mut room, &cfg, shooter, "s".into()).unwrap();
        let target = PlayerId::random();
        add_player(&mut room, &cfg, target, "t".into()).unwrap();
        room.phase = RoundPhase::Live;
        place(&mut room, shooter, Vec2::new(400.0, 100.0));

        // Target was on the shot line 300ms ago, then strafed away.
        let past = Vec2::new(500.0, 108.0);
        let current = Vec2::new(500.0, 200.0);
        room.clock_ms = 1000;
        {
            let p = room.players.get_mut(&target).unwrap();
            p.history.push_back((600, past));
            p.history.push_back((900, current));
            p.position = current;
        }
        room.grid.update(target, current);

        let result = process_shoot(&mut room, &cfg, shooter, 0.0, 700).unwrap();
        let hit = result.hit.expect("rewound shot must connect");
        assert_eq!(hit.victim, target);
        // Live position untouched by the rewind.
        assert_eq!(room.players[&target].position, current);
    }

    #[test]
    fn test_reload_lifecycle_blocks_shooting() {
        let (mut room, cfg) = test_room();
        let id = join(&mut room, &cfg);
        room.phase = RoundPhase::Live;
        {
            let p = room.players.get_mut(&id).unwrap();
            p.secondary_ammo.clip = 3;
        }

        process_reload(&mut room, &cfg, id).unwrap();
        assert_eq!(
            process_shoot(&mut room, &cfg, id, 0.0, 0),
            Err(ActionError::Reloading)
        );
        assert_eq!(
            process_reload(&mut room, &cfg, id),
            Err(ActionError::Reloading)
        );

        // USP reload is 2500ms.
        room.clock_ms = 2500;
        finish_reloads(&mut room);
        let ammo = room.players[&id].secondary_ammo;
        assert_eq!(ammo.clip, 12);
        assert_eq!(ammo.reserve, 91);
    }

    #[test]
    fn test_reload_rejected_when_full_or_dry() {
        let (mut room, cfg) = test_room();
        let id = join(&mut room, &cfg);

        assert_eq!(process_reload(&mut room, &cfg, id), Err(ActionError::ClipFull));

        {
            let p = room.players.get_mut(&id).unwrap();
            p.secondary_ammo.clip = 1;
            p.secondary_ammo.reserve = 0;
        }
        assert_eq!(
            process_reload(&mut room, &cfg, id),
            Err(ActionError::NoReserve)
        );

        room.players.get_mut(&id).unwrap().slot = WeaponSlot::Knife;
        assert_eq!(
            process_reload(&mut room, &cfg, id),
            Err(ActionError::NotReloadable)
        );
    }

    #[test]
    fn test_buy_window_team_and_funds() {
        let (mut room, cfg) = test_room();
        let ct = join(&mut room, &cfg);

        // Outside the buy window.
        room.phase = RoundPhase::Live;
        assert_eq!(
            buy(&mut room, &cfg, ct, BuyItem::Weapon { weapon: WeaponId::Usp }),
            Err(ActionError::BuyWindowClosed)
        );

        room.phase = RoundPhase::Freeze;
        // CT cannot buy the AK.
        assert_eq!(
            buy(&mut room, &cfg, ct, BuyItem::Weapon { weapon: WeaponId::Ak47 }),
            Err(ActionError::TeamRestricted)
        );
        // 800 starting money cannot afford an M4.
        assert_eq!(
            buy(&mut room, &cfg, ct, BuyItem::Weapon { weapon: WeaponId::M4a1 }),
            Err(ActionError::InsufficientFunds)
        );

        room.players.get_mut(&ct).unwrap().money = 4000;
        buy(&mut room, &cfg, ct, BuyItem::Weapon { weapon: WeaponId::M4a1 }).unwrap();
        let p = &room.players[&ct];
        assert_eq!(p.primary, Some(WeaponId::M4a1));
        assert_eq!(p.primary_ammo.clip, 25);
        assert_eq!(p.money, 900);
        assert_eq!(p.slot, WeaponSlot::Primary);
    }

    #[test]
    fn test_buy_equipment_and_grenade_caps() {
        let (mut room, cfg) = test_room();
        let ct = join(&mut room, &cfg);
        room.phase = RoundPhase::Freeze;
        room.players.get_mut(&ct).unwrap().money = 5000;

        buy(&mut room, &cfg, ct, BuyItem::ArmorHelmet).unwrap();
        buy(&mut room, &cfg, ct, BuyItem::DefuseKit).unwrap();
        assert_eq!(
            buy(&mut room, &cfg, ct, BuyItem::DefuseKit),
            Err(ActionError::AlreadyOwned)
        );

        buy(&mut room, &cfg, ct, BuyItem::Grenade { kind: GrenadeKind::He }).unwrap();
        assert_eq!(
            buy(&mut room, &cfg, ct, BuyItem::Grenade { kind: GrenadeKind::He }),
            Err(ActionError::GrenadeLimit)
        );

        let p = &room.players[&ct];
        assert_eq!(p.armor, 100);
        assert!(p.has_helmet);
        assert!(p.has_defuse_kit);
        assert_eq!(p.grenades.he, 1);
    }

    #[test]
    fn test_plant_requires_carrier_team_and_site() {
        let (mut room, cfg) = test_room();
        let ct = join(&mut room, &cfg);
        let t = join(&mut room, &cfg);
        room.phase = RoundPhase::Live;
        room.bomb = BombState::Carried { carrier: t };

        let site = Vec2::new(200.0, 200.0);
        place(&mut room, ct, site);
        place(&mut room, t, Vec2::new(640.0, 100.0));

        assert_eq!(plant_bomb(&mut room, ct), Err(ActionError::WrongTeam));
        assert_eq!(plant_bomb(&mut room, t), Err(ActionError::OutsideSite));

        place(&mut room, t, Vec2::new(210.0, 210.0));
        plant_bomb(&mut room, t).unwrap();
        assert!(matches!(room.bomb, BombState::Planting { .. }));
    }

    #[test]
    fn test_defuse_requires_proximity() {
        let (mut room, cfg) = test_room();
        let ct = join(&mut room, &cfg);
        room.phase = RoundPhase::Live;
        let bomb_pos = Vec2::new(200.0, 200.0);
        room.bomb = BombState::Planted {
            position: bomb_pos,
            site: crate::game::map::SiteId::A,
            time_left: 45.0,
            planter: PlayerId::random(),
        };

        place(&mut room, ct, Vec2::new(400.0, 200.0));
        assert_eq!(
            defuse_bomb(&mut room, &cfg, ct, true),
            Err(ActionError::TooFar)
        );

        place(&mut room, ct, Vec2::new(220.0, 200.0));
        defuse_bomb(&mut room, &cfg, ct, true).unwrap();
        assert!(matches!(room.bomb, BombState::Defusing { .. }));

        // Releasing the key reverts to planted with progress lost.
        defuse_bomb(&mut room, &cfg, ct, false).unwrap();
        assert!(matches!(room.bomb, BombState::Planted { .. }));
    }

    #[test]
    fn test_change_team_balance() {
        let (mut room, cfg) = test_room();
        let a = join(&mut room, &cfg); // Ct
        let b = join(&mut room, &cfg); // T

        // 2v0 would unbalance by two.
        assert_eq!(
            change_team(&mut room, &cfg, b, Team::Ct),
            Err(ActionError::TeamImbalance)
        );

        // 1v1 -> 0v2 is within tolerance... also unbalanced by two; rejected.
        assert_eq!(
            change_team(&mut room, &cfg, a, Team::T),
            Err(ActionError::TeamImbalance)
        );

        // With a third player the smaller side can be joined.
        let c = join(&mut room, &cfg); // Ct (2v1)
        change_team(&mut room, &cfg, c, Team::T).unwrap();
        assert_eq!(room.players[&c].team, Team::T);
        assert_eq!(room.players[&c].secondary, WeaponId::Glock);
        let _ = a;
    }

    #[test]
    fn test_deferred_removal_drops_bomb() {
        let (mut room, cfg) = test_room();
        let t = {
            let _ = join(&mut room, &cfg); // Ct
            join(&mut room, &cfg) // T
        };
        room.bomb = BombState::Carried { carrier: t };

        queue_removal(&mut room, t);
        queue_removal(&mut room, t);
        assert_eq!(room.pending_removals.len(), 1);
        assert!(room.players.contains_key(&t));

        apply_removals(&mut room);
        assert!(!room.players.contains_key(&t));
        assert!(matches!(room.bomb, BombState::Dropped { .. }));
    }
}
