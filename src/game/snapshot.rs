//! State Snapshots & Deltas
//!
//! Wire-facing views of room state. A full snapshot goes out on join; per
//! tick the [`DeltaTracker`] diffs against the previous snapshot and emits
//! only players that changed, plus the per-player `last_processed_input`
//! map clients need for reconciliation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::vec2::Vec2;
use crate::game::bomb::BombState;
use crate::game::events::GameEvent;
use crate::game::state::{
    AmmoState, GrenadeCounts, PlayerId, PlayerState, RoomState, RoundPhase, SmokeCloud, Team,
    WeaponSlot,
};
use crate::game::weapons::WeaponId;

// =============================================================================
// SNAPSHOT TYPES
// =============================================================================

/// Wire view of one player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Player id
    pub id: PlayerId,
    /// Display name
    pub name: String,
    /// Team
    pub team: Team,
    /// Position
    pub position: Vec2,
    /// Aim direction in radians
    pub aim_angle: f32,
    /// Health
    pub health: i32,
    /// Armor
    pub armor: i32,
    /// Helmet
    pub has_helmet: bool,
    /// Alive this round
    pub alive: bool,
    /// Cash on hand
    pub money: i32,
    /// Primary weapon
    pub primary: Option<WeaponId>,
    /// Sidearm
    pub secondary: WeaponId,
    /// Equipped slot
    pub slot: WeaponSlot,
    /// Primary ammo
    pub primary_ammo: AmmoState,
    /// Sidearm ammo
    pub secondary_ammo: AmmoState,
    /// Carried grenades
    pub grenades: GrenadeCounts,
    /// Defuse kit
    pub has_defuse_kit: bool,
    /// Walking
    pub walking: bool,
    /// Crouching
    pub crouching: bool,
    /// Flash blind expiry on the server clock (ms); 0 when never blinded
    pub blinded_until_ms: u64,
    /// Kills this match
    pub kills: u32,
    /// Deaths this match
    pub deaths: u32,
}

impl PlayerSnapshot {
    /// Capture a player's wire view.
    pub fn capture(player: &PlayerState) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
            team: player.team,
            position: player.position,
            aim_angle: player.aim_angle,
            health: player.health,
            armor: player.armor,
            has_helmet: player.has_helmet,
            alive: player.alive,
            money: player.money,
            primary: player.primary,
            secondary: player.secondary,
            slot: player.slot,
            primary_ammo: player.primary_ammo,
            secondary_ammo: player.secondary_ammo,
            grenades: player.grenades,
            has_defuse_kit: player.has_defuse_kit,
            walking: player.walking,
            crouching: player.crouching,
            blinded_until_ms: player.blinded_until_ms,
            kills: player.kills,
            deaths: player.deaths,
        }
    }
}

/// Wire view of one tracer bullet.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BulletSnapshot {
    /// Position
    pub position: Vec2,
    /// Velocity (units/second)
    pub velocity: Vec2,
    /// Shooter
    pub owner: PlayerId,
    /// Weapon that fired it
    pub weapon: WeaponId,
}

/// Wire view of round progress.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Current phase
    pub phase: RoundPhase,
    /// Seconds left in the phase
    pub phase_time_left: f32,
    /// Round number
    pub round_number: u16,
    /// CT rounds won
    pub score_ct: u16,
    /// T rounds won
    pub score_t: u16,
}

/// Complete wire view of a room, sent on join and kept by the
/// [`DeltaTracker`] as the diffing baseline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// Tick this snapshot describes
    pub tick: u64,
    /// Server clock (ms) at capture
    pub timestamp_ms: u64,
    /// All players
    pub players: Vec<PlayerSnapshot>,
    /// Active tracers
    pub bullets: Vec<BulletSnapshot>,
    /// Active smoke screens
    pub smokes: Vec<SmokeCloud>,
    /// Round progress
    pub round: RoundSnapshot,
    /// Bomb state
    pub bomb: BombState,
    /// Highest input sequence applied per player
    pub last_processed_input: BTreeMap<PlayerId, u32>,
}

impl RoomSnapshot {
    /// Capture the full wire view of a room.
    pub fn capture(room: &RoomState) -> Self {
        let players = room.players.values().map(PlayerSnapshot::capture).collect();
        let bullets = room
            .bullets
            .iter()
            .map(|(_, b)| BulletSnapshot {
                position: b.position,
                velocity: b.velocity,
                owner: b.owner,
                weapon: b.weapon,
            })
            .collect();
        let last_processed_input = room
            .players
            .values()
            .map(|p| (p.id, p.last_input_seq))
            .collect();
        Self {
            tick: room.tick,
            timestamp_ms: room.clock_ms,
            players,
            bullets,
            smokes: room.smokes.clone(),
            round: RoundSnapshot {
                phase: room.phase,
                phase_time_left: room.phase_time_left,
                round_number: room.round_number,
                score_ct: room.scores.ct.rounds_won,
                score_t: room.scores.t.rounds_won,
            },
            bomb: room.bomb.clone(),
            last_processed_input,
        }
    }
}

// =============================================================================
// DELTAS
// =============================================================================

/// Per-tick diff against the previous snapshot.
///
/// Unchanged players are omitted; bullets are small and volatile so they
/// are always sent whole.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    /// Tick this delta describes
    pub tick: u64,
    /// Server clock (ms) at capture
    pub timestamp_ms: u64,
    /// Players whose wire view changed
    pub players: Vec<PlayerSnapshot>,
    /// Players removed since the last delta
    pub removed: Vec<PlayerId>,
    /// All active tracers
    pub bullets: Vec<BulletSnapshot>,
    /// Round progress, when changed
    pub round: Option<RoundSnapshot>,
    /// Bomb state, when changed
    pub bomb: Option<BombState>,
    /// Smoke screens, when changed
    pub smokes: Option<Vec<SmokeCloud>>,
    /// Events from this tick
    pub events: Vec<GameEvent>,
    /// Highest input sequence applied per player
    pub last_processed_input: BTreeMap<PlayerId, u32>,
}

/// Diffs successive room snapshots into [`StateDelta`]s. One tracker per
/// room, owned by the tick loop.
#[derive(Debug, Default)]
pub struct DeltaTracker {
    previous: Option<RoomSnapshot>,
}

impl DeltaTracker {
    /// Create a tracker with no baseline; the first delta reports
    /// everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the room and diff it against the previous capture.
    pub fn delta(&mut self, room: &RoomState, events: Vec<GameEvent>) -> StateDelta {
        let current = RoomSnapshot::capture(room);
        let delta = match &self.previous {
            None => StateDelta {
                tick: current.tick,
                timestamp_ms: current.timestamp_ms,
                players: current.players.clone(),
                removed: Vec::new(),
                bullets: current.bullets.clone(),
                round: Some(current.round),
                bomb: Some(current.bomb.clone()),
                smokes: Some(current.smokes.clone()),
                events,
                last_processed_input: current.last_processed_input.clone(),
            },
            Some(prev) => {
                let prev_by_id: BTreeMap<PlayerId, &PlayerSnapshot> =
                    prev.players.iter().map(|p| (p.id, p)).collect();
                let players: Vec<PlayerSnapshot> = current
                    .players
                    .iter()
                    .filter(|p| prev_by_id.get(&p.id).map(|old| *old != *p).unwrap_or(true))
                    .cloned()
                    .collect();
                let current_ids: BTreeMap<PlayerId, ()> =
                    current.players.iter().map(|p| (p.id, ())).collect();
                let removed: Vec<PlayerId> = prev
                    .players
                    .iter()
                    .map(|p| p.id)
                    .filter(|id| !current_ids.contains_key(id))
                    .collect();
                StateDelta {
                    tick: current.tick,
                    timestamp_ms: current.timestamp_ms,
                    players,
                    removed,
                    bullets: current.bullets.clone(),
                    round: (prev.round != current.round).then_some(current.round),
                    bomb: (prev.bomb != current.bomb).then(|| current.bomb.clone()),
                    smokes: (prev.smokes != current.smokes).then(|| current.smokes.clone()),
                    events,
                    last_processed_input: current.last_processed_input.clone(),
                }
            }
        };
        self.previous = Some(current);
        delta
    }

    /// Drop the baseline so the next delta reports everything.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::actions::{add_player, process_movement};
    use crate::game::input::MoveInput;
    use crate::game::map::MapLayout;
    use crate::game::tick::{advance, RoomConfig};

    fn room_with_two(cfg: &RoomConfig) -> (RoomState, PlayerId, PlayerId) {
        let mut room = RoomState::new(MapLayout::dust());
        let a = PlayerId::random();
        add_player(&mut room, cfg, a, "a".into()).unwrap();
        let b = PlayerId::random();
        add_player(&mut room, cfg, b, "b".into()).unwrap();
        (room, a, b)
    }

    fn move_input(seq: u32, dx: f32, dy: f32) -> MoveInput {
        MoveInput {
            seq,
            dx,
            dy,
            aim_angle: 0.0,
            walk: false,
            crouch: false,
        }
    }

    #[test]
    fn test_snapshot_round_trips_equipment() {
        let cfg = RoomConfig::default();
        let (mut room, a, _) = room_with_two(&cfg);
        {
            let p = room.players.get_mut(&a).unwrap();
            p.primary = Some(WeaponId::Awp);
            p.primary_ammo = AmmoState::full(WeaponId::Awp);
            p.armor = 100;
            p.has_helmet = true;
            p.grenades.flash = 2;
        }

        let snapshot = RoomSnapshot::capture(&room);
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: RoomSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);

        let player = back.players.iter().find(|p| p.id == a).unwrap();
        assert_eq!(player.primary, Some(WeaponId::Awp));
        assert_eq!(player.primary_ammo.clip, 10);
        assert_eq!(player.grenades.flash, 2);
    }

    #[test]
    fn test_first_delta_reports_everything() {
        let cfg = RoomConfig::default();
        let (room, _, _) = room_with_two(&cfg);
        let mut tracker = DeltaTracker::new();

        let delta = tracker.delta(&room, Vec::new());
        assert_eq!(delta.players.len(), 2);
        assert!(delta.round.is_some());
        assert!(delta.bomb.is_some());
    }

    #[test]
    fn test_delta_omits_unchanged_players() {
        let cfg = RoomConfig::default();
        let (mut room, a, b) = room_with_two(&cfg);
        let mut tracker = DeltaTracker::new();
        tracker.delta(&room, Vec::new());

        process_movement(&mut room, &cfg, a, &move_input(1, 3.0, 0.0)).unwrap();
        let delta = tracker.delta(&room, Vec::new());

        assert_eq!(delta.players.len(), 1);
        assert_eq!(delta.players[0].id, a);
        assert!(delta.round.is_none());
        assert!(delta.bomb.is_none());
        assert_eq!(delta.last_processed_input[&a], 1);
        assert_eq!(delta.last_processed_input[&b], 0);
    }

    #[test]
    fn test_delta_reports_removed_players() {
        let cfg = RoomConfig::default();
        let (mut room, _, b) = room_with_two(&cfg);
        let mut tracker = DeltaTracker::new();
        tracker.delta(&room, Vec::new());

        crate::game::actions::queue_removal(&mut room, b);
        crate::game::actions::apply_removals(&mut room);
        let events = room.take_events();
        let delta = tracker.delta(&room, events);

        assert_eq!(delta.removed, vec![b]);
    }

    #[test]
    fn test_flash_blind_shows_in_next_delta() {
        use crate::game::state::GrenadeProjectile;
        use crate::game::weapons::GrenadeKind;

        let cfg = RoomConfig::default();
        let (mut room, a, b) = room_with_two(&cfg);
        room.phase = RoundPhase::Live;
        room.phase_time_left = cfg.round_time;
        let mut tracker = DeltaTracker::new();
        tracker.delta(&room, Vec::new());

        let burst = room.players[&b].position;
        room.grenades.push(GrenadeProjectile {
            kind: GrenadeKind::Flash,
            position: burst,
            velocity: Vec2::ZERO,
            fuse: 0.01,
            thrower: a,
        });
        let summary = advance(&mut room, &cfg);

        let delta = tracker.delta(&room, summary.events);
        let flashed = delta
            .players
            .iter()
            .find(|p| p.id == b)
            .expect("flashed player must appear in the delta");
        assert!(flashed.blinded_until_ms > delta.timestamp_ms);
        // The thrower was out of the burst radius and stays omitted.
        assert!(!delta.players.iter().any(|p| p.id == a));
    }

    // A minimal predicting client: applies inputs optimistically, then on
    // each server delta rolls back to the acknowledged position and
    // replays every input the server has not seen yet.
    struct MockClient {
        id: PlayerId,
        predicted: Vec2,
        pending: Vec<MoveInput>,
        next_seq: u32,
    }

    impl MockClient {
        fn new(id: PlayerId, spawn: Vec2) -> Self {
            Self {
                id,
                predicted: spawn,
                pending: Vec::new(),
                next_seq: 1,
            }
        }

        fn press(&mut self, dx: f32, dy: f32) -> MoveInput {
            let input = move_input(self.next_seq, dx, dy);
            self.next_seq += 1;
            // Optimistic prediction: small steps are below the speed clamp.
            self.predicted = self.predicted + Vec2::new(dx, dy);
            self.pending.push(input);
            input
        }

        fn reconcile(&mut self, delta: &StateDelta) {
            let Some(&acked) = delta.last_processed_input.get(&self.id) else {
                return;
            };
            let Some(authoritative) = delta
                .players
                .iter()
                .find(|p| p.id == self.id)
                .map(|p| p.position)
            else {
                return;
            };
            self.pending.retain(|input| input.seq > acked);
            // Rollback to the server's position, replay the rest.
            self.predicted = authoritative;
            for input in &self.pending {
                self.predicted = self.predicted + Vec2::new(input.dx, input.dy);
            }
        }
    }

    #[test]
    fn test_client_rollback_replay_converges() {
        let cfg = RoomConfig::default();
        let (mut room, a, _) = room_with_two(&cfg);
        // Leave warmup so ticks inside the test don't respawn anyone.
        advance(&mut room, &cfg);
        let spawn = room.players[&a].position;
        let mut tracker = DeltaTracker::new();
        tracker.delta(&room, Vec::new());

        let mut client = MockClient::new(a, spawn);
        let inputs: Vec<MoveInput> = (0..4).map(|_| client.press(3.0, 0.0)).collect();

        // Only the first two inputs reach the server before the tick.
        for input in &inputs[..2] {
            process_movement(&mut room, &cfg, a, input).unwrap();
        }
        advance(&mut room, &cfg);
        let delta = tracker.delta(&room, Vec::new());
        assert_eq!(delta.last_processed_input[&a], 2);

        // After rollback and replay the client is two inputs ahead of the
        // server, exactly where its unacked presses put it.
        client.reconcile(&delta);
        assert_eq!(client.predicted, spawn + Vec2::new(12.0, 0.0));

        // The stragglers arrive; the next delta fully converges the two.
        for input in &inputs[2..] {
            process_movement(&mut room, &cfg, a, input).unwrap();
        }
        advance(&mut room, &cfg);
        let delta = tracker.delta(&room, Vec::new());
        client.reconcile(&delta);

        assert_eq!(client.predicted, room.players[&a].position);
        assert!(client.pending.is_empty());
        assert_eq!(delta.last_processed_input[&a], 4);
    }

    #[test]
    fn test_stale_input_rejected_after_reorder() {
        let cfg = RoomConfig::default();
        let (mut room, a, _) = room_with_two(&cfg);

        process_movement(&mut room, &cfg, a, &move_input(2, 3.0, 0.0)).unwrap();
        let stale = process_movement(&mut room, &cfg, a, &move_input(1, 3.0, 0.0));
        assert!(stale.is_err());
        assert_eq!(room.players[&a].last_input_seq, 2);
    }
}
