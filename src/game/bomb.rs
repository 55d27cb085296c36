//! Bomb State Machine
//!
//! Plant, arm, defuse and detonate. Progress only accrues while the acting
//! player stays alive and in place; any interruption resets progress to
//! zero with no partial credit.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::vec2::Vec2;
use crate::game::economy::{apply_money, RoundWinReason};
use crate::game::events::GameEventData;
use crate::game::map::SiteId;
use crate::game::state::{PlayerId, RoomState, Team};
use crate::game::tick::RoomConfig;

/// Bomb lifecycle. Exactly one variant is active per room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BombState {
    /// No bomb in play (warmup)
    Idle,
    /// Carried by a T player
    Carried {
        /// Carrier
        carrier: PlayerId,
    },
    /// Lying on the ground after a drop
    Dropped {
        /// Drop position
        position: Vec2,
    },
    /// Plant in progress
    Planting {
        /// Planter
        planter: PlayerId,
        /// Seconds of plant completed
        progress: f32,
        /// Target site
        site: SiteId,
        /// Anchor position; drifting away cancels the plant
        position: Vec2,
    },
    /// Armed and counting down
    Planted {
        /// Bomb position
        position: Vec2,
        /// Site it was planted at
        site: SiteId,
        /// Seconds until detonation
        time_left: f32,
        /// Who planted it
        planter: PlayerId,
    },
    /// Defuse in progress (timer keeps running)
    Defusing {
        /// Bomb position
        position: Vec2,
        /// Site
        site: SiteId,
        /// Seconds until detonation
        time_left: f32,
        /// Who planted it
        planter: PlayerId,
        /// Defuser
        defuser: PlayerId,
        /// Seconds of defuse completed
        progress: f32,
        /// Defuser carried a kit when the attempt started
        has_kit: bool,
    },
    /// Defused; CT round win
    Defused {
        /// Site it was planted at
        site: SiteId,
    },
    /// Detonated; T round win
    Exploded {
        /// Detonation point
        position: Vec2,
    },
}

/// Maximum drift from the plant anchor before the plant cancels.
const PLANT_DRIFT: f32 = 2.0;

/// Pickup radius for a dropped bomb.
pub const PICKUP_RADIUS: f32 = 30.0;

/// Advance the bomb by one tick.
pub fn tick_bomb(room: &mut RoomState, cfg: &RoomConfig) {
    let dt = cfg.dt();
    match room.bomb.clone() {
        BombState::Planting {
            planter,
            progress,
            site,
            position,
        } => {
            let still_planting = room
                .players
                .get(&planter)
                .map(|p| p.alive && p.position.distance(position) <= PLANT_DRIFT)
                .unwrap_or(false);

            if !still_planting {
                debug!(player = %planter.to_uuid_string(), "plant interrupted");
                room.bomb = BombState::Dropped { position };
                room.push_event(GameEventData::BombPlantCancelled { player_id: planter });
                return;
            }

            let progress = progress + dt;
            if progress >= cfg.bomb.plant_time {
                info!(site = ?site, "bomb planted");
                room.bomb = BombState::Planted {
                    position,
                    site,
                    time_left: cfg.bomb.timer,
                    planter,
                };
                if let Some(p) = room.players.get_mut(&planter) {
                    apply_money(&mut p.money, cfg.economy.plant_bonus, cfg.economy.max_money);
                }
                room.push_event(GameEventData::BombPlanted {
                    player_id: planter,
                    site,
                    time_left: cfg.bomb.timer,
                });
            } else {
                room.bomb = BombState::Planting {
                    planter,
                    progress,
                    site,
                    position,
                };
            }
        }

        BombState::Planted {
            position,
            site,
            time_left,
            planter,
        } => {
            let time_left = time_left - dt;
            if time_left <= 0.0 {
                explode(room, cfg, position);
            } else {
                room.bomb = BombState::Planted {
                    position,
                    site,
                    time_left,
                    planter,
                };
            }
        }

        BombState::Defusing {
            position,
            site,
            time_left,
            planter,
            defuser,
            progress,
            has_kit,
        } => {
            // The timer does not pause for a defuse attempt.
            let time_left = time_left - dt;
            if time_left <= 0.0 {
                explode(room, cfg, position);
                return;
            }

            let still_defusing = room
                .players
                .get(&defuser)
                .map(|p| p.alive && p.position.distance(position) <= cfg.bomb.defuse_range)
                .unwrap_or(false);

            if !still_defusing {
                debug!(player = %defuser.to_uuid_string(), "defuse interrupted, progress lost");
                room.bomb = BombState::Planted {
                    position,
                    site,
                    time_left,
                    planter,
                };
                room.push_event(GameEventData::BombDefuseCancelled { player_id: defuser });
                return;
            }

            let progress = progress + dt;
            let needed = if has_kit {
                cfg.bomb.defuse_time_kit
            } else {
                cfg.bomb.defuse_time
            };

            if progress >= needed {
                info!(player = %defuser.to_uuid_string(), "bomb defused");
                room.bomb = BombState::Defused { site };
                if let Some(p) = room.players.get_mut(&defuser) {
                    apply_money(&mut p.money, cfg.economy.defuse_bonus, cfg.economy.max_money);
                }
                room.push_event(GameEventData::BombDefused { player_id: defuser });
                room.round_outcome = Some((Team::Ct, RoundWinReason::BombDefused));
            } else {
                room.bomb = BombState::Defusing {
                    position,
                    site,
                    time_left,
                    planter,
                    defuser,
                    progress,
                    has_kit,
                };
            }
        }

        BombState::Dropped { position } => {
            // Any alive T walking over the bomb picks it up.
            let carrier = room
                .players
                .values()
                .find(|p| {
                    p.team == Team::T && p.alive && p.position.distance(position) <= PICKUP_RADIUS
                })
                .map(|p| p.id);
            if let Some(carrier) = carrier {
                debug!(player = %carrier.to_uuid_string(), "bomb picked up");
                room.bomb = BombState::Carried { carrier };
            }
        }

        _ => {}
    }
}

/// Detonate the bomb: splash damage with linear falloff, then a T round
/// win.
fn explode(room: &mut RoomState, cfg: &RoomConfig, position: Vec2) {
    info!("bomb exploded");
    room.bomb = BombState::Exploded { position };
    room.push_event(GameEventData::BombExploded { position });

    let radius = cfg.bomb.explosion_radius;
    let victims: Vec<(PlayerId, f32)> = room
        .players
        .values()
        .filter(|p| p.alive)
        .map(|p| (p.id, p.position.distance(position)))
        .filter(|(_, dist)| *dist < radius)
        .collect();

    for (id, dist) in victims {
        let damage = (cfg.bomb.explosion_damage * (1.0 - dist / radius)).round() as i32;
        let killed = room
            .players
            .get_mut(&id)
            .map(|p| p.take_damage(damage, 0))
            .unwrap_or(false);
        if killed {
            room.eliminate(id, None, &cfg.economy);
        }
    }

    room.round_outcome = Some((Team::T, RoundWinReason::BombExploded));
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::MapLayout;
    use crate::game::state::PlayerState;

    fn room_with_player(team: Team, position: Vec2) -> (RoomState, PlayerId) {
        let mut room = RoomState::new(MapLayout::dust());
        let player = PlayerState::new(PlayerId::random(), "p".into(), team, position, 800);
        let id = player.id;
        room.players.insert(id, player);
        (room, id)
    }

    fn one_second_config() -> RoomConfig {
        RoomConfig {
            tick_rate: 1,
            ..RoomConfig::default()
        }
    }

    #[test]
    fn test_plant_completes_after_duration() {
        let cfg = one_second_config();
        let site_center = Vec2::new(200.0, 200.0);
        let (mut room, id) = room_with_player(Team::T, site_center);
        room.bomb = BombState::Planting {
            planter: id,
            progress: 0.0,
            site: SiteId::A,
            position: site_center,
        };

        for _ in 0..3 {
            tick_bomb(&mut room, &cfg);
        }
        assert!(matches!(room.bomb, BombState::Planted { .. }));
        // Plant bonus paid out.
        assert_eq!(room.players[&id].money, 1100);
    }

    #[test]
    fn test_plant_cancelled_by_movement() {
        let cfg = one_second_config();
        let site_center = Vec2::new(200.0, 200.0);
        let (mut room, id) = room_with_player(Team::T, site_center);
        room.bomb = BombState::Planting {
            planter: id,
            progress: 0.0,
            site: SiteId::A,
            position: site_center,
        };

        tick_bomb(&mut room, &cfg);
        room.players.get_mut(&id).unwrap().position = Vec2::new(250.0, 200.0);
        tick_bomb(&mut room, &cfg);

        assert!(matches!(room.bomb, BombState::Dropped { .. }));
    }

    #[test]
    fn test_timer_expiry_explodes_with_splash() {
        let cfg = one_second_config();
        let bomb_pos = Vec2::new(200.0, 200.0);
        let (mut room, near) = room_with_player(Team::Ct, Vec2::new(300.0, 200.0));
        let far = PlayerState::new(
            PlayerId::random(),
            "far".into(),
            Team::Ct,
            Vec2::new(1100.0, 650.0),
            800,
        );
        let far_id = far.id;
        room.players.insert(far_id, far);
        room.bomb = BombState::Planted {
            position: bomb_pos,
            site: SiteId::A,
            time_left: 35.0,
            planter: PlayerId::random(),
        };

        for _ in 0..35 {
            tick_bomb(&mut room, &cfg);
        }

        assert!(matches!(room.bomb, BombState::Exploded { .. }));
        assert_eq!(room.round_outcome, Some((Team::T, RoundWinReason::BombExploded)));
        // 100 units out of 500: 400 damage, instantly lethal.
        let near = &room.players[&near];
        assert!(!near.alive);
        // Far CT is outside the blast radius.
        assert!(room.players[&far_id].alive);
    }

    #[test]
    fn test_defuse_with_kit_interrupted_resets_progress() {
        let cfg = one_second_config();
        let bomb_pos = Vec2::new(200.0, 200.0);
        let (mut room, ct) = room_with_player(Team::Ct, bomb_pos);
        room.bomb = BombState::Defusing {
            position: bomb_pos,
            site: SiteId::A,
            time_left: 45.0,
            planter: PlayerId::random(),
            defuser: ct,
            progress: 0.0,
            has_kit: true,
        };

        // Three seconds of progress, then the defuser walks away.
        for _ in 0..3 {
            tick_bomb(&mut room, &cfg);
        }
        room.players.get_mut(&ct).unwrap().position = Vec2::new(400.0, 200.0);
        tick_bomb(&mut room, &cfg);

        match &room.bomb {
            BombState::Planted { time_left, .. } => {
                // Bomb stays planted, timer kept running.
                assert!(*time_left < 45.0);
            }
            other => panic!("expected planted bomb, got {other:?}"),
        }

        // Restarting the defuse begins from zero.
        room.players.get_mut(&ct).unwrap().position = bomb_pos;
        let (time_left, planter) = match &room.bomb {
            BombState::Planted { time_left, planter, .. } => (*time_left, *planter),
            _ => unreachable!(),
        };
        room.bomb = BombState::Defusing {
            position: bomb_pos,
            site: SiteId::A,
            time_left,
            planter,
            defuser: ct,
            progress: 0.0,
            has_kit: true,
        };
        for _ in 0..5 {
            tick_bomb(&mut room, &cfg);
        }
        assert!(matches!(room.bomb, BombState::Defused { .. }));
        assert_eq!(room.round_outcome, Some((Team::Ct, RoundWinReason::BombDefused)));
    }

    #[test]
    fn test_dropped_bomb_pickup_by_t_only() {
        let cfg = one_second_config();
        let pos = Vec2::new(400.0, 400.0);
        let (mut room, ct) = room_with_player(Team::Ct, pos);
        room.bomb = BombState::Dropped { position: pos };

        tick_bomb(&mut room, &cfg);
        assert!(matches!(room.bomb, BombState::Dropped { .. }));

        let t = PlayerState::new(PlayerId::random(), "t".into(), Team::T, pos, 800);
        let t_id = t.id;
        room.players.insert(t_id, t);
        tick_bomb(&mut room, &cfg);
        assert_eq!(room.bomb, BombState::Carried { carrier: t_id });
        let _ = ct;
    }
}
