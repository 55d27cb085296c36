//! Strike2D Game Server
//!
//! Authoritative server binary. Without a transport configured it runs a
//! scripted demo round against the engine so the simulation can be
//! watched end to end from the logs.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use strike2d::game::actions::{self, CommandAck};
use strike2d::game::input::{MoveInput, PlayerCommand};
use strike2d::game::map::MapLayout;
use strike2d::game::state::{PlayerId, RoomState, RoundPhase, Team};
use strike2d::game::tick::{advance, RoomConfig};
use strike2d::game::{BombState, GameEventData};
use strike2d::{Vec2, VERSION};

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Strike2D Server v{}", VERSION);
    demo_round()?;
    Ok(())
}

/// Driver state for one scripted player.
struct Bot {
    id: PlayerId,
    next_seq: u32,
    planting: bool,
}

impl Bot {
    fn move_toward(&mut self, room: &mut RoomState, cfg: &RoomConfig, target: Vec2) {
        let Some(player) = room.players.get(&self.id) else {
            return;
        };
        if !player.alive || self.planting {
            return;
        }
        let delta = target - player.position;
        if delta.length() < 5.0 {
            return;
        }
        let step = delta.normalize() * 10.0;
        self.next_seq += 1;
        let input = MoveInput {
            seq: self.next_seq,
            dx: step.x,
            dy: step.y,
            aim_angle: step.y.atan2(step.x),
            walk: false,
            crouch: false,
        };
        // Blocked steps are fine; the bot just tries again next tick.
        let _ = actions::process_movement(room, cfg, self.id, &input);
    }

    fn shoot_at(&mut self, room: &mut RoomState, cfg: &RoomConfig, target: Vec2) {
        let Some(player) = room.players.get(&self.id) else {
            return;
        };
        if !player.alive {
            return;
        }
        let aim = target - player.position;
        let angle = aim.y.atan2(aim.x);
        let now = room.clock_ms;
        if let Ok(CommandAck::Shot(result)) = actions::dispatch(
            room,
            cfg,
            self.id,
            &PlayerCommand::Shoot {
                angle,
                client_timestamp: now,
            },
        ) {
            if let Some(hit) = result.hit {
                info!(
                    shooter = %self.id.to_uuid_string(),
                    victim = %hit.victim.to_uuid_string(),
                    damage = hit.damage,
                    headshot = hit.headshot,
                    "hit"
                );
            }
        }
    }
}

/// Run one scripted round: Ts push to site A and plant, CTs rotate in and
/// contest.
fn demo_round() -> Result<()> {
    let cfg = RoomConfig {
        freeze_time: 2.0,
        round_time: 60.0,
        ..RoomConfig::default()
    };
    let mut room = RoomState::new(MapLayout::dust());

    let mut bots: Vec<Bot> = Vec::new();
    for n in 0..4 {
        let id = PlayerId::random();
        let team = actions::add_player(&mut room, &cfg, id, format!("bot-{n}"))
            .map_err(|e| anyhow::anyhow!("demo join failed: {e}"))?;
        info!(player = %id.to_uuid_string(), team = ?team, "bot joined");
        bots.push(Bot {
            id,
            next_seq: 0,
            planting: false,
        });
    }

    let site = room.map.bombsites[0].center;
    let max_ticks = (cfg.round_time as u32 + 30) * cfg.tick_rate;

    for _ in 0..max_ticks {
        if room.phase == RoundPhase::Live {
            script_live_tick(&mut room, &cfg, &mut bots, site);
        }

        let summary = advance(&mut room, &cfg);
        let mut round_over = false;
        for event in &summary.events {
            match &event.data {
                GameEventData::BombPlanted { site, time_left, .. } => {
                    info!(site = ?site, time_left, "bomb planted");
                }
                GameEventData::PlayerKilled { victim, killer, .. } => {
                    info!(
                        victim = %victim.to_uuid_string(),
                        killer = ?killer.map(|k| k.to_uuid_string()),
                        "kill"
                    );
                }
                GameEventData::RoundEnded {
                    winner,
                    reason,
                    score_ct,
                    score_t,
                } => {
                    info!(winner = ?winner, reason = ?reason, score_ct, score_t, "round over");
                    round_over = true;
                }
                _ => {}
            }
        }
        if round_over {
            break;
        }
    }

    info!(
        score_ct = room.scores.ct.rounds_won,
        score_t = room.scores.t.rounds_won,
        "demo finished"
    );
    Ok(())
}

fn script_live_tick(room: &mut RoomState, cfg: &RoomConfig, bots: &mut [Bot], site: Vec2) {
    let carrier = room.bomb_carrier();
    let positions: Vec<(PlayerId, Team, Vec2, bool)> = room
        .players
        .values()
        .map(|p| (p.id, p.team, p.position, p.alive))
        .collect();

    for bot in bots.iter_mut() {
        let Some(&(_, team, position, alive)) = positions.iter().find(|(id, ..)| *id == bot.id)
        else {
            continue;
        };
        if !alive {
            continue;
        }

        // The carrier plants once inside the site; everyone else converges
        // on it and fires at the nearest enemy in view.
        if carrier == Some(bot.id) && room.map.site_at(position).is_some() {
            if !bot.planting
                && actions::dispatch(room, cfg, bot.id, &PlayerCommand::PlantBomb).is_ok()
            {
                bot.planting = true;
            }
            continue;
        }
        if matches!(room.bomb, BombState::Planted { .. })
            && team == Team::Ct
            && position.distance(site) <= cfg.bomb.defuse_range
        {
            let _ = actions::dispatch(
                room,
                cfg,
                bot.id,
                &PlayerCommand::DefuseBomb { active: true },
            );
            continue;
        }

        bot.move_toward(room, cfg, site);

        let enemy = positions
            .iter()
            .filter(|(id, t, _, a)| *a && *t != team && *id != bot.id)
            .min_by(|a, b| {
                let da = a.2.distance_squared(position);
                let db = b.2.distance_squared(position);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            });
        if let Some(&(_, _, enemy_pos, _)) = enemy {
            if enemy_pos.distance(position) < 400.0 {
                bot.shoot_at(room, cfg, enemy_pos);
            }
        }
    }
}
