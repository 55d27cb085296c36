//! Tick Scheduler
//!
//! One fixed-interval loop per room. A tick that overruns its budget is
//! logged and the following interval fires immediately; intervals the
//! process slept through are skipped rather than replayed, so the room
//! never burst-simulates to catch up.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::net::room::Room;

/// Spawn the tick loop for a room. The task runs until
/// [`Room::shutdown`](crate::net::room::Room::shutdown) is called.
pub fn spawn_room_loop(room: Arc<Room>) -> JoinHandle<()> {
    let mut shutdown = room.shutdown_signal();
    let tick_budget = Duration::from_millis(room.config.tick_ms());

    tokio::spawn(async move {
        let mut ticker = interval(tick_budget);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            room = %room.id.to_uuid_string(),
            tick_ms = tick_budget.as_millis() as u64,
            "tick loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = Instant::now();
                    room.run_tick().await;
                    let elapsed = started.elapsed();
                    if elapsed > tick_budget {
                        warn!(
                            room = %room.id.to_uuid_string(),
                            elapsed_ms = elapsed.as_millis() as u64,
                            budget_ms = tick_budget.as_millis() as u64,
                            "slow tick"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(room = %room.id.to_uuid_string(), "tick loop stopped");
                        break;
                    }
                }
            }
        }
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::PlayerId;
    use crate::game::tick::RoomConfig;
    use crate::net::protocol::ServerMessage;
    use crate::net::room::RoomId;
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_loop_ticks_and_stops_on_shutdown() {
        let config = RoomConfig {
            tick_rate: 100,
            ..RoomConfig::default()
        };
        let room = Room::new(RoomId::random(), config);
        let player = PlayerId::random();
        let (tx, mut rx) = mpsc::channel(256);
        room.join(player, "p".into(), tx).await.unwrap();
        rx.recv().await.unwrap(); // welcome
        rx.recv().await.unwrap(); // full state

        let handle = spawn_room_loop(room.clone());

        // Deltas arrive without anyone calling run_tick by hand.
        let first = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("tick loop should broadcast")
            .unwrap();
        assert!(matches!(first, ServerMessage::Delta(_)));

        room.shutdown();
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should stop after shutdown")
            .unwrap();
    }
}
