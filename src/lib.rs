//! # Strike2D Game Server
//!
//! Authoritative simulation core for a real-time 2D tactical shooter.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     STRIKE2D SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Allocation & indexing primitives          │
//! │  ├── vec2.rs     - 2D vector math                            │
//! │  ├── pool.rs     - Slot-keyed object pool                    │
//! │  └── grid.rs     - Uniform-cell spatial hash grid            │
//! │                                                              │
//! │  game/           - Per-room simulation (single-owner)        │
//! │  ├── weapons.rs  - Weapon catalog, damage resolution         │
//! │  ├── economy.rs  - Money rules, round rewards                │
//! │  ├── map.rs      - Static geometry, bombsites, spawns        │
//! │  ├── state.rs    - Player, bullet and room state             │
//! │  ├── bomb.rs     - Plant/defuse/timer state machine          │
//! │  ├── input.rs    - Typed player commands                     │
//! │  ├── actions.rs  - Command validation and application        │
//! │  ├── tick.rs     - Fixed-step world advance                  │
//! │  ├── events.rs   - Game events emitted per tick              │
//! │  └── snapshot.rs - Full snapshot / delta construction        │
//! │                                                              │
//! │  net/            - Concurrency boundary                      │
//! │  ├── protocol.rs - Client/server message types               │
//! │  ├── room.rs     - Room actor: queue, sessions, tick glue    │
//! │  ├── directory.rs- Room registry and player assignment       │
//! │  └── scheduler.rs- Per-room fixed-interval tick loop         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority Model
//!
//! The server owns the only trusted copy of game state. Clients send
//! sequence-numbered inputs; the engine validates each one against the
//! current room state and either applies it or returns a failure result.
//! Every room is advanced by exactly one tick loop, so game state is
//! never mutated concurrently. Lag-compensated hit detection rewinds
//! target positions to the shooter's perceived timeline before testing.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod net;

// Re-export commonly used types
pub use core::grid::SpatialGrid;
pub use core::pool::{ObjectPool, PoolKey, Poolable};
pub use core::vec2::Vec2;
pub use game::state::{PlayerId, PlayerState, RoomState, Team};
pub use game::tick::RoomConfig;
pub use game::weapons::{calculate_damage, WeaponId};
pub use net::directory::RoomDirectory;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default simulation tick rate (Hz)
pub const DEFAULT_TICK_RATE: u32 = 30;

/// Player collision radius (world units)
pub const PLAYER_RADIUS: f32 = 15.0;
