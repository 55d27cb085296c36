//! Network Layer
//!
//! The concurrency boundary around the simulation: wire message types,
//! the per-room actor and its command queue, room placement, and the
//! fixed-interval tick scheduler. Transports (WebSocket, TCP) sit above
//! this module and only ever touch channels.

pub mod directory;
pub mod protocol;
pub mod room;
pub mod scheduler;

pub use directory::{DirectoryError, RoomDirectory, RoomRegistry};
pub use protocol::{ClientMessage, ServerMessage};
pub use room::{Room, RoomError, RoomId};
pub use scheduler::spawn_room_loop;
