//! Allocation and indexing primitives.
//!
//! Room-local building blocks: vector math, a slot-keyed object pool for
//! short-lived entities, and a uniform-cell spatial hash for proximity
//! queries. None of these are thread-safe; each instance is owned by a
//! single room's tick loop.

pub mod grid;
pub mod pool;
pub mod vec2;

// Re-export core types
pub use grid::SpatialGrid;
pub use pool::{ObjectPool, PoolKey, Poolable};
pub use vec2::Vec2;
