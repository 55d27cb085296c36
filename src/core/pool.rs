//! Object Pool
//!
//! Slot-keyed allocation arena for short-lived entities (bullets, grenade
//! projectiles). Slots are reused instead of reallocated; keys carry a
//! generation counter so a stale or repeated `release` is a harmless no-op
//! instead of corrupting the free list.

use serde::Serialize;
use tracing::warn;

/// Types that can live in an [`ObjectPool`].
///
/// `reset` returns the value to a neutral state when its slot is released.
pub trait Poolable: Default {
    /// Clear mutable fields back to the neutral state.
    fn reset(&mut self);
}

/// Handle to an active pool slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PoolKey {
    index: u32,
    generation: u32,
}

struct Slot<T> {
    value: T,
    generation: u32,
    active: bool,
}

/// Utilization counters for monitoring and capacity tuning.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct PoolStats {
    /// Total slots ever allocated
    pub created: u64,
    /// Acquires served from a freed slot
    pub reused: u64,
    /// Successful releases
    pub released: u64,
    /// Currently checked-out slots
    pub active: usize,
    /// Currently free slots
    pub pooled: usize,
    /// High-water mark of simultaneously active slots
    pub peak_active: usize,
}

/// Fixed-purpose object pool with O(1) acquire and release.
///
/// Pools are per-room and owned by the room's tick loop; they are not
/// thread-safe.
pub struct ObjectPool<T: Poolable> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    max_size: usize,
    stats: PoolStats,
}

impl<T: Poolable> ObjectPool<T> {
    /// Create a pool with `initial` pre-allocated slots and a soft `max_size`
    /// cap. Growing past the cap is allowed but logged.
    pub fn new(initial: usize, max_size: usize) -> Self {
        let mut pool = Self {
            slots: Vec::with_capacity(initial),
            free: Vec::with_capacity(initial),
            max_size,
            stats: PoolStats::default(),
        };
        pool.pre_warm(initial);
        pool
    }

    /// Grow the free list to at least `size` total slots.
    pub fn pre_warm(&mut self, size: usize) {
        while self.slots.len() < size {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                value: T::default(),
                generation: 0,
                active: false,
            });
            self.free.push(index);
            self.stats.created += 1;
        }
        self.stats.pooled = self.free.len();
    }

    /// Check out a slot, reusing a freed one when available.
    pub fn acquire(&mut self) -> PoolKey {
        let index = match self.free.pop() {
            Some(index) => {
                self.stats.reused += 1;
                index
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    value: T::default(),
                    generation: 0,
                    active: false,
                });
                self.stats.created += 1;
                if self.slots.len() > self.max_size {
                    warn!(
                        size = self.slots.len(),
                        max = self.max_size,
                        "object pool grew past its soft cap"
                    );
                }
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.active = true;
        self.stats.active += 1;
        self.stats.pooled = self.free.len();
        if self.stats.active > self.stats.peak_active {
            self.stats.peak_active = self.stats.active;
        }

        PoolKey {
            index,
            generation: slot.generation,
        }
    }

    /// Return a slot to the pool. Stale keys and double releases are
    /// logged no-ops.
    pub fn release(&mut self, key: PoolKey) {
        let Some(slot) = self.slots.get_mut(key.index as usize) else {
            warn!(index = key.index, "release of key not from this pool");
            return;
        };
        if !slot.active || slot.generation != key.generation {
            warn!(
                index = key.index,
                "release of stale or already-freed pool key"
            );
            return;
        }

        slot.value.reset();
        slot.active = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.stats.released += 1;
        self.stats.active -= 1;
        self.stats.pooled = self.free.len();
    }

    /// Reclaim every active slot at once (round reset).
    pub fn release_all(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.active {
                slot.value.reset();
                slot.active = false;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                self.stats.released += 1;
            }
        }
        self.stats.active = 0;
        self.stats.pooled = self.free.len();
    }

    /// Access an active slot.
    pub fn get(&self, key: PoolKey) -> Option<&T> {
        let slot = self.slots.get(key.index as usize)?;
        (slot.active && slot.generation == key.generation).then_some(&slot.value)
    }

    /// Mutable access to an active slot.
    pub fn get_mut(&mut self, key: PoolKey) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        (slot.active && slot.generation == key.generation).then_some(&mut slot.value)
    }

    /// Iterate over active slots.
    pub fn iter(&self) -> impl Iterator<Item = (PoolKey, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.active.then_some((
                PoolKey {
                    index: index as u32,
                    generation: slot.generation,
                },
                &slot.value,
            ))
        })
    }

    /// Iterate mutably over active slots.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PoolKey, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.active.then_some((
                    PoolKey {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    &mut slot.value,
                ))
            })
    }

    /// Keys of all active slots.
    pub fn active_keys(&self) -> Vec<PoolKey> {
        self.iter().map(|(key, _)| key).collect()
    }

    /// Number of active slots.
    pub fn active_count(&self) -> usize {
        self.stats.active
    }

    /// Current utilization counters.
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Fraction of acquires served without a fresh allocation.
    pub fn reuse_rate(&self) -> f32 {
        let total = self.stats.reused + self.stats.created;
        if total == 0 {
            return 0.0;
        }
        self.stats.reused as f32 / total as f32
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Dummy {
        value: u32,
    }

    impl Poolable for Dummy {
        fn reset(&mut self) {
            self.value = 0;
        }
    }

    #[test]
    fn test_acquire_reuses_released_slot() {
        let mut pool: ObjectPool<Dummy> = ObjectPool::new(0, 16);

        let a = pool.acquire();
        pool.get_mut(a).unwrap().value = 42;
        pool.release(a);

        let b = pool.acquire();
        // Same slot, reset state, new generation.
        assert_eq!(pool.get(b).unwrap().value, 0);
        assert_eq!(pool.stats().created, 1);
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn test_double_release_is_noop() {
        let mut pool: ObjectPool<Dummy> = ObjectPool::new(0, 16);

        let key = pool.acquire();
        pool.release(key);
        pool.release(key);

        assert_eq!(pool.stats().released, 1);
        assert_eq!(pool.stats().pooled, 1);
        assert_eq!(pool.active_count(), 0);

        // Free list must not contain the slot twice.
        let a = pool.acquire();
        let b = pool.acquire();
        assert_ne!(a, b);
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn test_stale_key_rejected_after_reuse() {
        let mut pool: ObjectPool<Dummy> = ObjectPool::new(1, 16);

        let old = pool.acquire();
        pool.release(old);
        let new = pool.acquire();

        // Old key refers to a recycled slot.
        assert!(pool.get(old).is_none());
        assert!(pool.get(new).is_some());
        pool.release(old);
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn test_release_all() {
        let mut pool: ObjectPool<Dummy> = ObjectPool::new(0, 16);
        let keys: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        assert_eq!(pool.active_count(), 5);

        pool.release_all();
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.stats().pooled, 5);
        for key in keys {
            assert!(pool.get(key).is_none());
        }
    }

    #[test]
    fn test_peak_active_tracking() {
        let mut pool: ObjectPool<Dummy> = ObjectPool::new(0, 16);
        let keys: Vec<_> = (0..4).map(|_| pool.acquire()).collect();
        for key in &keys[..3] {
            pool.release(*key);
        }
        pool.acquire();

        assert_eq!(pool.stats().peak_active, 4);
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn test_grow_past_soft_cap() {
        let mut pool: ObjectPool<Dummy> = ObjectPool::new(0, 2);
        let keys: Vec<_> = (0..4).map(|_| pool.acquire()).collect();
        // Growth is degraded-graceful, never fatal.
        assert_eq!(keys.len(), 4);
        assert_eq!(pool.active_count(), 4);
    }

    #[test]
    fn test_iter_visits_only_active() {
        let mut pool: ObjectPool<Dummy> = ObjectPool::new(0, 16);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);

        let visited: Vec<_> = pool.iter().map(|(key, _)| key).collect();
        assert_eq!(visited, vec![b]);
    }
}
