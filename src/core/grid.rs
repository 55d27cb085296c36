//! Spatial Hash Grid
//!
//! Uniform-cell spatial index for proximity and broad-phase collision
//! queries. Entities are hashed into fixed-size square cells; an entity
//! occupies every cell its bounding circle overlaps, so queries never miss
//! a body straddling a cell border.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::Serialize;

use super::vec2::Vec2;

type CellCoord = (i32, i32);

struct GridEntry {
    position: Vec2,
    radius: f32,
    cells: Vec<CellCoord>,
}

/// Occupancy counters for monitoring.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct GridStats {
    /// Tracked entities
    pub entities: usize,
    /// Non-empty cells
    pub occupied_cells: usize,
    /// Average entities per non-empty cell
    pub avg_per_cell: f32,
}

/// Uniform-cell spatial hash keyed by an entity id.
///
/// Not thread-safe; owned by a single room's tick loop.
pub struct SpatialGrid<K: Copy + Eq + Hash> {
    cell_size: f32,
    cells: HashMap<CellCoord, Vec<K>>,
    entities: HashMap<K, GridEntry>,
}

impl<K: Copy + Eq + Hash> SpatialGrid<K> {
    /// Create a grid with the given square cell size.
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(1.0),
            cells: HashMap::new(),
            entities: HashMap::new(),
        }
    }

    /// Recommended cell size for an observed average entity size:
    /// roughly 2.5x the entity diameter, clamped to a sane range.
    pub fn suggest_cell_size(avg_entity_size: f32) -> f32 {
        (avg_entity_size * 2.5).clamp(50.0, 500.0)
    }

    /// Cells overlapped by a circle at `position` with `radius`.
    fn cells_for(&self, position: Vec2, radius: f32) -> Vec<CellCoord> {
        let min_x = ((position.x - radius) / self.cell_size).floor() as i32;
        let max_x = ((position.x + radius) / self.cell_size).floor() as i32;
        let min_y = ((position.y - radius) / self.cell_size).floor() as i32;
        let max_y = ((position.y + radius) / self.cell_size).floor() as i32;

        let mut cells = Vec::with_capacity(((max_x - min_x + 1) * (max_y - min_y + 1)) as usize);
        for cx in min_x..=max_x {
            for cy in min_y..=max_y {
                cells.push((cx, cy));
            }
        }
        cells
    }

    /// Track an entity. Re-inserting an existing id moves it.
    pub fn insert(&mut self, id: K, position: Vec2, radius: f32) {
        if self.entities.contains_key(&id) {
            self.remove(id);
        }

        let cells = self.cells_for(position, radius);
        for cell in &cells {
            self.cells.entry(*cell).or_default().push(id);
        }
        self.entities.insert(
            id,
            GridEntry {
                position,
                radius,
                cells,
            },
        );
    }

    /// Stop tracking an entity. Unknown ids are ignored.
    pub fn remove(&mut self, id: K) {
        let Some(entry) = self.entities.remove(&id) else {
            return;
        };
        for cell in &entry.cells {
            if let Some(ids) = self.cells.get_mut(cell) {
                ids.retain(|other| *other != id);
                if ids.is_empty() {
                    self.cells.remove(cell);
                }
            }
        }
    }

    /// Move an entity. Cell membership is only rewritten when the occupied
    /// cell set actually changed, so small movements are cheap.
    pub fn update(&mut self, id: K, position: Vec2) {
        let Some(entry) = self.entities.get(&id) else {
            return;
        };

        let new_cells = self.cells_for(position, entry.radius);
        if new_cells == entry.cells {
            // Same cells; just record the position.
            if let Some(entry) = self.entities.get_mut(&id) {
                entry.position = position;
            }
            return;
        }

        let radius = entry.radius;
        self.remove(id);
        self.insert(id, position, radius);
    }

    /// Entities whose body circle intersects the query circle.
    ///
    /// Broad-phase over the bounding square of cells, then an exact
    /// Euclidean filter to drop corner-cell false positives.
    pub fn query_nearby(&self, center: Vec2, radius: f32) -> Vec<K> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();

        for cell in self.cells_for(center, radius) {
            let Some(ids) = self.cells.get(&cell) else {
                continue;
            };
            for id in ids {
                if !seen.insert(*id) {
                    continue;
                }
                let entry = &self.entities[id];
                let reach = radius + entry.radius;
                if entry.position.distance_squared(center) <= reach * reach {
                    result.push(*id);
                }
            }
        }
        result
    }

    /// Entities whose center lies inside the axis-aligned rectangle
    /// (inclusive), expanded by each entity's radius.
    pub fn query_rect(&self, min: Vec2, max: Vec2) -> Vec<K> {
        let center = Vec2::new((min.x + max.x) * 0.5, (min.y + max.y) * 0.5);
        let half = Vec2::new((max.x - min.x) * 0.5, (max.y - min.y) * 0.5);

        let mut seen = HashSet::new();
        let mut result = Vec::new();

        let bound_radius = half.length();
        for cell in self.cells_for(center, bound_radius) {
            let Some(ids) = self.cells.get(&cell) else {
                continue;
            };
            for id in ids {
                if !seen.insert(*id) {
                    continue;
                }
                let entry = &self.entities[id];
                if entry.position.x + entry.radius >= min.x
                    && entry.position.x - entry.radius <= max.x
                    && entry.position.y + entry.radius >= min.y
                    && entry.position.y - entry.radius <= max.y
                {
                    result.push(*id);
                }
            }
        }
        result
    }

    /// All other entities sharing at least one cell with `id`
    /// (broad-phase candidates for exact narrow-phase checks).
    pub fn get_potential_collisions(&self, id: K) -> Vec<K> {
        let Some(entry) = self.entities.get(&id) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for cell in &entry.cells {
            if let Some(ids) = self.cells.get(cell) {
                for other in ids {
                    if *other != id && seen.insert(*other) {
                        result.push(*other);
                    }
                }
            }
        }
        result
    }

    /// Last recorded position of an entity.
    pub fn position_of(&self, id: K) -> Option<Vec2> {
        self.entities.get(&id).map(|entry| entry.position)
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when no entities are tracked.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Drop all entities and cells.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.entities.clear();
    }

    /// Occupancy counters.
    pub fn stats(&self) -> GridStats {
        let occupied = self.cells.len();
        let total: usize = self.cells.values().map(Vec::len).sum();
        GridStats {
            entities: self.entities.len(),
            occupied_cells: occupied,
            avg_per_cell: if occupied == 0 {
                0.0
            } else {
                total as f32 / occupied as f32
            },
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
