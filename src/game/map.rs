//! Map Geometry
//!
//! Static world data for a room: playable bounds, solid wall rectangles,
//! bombsites and team spawn points, plus the intersection helpers used by
//! movement validation and shot rays.

use serde::{Deserialize, Serialize};

use crate::core::vec2::Vec2;

/// Bombsite identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteId {
    /// Site A
    A,
    /// Site B
    B,
}

/// Axis-aligned rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Minimum corner
    pub min: Vec2,
    /// Maximum corner
    pub max: Vec2,
}

impl Rect {
    /// Construct from corner coordinates.
    pub const fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min: Vec2::new(min_x, min_y),
            max: Vec2::new(max_x, max_y),
        }
    }

    /// Point containment (inclusive).
    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Circle overlap test (closest-point distance).
    pub fn intersects_circle(&self, center: Vec2, radius: f32) -> bool {
        let cx = center.x.clamp(self.min.x, self.max.x);
        let cy = center.y.clamp(self.min.y, self.max.y);
        Vec2::new(cx, cy).distance_squared(center) <= radius * radius
    }

    /// Slab test: first intersection of the segment `from..to` with this
    /// rectangle, returned as a fraction `t` of the segment, or None.
    pub fn segment_entry(&self, from: Vec2, to: Vec2) -> Option<f32> {
        let d = to - from;
        let mut t_min: f32 = 0.0;
        let mut t_max: f32 = 1.0;

        for axis in 0..2 {
            let (origin, dir, lo, hi) = if axis == 0 {
                (from.x, d.x, self.min.x, self.max.x)
            } else {
                (from.y, d.y, self.min.y, self.max.y)
            };

            if dir.abs() < 1e-9 {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / dir;
            let mut t0 = (lo - origin) * inv;
            let mut t1 = (hi - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min)
    }
}

/// A circular bomb plant zone.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BombSite {
    /// Site label
    pub id: SiteId,
    /// Zone center
    pub center: Vec2,
    /// Zone radius
    pub radius: f32,
}

impl BombSite {
    /// Whether a position is inside the plant zone.
    #[inline]
    pub fn contains(&self, position: Vec2) -> bool {
        self.center.distance_squared(position) <= self.radius * self.radius
    }
}

/// Static geometry for one map.
#[derive(Clone, Debug)]
pub struct MapLayout {
    /// Map name
    pub name: &'static str,
    /// Playable bounds
    pub bounds: Rect,
    /// Margin kept clear between players and the outer bound
    pub bounds_margin: f32,
    /// Solid obstacles
    pub walls: Vec<Rect>,
    /// Bomb plant zones
    pub bombsites: [BombSite; 2],
    /// CT spawn positions
    pub ct_spawns: Vec<Vec2>,
    /// T spawn positions
    pub t_spawns: Vec<Vec2>,
}

impl MapLayout {
    /// The default desert map: 1280x720 arena, center cover, two sites.
    pub fn dust() -> Self {
        Self {
            name: "dust",
            bounds: Rect::new(0.0, 0.0, 1280.0, 720.0),
            bounds_margin: 20.0,
            walls: vec![
                // Mid double crates
                Rect::new(560.0, 280.0, 720.0, 330.0),
                Rect::new(560.0, 390.0, 720.0, 440.0),
                // Site A entrance wall
                Rect::new(330.0, 60.0, 360.0, 300.0),
                // Site B entrance wall
                Rect::new(880.0, 420.0, 910.0, 660.0),
            ],
            bombsites: [
                BombSite {
                    id: SiteId::A,
                    center: Vec2::new(200.0, 200.0),
                    radius: 80.0,
                },
                BombSite {
                    id: SiteId::B,
                    center: Vec2::new(1000.0, 500.0),
                    radius: 80.0,
                },
            ],
            ct_spawns: vec![
                Vec2::new(1150.0, 150.0),
                Vec2::new(1190.0, 200.0),
                Vec2::new(1110.0, 200.0),
                Vec2::new(1150.0, 250.0),
                Vec2::new(1190.0, 120.0),
            ],
            t_spawns: vec![
                Vec2::new(130.0, 570.0),
                Vec2::new(90.0, 620.0),
                Vec2::new(170.0, 620.0),
                Vec2::new(130.0, 670.0),
                Vec2::new(90.0, 540.0),
            ],
        }
    }

    /// A body of `radius` can stand at `position`: inside the margin-shrunk
    /// bounds and clear of every wall.
    pub fn is_walkable(&self, position: Vec2, radius: f32) -> bool {
        let margin = self.bounds_margin;
        if position.x < self.bounds.min.x + margin
            || position.x > self.bounds.max.x - margin
            || position.y < self.bounds.min.y + margin
            || position.y > self.bounds.max.y - margin
        {
            return false;
        }
        !self
            .walls
            .iter()
            .any(|wall| wall.intersects_circle(position, radius))
    }

    /// Distance along the ray `from -> from + dir * max_dist` to the first
    /// wall, if any. Used to cut shot rays and tracer lifetimes.
    pub fn ray_wall_distance(&self, from: Vec2, dir: Vec2, max_dist: f32) -> Option<f32> {
        let to = from + dir * max_dist;
        self.walls
            .iter()
            .filter_map(|wall| wall.segment_entry(from, to))
            .fold(None, |best: Option<f32>, t| match best {
                Some(b) if b <= t => Some(b),
                _ => Some(t),
            })
            .map(|t| t * max_dist)
    }

    /// The bombsite containing `position`, if any.
    pub fn site_at(&self, position: Vec2) -> Option<SiteId> {
        self.bombsites
            .iter()
            .find(|site| site.contains(position))
            .map(|site| site.id)
    }

    /// Spawn position for the nth player of a team (round-robin).
    pub fn spawn_for(&self, ct: bool, index: usize) -> Vec2 {
        let spawns = if ct { &self.ct_spawns } else { &self.t_spawns };
        spawns[index % spawns.len()]
    }
}

// =============================================================================
// TESTS
// =============================================================================
