//! Weapon Catalog & Damage Resolution
//!
//! Static weapon/equipment data and the pure damage pipeline:
//! distance falloff, headshot multiplier, then armor absorption.
//! Values follow the classic tactical-shooter balance sheet.

use serde::{Deserialize, Serialize};

use crate::game::state::Team;

/// Base movement speed with a knife (world units per second).
pub const BASE_MOVE_SPEED: f32 = 250.0;

/// Speed multiplier while walking (silent movement).
pub const WALK_MULTIPLIER: f32 = 0.52;

/// Speed multiplier while crouching.
pub const CROUCH_MULTIPLIER: f32 = 0.34;

/// Weapon identifiers.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WeaponId {
    /// Melee, always carried
    #[default]
    Knife = 0,
    /// Glock-18 (T starting pistol)
    Glock = 1,
    /// USP-S (CT starting pistol)
    Usp = 2,
    /// Desert Eagle
    Deagle = 3,
    /// MP5-SD
    Mp5 = 4,
    /// AK-47 (T rifle)
    Ak47 = 5,
    /// M4A1-S (CT rifle)
    M4a1 = 6,
    /// AWP sniper rifle
    Awp = 7,
}

/// Broad weapon class, used for speed multipliers and kill rewards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponClass {
    /// Melee
    Knife,
    /// Sidearms
    Pistol,
    /// Submachine guns
    Smg,
    /// Assault rifles
    Rifle,
    /// Bolt-action snipers
    Sniper,
}

/// Static definition of one weapon.
#[derive(Clone, Copy, Debug)]
pub struct WeaponDef {
    /// Display name
    pub name: &'static str,
    /// Weapon class
    pub class: WeaponClass,
    /// Buy price
    pub cost: u32,
    /// Body damage at point blank
    pub base_damage: f32,
    /// Multiplier applied on headshots
    pub headshot_multiplier: f32,
    /// Fraction of damage passing through armor (1.0 = ignores armor)
    pub armor_penetration: f32,
    /// Minimum milliseconds between shots
    pub fire_interval_ms: u32,
    /// Rounds per magazine
    pub clip_size: u16,
    /// Reserve rounds granted on purchase
    pub reserve_ammo: u16,
    /// Reload duration in milliseconds
    pub reload_ms: u32,
    /// Full-damage range
    pub effective_range: f32,
    /// Range at which damage bottoms out at 50%
    pub max_range: f32,
    /// Movement speed multiplier while equipped
    pub speed_multiplier: f32,
    /// Tracer projectile speed (units/second)
    pub bullet_speed: f32,
    /// Sustained fire while the trigger is held
    pub automatic: bool,
    /// Money awarded per kill with this weapon
    pub kill_reward: i32,
}

/// The full weapon table, indexed by `WeaponId as usize`.
pub const WEAPONS: [WeaponDef; 8] = [
    WeaponDef {
        name: "Knife",
        class: WeaponClass::Knife,
        cost: 0,
        base_damage: 35.0,
        headshot_multiplier: 2.0,
        armor_penetration: 0.85,
        fire_interval_ms: 1000,
        clip_size: 0,
        reserve_ammo: 0,
        reload_ms: 0,
        effective_range: 48.0,
        max_range: 48.0,
        speed_multiplier: 1.0,
        bullet_speed: 0.0,
        automatic: false,
        kill_reward: 1500,
    },
    WeaponDef {
        name: "Glock-18",
        class: WeaponClass::Pistol,
        cost: 200,
        base_damage: 25.0,
        headshot_multiplier: 2.5,
        armor_penetration: 0.75,
        fire_interval_ms: 400,
        clip_size: 20,
        reserve_ammo: 120,
        reload_ms: 2200,
        effective_range: 300.0,
        max_range: 500.0,
        speed_multiplier: 1.0,
        bullet_speed: 900.0,
        automatic: false,
        kill_reward: 600,
    },
    WeaponDef {
        name: "USP-S",
        class: WeaponClass::Pistol,
        cost: 200,
        base_damage: 34.0,
        headshot_multiplier: 2.5,
        armor_penetration: 0.75,
        fire_interval_ms: 350,
        clip_size: 12,
        reserve_ammo: 100,
        reload_ms: 2500,
        effective_range: 350.0,
        max_range: 550.0,
        speed_multiplier: 1.0,
        bullet_speed: 900.0,
        automatic: false,
        kill_reward: 600,
    },
    WeaponDef {
        name: "Desert Eagle",
        class: WeaponClass::Pistol,
        cost: 650,
        base_damage: 54.0,
        headshot_multiplier: 2.5,
        armor_penetration: 0.85,
        fire_interval_ms: 267,
        clip_size: 7,
        reserve_ammo: 35,
        reload_ms: 2200,
        effective_range: 400.0,
        max_range: 600.0,
        speed_multiplier: 1.0,
        bullet_speed: 950.0,
        automatic: false,
        kill_reward: 300,
    },
    WeaponDef {
        name: "MP5-SD",
        class: WeaponClass::Smg,
        cost: 1500,
        base_damage: 26.0,
        headshot_multiplier: 2.0,
        armor_penetration: 0.6,
        fire_interval_ms: 80,
        clip_size: 30,
        reserve_ammo: 120,
        reload_ms: 2600,
        effective_range: 200.0,
        max_range: 400.0,
        speed_multiplier: 1.0,
        bullet_speed: 900.0,
        automatic: true,
        kill_reward: 600,
    },
    WeaponDef {
        name: "AK-47",
        class: WeaponClass::Rifle,
        cost: 2500,
        base_damage: 36.0,
        headshot_multiplier: 2.5,
        armor_penetration: 0.9,
        fire_interval_ms: 100,
        clip_size: 30,
        reserve_ammo: 90,
        reload_ms: 2500,
        effective_range: 500.0,
        max_range: 800.0,
        speed_multiplier: 0.86,
        bullet_speed: 1100.0,
        automatic: true,
        kill_reward: 300,
    },
    WeaponDef {
        name: "M4A1-S",
        class: WeaponClass::Rifle,
        cost: 3100,
        base_damage: 33.0,
        headshot_multiplier: 2.5,
        armor_penetration: 0.9,
        fire_interval_ms: 90,
        clip_size: 25,
        reserve_ammo: 75,
        reload_ms: 3100,
        effective_range: 550.0,
        max_range: 850.0,
        speed_multiplier: 0.86,
        bullet_speed: 1100.0,
        automatic: true,
        kill_reward: 300,
    },
    WeaponDef {
        name: "AWP",
        class: WeaponClass::Sniper,
        cost: 4750,
        base_damage: 115.0,
        headshot_multiplier: 1.0,
        armor_penetration: 0.95,
        fire_interval_ms: 1470,
        clip_size: 10,
        reserve_ammo: 30,
        reload_ms: 3700,
        effective_range: 1000.0,
        max_range: 1200.0,
        speed_multiplier: 0.60,
        bullet_speed: 1400.0,
        automatic: false,
        kill_reward: 100,
    },
];

impl WeaponId {
    /// Static definition for this weapon.
    #[inline]
    pub fn def(self) -> &'static WeaponDef {
        &WEAPONS[self as usize]
    }

    /// Primary weapons occupy the rifle slot; pistols the sidearm slot.
    pub fn is_primary(self) -> bool {
        matches!(
            self.def().class,
            WeaponClass::Smg | WeaponClass::Rifle | WeaponClass::Sniper
        )
    }

    /// Whether a team is allowed to buy this weapon.
    pub fn purchasable_by(self, team: Team) -> bool {
        match self {
            WeaponId::Ak47 => team == Team::T,
            WeaponId::M4a1 | WeaponId::Mp5 => team == Team::Ct,
            WeaponId::Knife => false,
            _ => true,
        }
    }
}

/// Grenade types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrenadeKind {
    /// High-explosive fragmentation grenade
    He,
    /// Smoke screen
    Smoke,
    /// Flashbang
    Flash,
}

/// Static definition of one grenade type.
#[derive(Clone, Copy, Debug)]
pub struct GrenadeDef {
    /// Buy price
    pub cost: u32,
    /// Maximum carried at once
    pub carry_limit: u8,
    /// Seconds between throw and detonation
    pub fuse_secs: f32,
    /// Throw speed (units/second)
    pub throw_speed: f32,
    /// Damage at the center (HE only)
    pub damage: f32,
    /// Full-effect radius
    pub inner_radius: f32,
    /// Zero-effect radius (HE) or effect radius (smoke/flash)
    pub outer_radius: f32,
    /// Effect duration in seconds (smoke screen, flash blind)
    pub duration_secs: f32,
}

impl GrenadeKind {
    /// Static definition for this grenade type.
    pub fn def(self) -> &'static GrenadeDef {
        match self {
            GrenadeKind::He => &GrenadeDef {
                cost: 300,
                carry_limit: 1,
                fuse_secs: 1.5,
                throw_speed: 450.0,
                damage: 99.0,
                inner_radius: 100.0,
                outer_radius: 300.0,
                duration_secs: 0.0,
            },
            GrenadeKind::Smoke => &GrenadeDef {
                cost: 300,
                carry_limit: 1,
                fuse_secs: 1.5,
                throw_speed: 450.0,
                damage: 0.0,
                inner_radius: 0.0,
                outer_radius: 150.0,
                duration_secs: 18.0,
            },
            GrenadeKind::Flash => &GrenadeDef {
                cost: 200,
                carry_limit: 2,
                fuse_secs: 1.5,
                throw_speed: 450.0,
                damage: 0.0,
                inner_radius: 0.0,
                outer_radius: 200.0,
                duration_secs: 5.0,
            },
        }
    }
}

/// Purchasable items beyond weapons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum BuyItem {
    /// A weapon from the catalog
    Weapon {
        /// Which weapon
        weapon: WeaponId,
    },
    /// Kevlar vest (armor 100)
    Armor,
    /// Kevlar + helmet (armor 100; the helmet is loadout state only,
    /// damage resolution uses the armor value alone)
    ArmorHelmet,
    /// Defuse kit (CT only)
    DefuseKit,
    /// A grenade
    Grenade {
        /// Which grenade type
        kind: GrenadeKind,
    },
}

impl BuyItem {
    /// Buy price of this item.
    pub fn cost(&self) -> u32 {
        match self {
            BuyItem::Weapon { weapon } => weapon.def().cost,
            BuyItem::Armor => 650,
            BuyItem::ArmorHelmet => 1000,
            BuyItem::DefuseKit => 200,
            BuyItem::Grenade { kind } => kind.def().cost,
        }
    }
}

/// Movement speed for a player holding `weapon`.
#[inline]
pub fn movement_speed(weapon: WeaponId) -> f32 {
    BASE_MOVE_SPEED * weapon.def().speed_multiplier
}

/// Outcome of a single damage application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageResult {
    /// Damage applied to health
    pub health_damage: i32,
    /// Damage absorbed by (and subtracted from) armor
    pub armor_absorbed: i32,
}

/// Pure damage pipeline.
///
/// Applies, in order: distance falloff (full damage up to the weapon's
/// effective range, linear down to 50% at max range), the headshot
/// multiplier, then armor absorption — the blocked fraction
/// `raw * (1 - penetration)` is soaked by armor up to its remaining value
/// and depletes it. Health damage is rounded and clamped to `>= 0`.
pub fn calculate_damage(
    weapon: WeaponId,
    distance: f32,
    armor: i32,
    headshot: bool,
) -> DamageResult {
    let def = weapon.def();

    let falloff = if distance <= def.effective_range {
        1.0
    } else if distance >= def.max_range {
        0.5
    } else {
        1.0 - 0.5 * (distance - def.effective_range) / (def.max_range - def.effective_range)
    };

    let mut raw = def.base_damage * falloff;
    if headshot {
        raw *= def.headshot_multiplier;
    }

    let absorbed = if armor > 0 {
        (raw * (1.0 - def.armor_penetration)).min(armor as f32)
    } else {
        0.0
    };

    DamageResult {
        health_damage: ((raw - absorbed).round() as i32).max(0),
        armor_absorbed: absorbed.round() as i32,
    }
}

// =============================================================================
// TESTS
// =============================================================================
