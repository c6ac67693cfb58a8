#![deny(warnings)]

//! Core domain models and invariants for the Hashgrid idle defense simulation.
//!
//! This crate defines serializable types shared by every simulation crate:
//! identifiers, placement geometry, towers and slots, the immutable balance
//! configuration and the error taxonomy returned by simulation operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub mod config;
pub mod error;

pub use config::*;
pub use error::*;

/// Unique identifier for a placed tower.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TowerId(pub u32);

/// Identifier of a placement slot. Only meaningful within one layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId(pub u32);

/// Identifier of a tower archetype, e.g. "firewall".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArchetypeId(pub String);

/// Identifier of a map sector. Every lane belongs to exactly one sector.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SectorId(pub String);

impl fmt::Display for TowerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tower#{}", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ArchetypeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl SectorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Point on the defense map, in map units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Tower rarity. Determines the default power draw of an archetype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

/// Unscaled combat stats of an archetype.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaseStats {
    /// Damage per hit.
    pub damage: f32,
    /// Targeting range in map units.
    pub range: f32,
    /// Attacks per second.
    pub attack_speed: f32,
}

/// A placed tower.
///
/// `slot` and `position` are owned by the slot binding routine of the
/// runtime; nothing else rewrites them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tower {
    pub id: TowerId,
    pub archetype: ArchetypeId,
    /// Upgrade level, 1..=max_level.
    pub level: u8,
    /// Merge tier, 0..=max_star.
    pub star_level: u8,
    pub base_stats: BaseStats,
    /// Raw power draw before the merge discount.
    pub power_draw: u32,
    pub base_upgrade_cost: u64,
    /// Hash spent on placement and upgrades, used for sell refunds.
    pub invested: u64,
    pub slot: SlotId,
    pub position: Position,
    /// Set while an overclock power deficit keeps this tower offline.
    pub disabled: bool,
}

impl Tower {
    /// Active towers contribute damage and draw power.
    pub fn is_active(&self) -> bool {
        !self.disabled
    }
}

/// A placement position. `tower` is the only occupancy marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub position: Position,
    pub tower: Option<TowerId>,
}

impl Slot {
    pub fn new(id: SlotId, position: Position) -> Self {
        Self {
            id,
            position,
            tower: None,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.tower.is_some()
    }
}

/// Enemy approach lane. Spawns only happen on lanes whose sector is unlocked.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub sector: SectorId,
    pub spawn_point: Position,
}

/// Regular enemy roster, ordered by toughness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EnemyKind {
    Basic,
    Fast,
    Tank,
    /// Boss-tier trash.
    Elite,
}

/// Clamp a host-supplied frame delta to a usable value.
///
/// Negative, NaN and infinite deltas are host integration errors and are
/// treated as zero elapsed time.
pub fn sanitize_dt(dt: f64) -> f64 {
    if dt.is_finite() && dt >= 0.0 {
        dt
    } else {
        debug!(dt, "rejected invalid frame delta");
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sanitize_dt_rejects_bad_input() {
        assert_eq!(sanitize_dt(-1.0), 0.0);
        assert_eq!(sanitize_dt(f64::NAN), 0.0);
        assert_eq!(sanitize_dt(f64::INFINITY), 0.0);
        assert_eq!(sanitize_dt(0.25), 0.25);
    }

    #[test]
    fn slot_occupancy_follows_tower_reference() {
        let mut slot = Slot::new(SlotId(3), Position::new(1.0, 2.0));
        assert!(!slot.is_occupied());
        slot.tower = Some(TowerId(9));
        assert!(slot.is_occupied());
    }

    #[test]
    fn serde_roundtrip_tower() {
        let t = Tower {
            id: TowerId(1),
            archetype: ArchetypeId::new("firewall"),
            level: 3,
            star_level: 1,
            base_stats: BaseStats {
                damage: 10.0,
                range: 80.0,
                attack_speed: 1.0,
            },
            power_draw: 15,
            base_upgrade_cost: 40,
            invested: 120,
            slot: SlotId(4),
            position: Position::new(10.0, -5.0),
            disabled: false,
        };
        let s = serde_json::to_string(&t).unwrap();
        let back: Tower = serde_json::from_str(&s).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn rarity_uses_lowercase_keys() {
        let r: Rarity = serde_json::from_str("\"legendary\"").unwrap();
        assert_eq!(r, Rarity::Legendary);
    }

    proptest! {
        #[test]
        fn distance_is_symmetric(ax in -500.0f32..500.0, ay in -500.0f32..500.0,
                                 bx in -500.0f32..500.0, by in -500.0f32..500.0) {
            let a = Position::new(ax, ay);
            let b = Position::new(bx, by);
            prop_assert!((a.distance(&b) - b.distance(&a)).abs() < 1e-3);
            prop_assert!(a.distance(&b) >= 0.0);
        }

        #[test]
        fn sanitized_dt_is_never_negative(dt in proptest::num::f64::ANY) {
            let s = sanitize_dt(dt);
            prop_assert!(s.is_finite() && s >= 0.0);
        }
    }
}
