//! Older save layouts and the one-shot migration to the current blob.

use crate::{PersistenceError, SaveBlob, SavedTower, SAVE_VERSION};
use serde::Deserialize;
use serde_json::Value;
use sim_core::{ArchetypeId, Position, SectorId, SlotId};
use std::collections::BTreeSet;
use tracing::info;

/// Version 1: `hash_balance` instead of `hash`, towers keyed by `slot` and
/// `star`, no paused lanes and no timestamp.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LegacySaveV1 {
    pub towers: Vec<LegacyTowerV1>,
    pub hash_balance: u64,
    pub threat_level: f64,
    pub leak_counter: u32,
    pub last_boss_milestone: f64,
    pub boss_cooldown_remaining: f64,
    pub defeated_boss_sectors: BTreeSet<SectorId>,
}

impl Default for LegacySaveV1 {
    fn default() -> Self {
        Self {
            towers: Vec::new(),
            hash_balance: 0,
            threat_level: 1.0,
            leak_counter: 0,
            last_boss_milestone: 0.0,
            boss_cooldown_remaining: 0.0,
            defeated_boss_sectors: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LegacyTowerV1 {
    pub archetype: ArchetypeId,
    #[serde(default = "first_level")]
    pub level: u8,
    #[serde(default)]
    pub star: u8,
    pub slot: SlotId,
    #[serde(default)]
    pub position: Position,
}

fn first_level() -> u8 {
    1
}

impl From<LegacySaveV1> for SaveBlob {
    fn from(old: LegacySaveV1) -> Self {
        SaveBlob {
            version: SAVE_VERSION,
            towers: old
                .towers
                .into_iter()
                .map(|t| SavedTower {
                    archetype: t.archetype,
                    level: t.level,
                    star_level: t.star,
                    slot_id: t.slot,
                    position: t.position,
                })
                .collect(),
            hash: old.hash_balance,
            threat_level: old.threat_level,
            leak_counter: old.leak_counter,
            last_boss_milestone: old.last_boss_milestone,
            boss_cooldown_remaining: old.boss_cooldown_remaining,
            defeated_boss_sectors: old.defeated_boss_sectors,
            paused_lanes: BTreeSet::new(),
            saved_at: None,
        }
    }
}

/// Decode any known save version into the current [`SaveBlob`].
///
/// A missing `version` key means version 1. Top-level `null` fields fall
/// back to their defaults.
pub fn migrate_value(mut value: Value) -> Result<SaveBlob, PersistenceError> {
    if let Value::Object(map) = &mut value {
        map.retain(|_, v| !v.is_null());
    }
    let version = value.get("version").and_then(Value::as_u64).unwrap_or(1);
    match version {
        1 => {
            let old: LegacySaveV1 = serde_json::from_value(value)?;
            info!(towers = old.towers.len(), "migrating v1 save");
            Ok(old.into())
        }
        v if v == u64::from(SAVE_VERSION) => Ok(serde_json::from_value(value)?),
        v => Err(PersistenceError::UnsupportedVersion(v)),
    }
}
