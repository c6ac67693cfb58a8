#![deny(warnings)]

//! Session snapshots: versioned save blobs and restore into a fresh layout.
//!
//! The slot list is never saved. On load the host builds a fresh
//! [`SimulationState`] over a regenerated layout and [`restore`] re-binds
//! the saved towers onto it.

pub mod legacy;

pub use legacy::{migrate_value, LegacySaveV1};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sim_core::{ArchetypeId, Position, SectorId, SlotId};
use sim_runtime::{Orphan, Progress, SimulationState, TowerSeed};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{info, warn};

pub const SAVE_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("json codec: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binary codec: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("unsupported save version {0}")]
    UnsupportedVersion(u64),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedTower {
    pub archetype: ArchetypeId,
    pub level: u8,
    #[serde(default)]
    pub star_level: u8,
    /// Slot id at save time; may not exist in the next layout.
    pub slot_id: SlotId,
    pub position: Position,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveBlob {
    pub version: u32,
    pub towers: Vec<SavedTower>,
    pub hash: u64,
    pub threat_level: f64,
    pub leak_counter: u32,
    pub last_boss_milestone: f64,
    pub boss_cooldown_remaining: f64,
    pub defeated_boss_sectors: BTreeSet<SectorId>,
    pub paused_lanes: BTreeSet<SectorId>,
    /// Used by hosts for offline earnings only.
    pub saved_at: Option<DateTime<Utc>>,
}

impl Default for SaveBlob {
    fn default() -> Self {
        Self {
            version: SAVE_VERSION,
            towers: Vec::new(),
            hash: 0,
            threat_level: 1.0,
            leak_counter: 0,
            last_boss_milestone: 0.0,
            boss_cooldown_remaining: 0.0,
            defeated_boss_sectors: BTreeSet::new(),
            paused_lanes: BTreeSet::new(),
            saved_at: None,
        }
    }
}

impl SaveBlob {
    /// Wall-clock seconds between the save and `now`; zero when unknown or
    /// when the clock went backwards.
    pub fn seconds_since_save(&self, now: DateTime<Utc>) -> f64 {
        self.saved_at
            .map(|at| (now - at).num_milliseconds() as f64 / 1000.0)
            .filter(|s| *s > 0.0)
            .unwrap_or(0.0)
    }
}

/// Outcome of a restore. Orphans have already been logged.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RestoreReport {
    pub rebound_direct: usize,
    pub rebound_nearby: usize,
    pub orphans: Vec<Orphan>,
    /// Saved hash above the current storage capacity.
    pub hash_discarded: u64,
}

pub fn snapshot(state: &SimulationState) -> SaveBlob {
    snapshot_at(state, Utc::now())
}

/// Capture `state` with an explicit timestamp. A boss in flight is not
/// captured; its milestone becomes eligible again after restore.
pub fn snapshot_at(state: &SimulationState, now: DateTime<Utc>) -> SaveBlob {
    SaveBlob {
        version: SAVE_VERSION,
        towers: state
            .towers()
            .iter()
            .map(|t| SavedTower {
                archetype: t.archetype.clone(),
                level: t.level,
                star_level: t.star_level,
                slot_id: t.slot,
                position: t.position,
            })
            .collect(),
        hash: state.hash(),
        threat_level: state.threat_level(),
        leak_counter: state.leak_counter(),
        last_boss_milestone: state.last_boss_milestone(),
        boss_cooldown_remaining: state.boss_cooldown_remaining(),
        defeated_boss_sectors: state.defeated_boss_sectors().clone(),
        paused_lanes: state.paused_lanes().clone(),
        saved_at: Some(now),
    }
}

/// Apply `blob` to `fresh`, a state built over the current slot layout.
pub fn restore(blob: SaveBlob, fresh: SimulationState) -> (SimulationState, RestoreReport) {
    let mut state = fresh;
    let saved_hash = blob.hash;
    state.restore_progress(Progress {
        hash: blob.hash,
        leak_counter: blob.leak_counter,
        threat_level: blob.threat_level,
        last_boss_milestone: blob.last_boss_milestone,
        boss_cooldown_remaining: blob.boss_cooldown_remaining,
        defeated_boss_sectors: blob.defeated_boss_sectors,
        paused_lanes: blob.paused_lanes,
    });
    let seeds = blob
        .towers
        .into_iter()
        .map(|t| TowerSeed {
            archetype: t.archetype,
            level: t.level,
            star_level: t.star_level,
            slot: t.slot_id,
            position: t.position,
        })
        .collect();
    let rebind = state.adopt_towers(seeds);
    let report = RestoreReport {
        rebound_direct: rebind.direct,
        rebound_nearby: rebind.nearby,
        orphans: rebind.orphans,
        hash_discarded: saved_hash.saturating_sub(state.hash()),
    };
    if report.hash_discarded > 0 {
        warn!(
            discarded = report.hash_discarded,
            capacity = state.hash_storage_capacity(),
            "saved hash above storage capacity"
        );
    }
    info!(
        direct = report.rebound_direct,
        nearby = report.rebound_nearby,
        orphans = report.orphans.len(),
        "session restored"
    );
    (state, report)
}

pub fn encode_json(blob: &SaveBlob) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string_pretty(blob)?)
}

/// Decode a JSON save of any supported version.
pub fn decode_json(text: &str) -> Result<SaveBlob, PersistenceError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    migrate_value(value)
}

pub fn encode_bincode(blob: &SaveBlob) -> Result<Vec<u8>, PersistenceError> {
    Ok(bincode::serialize(blob)?)
}

/// Binary saves carry no migration path; only the current version loads.
pub fn decode_bincode(bytes: &[u8]) -> Result<SaveBlob, PersistenceError> {
    let blob: SaveBlob = bincode::deserialize(bytes)?;
    if blob.version != SAVE_VERSION {
        return Err(PersistenceError::UnsupportedVersion(u64::from(blob.version)));
    }
    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use sim_core::{BalanceConfig, Lane, Slot};
    use sim_runtime::OrphanReason;

    fn lanes() -> Vec<Lane> {
        vec![Lane {
            sector: SectorId::new("core"),
            spawn_point: Position::new(0.0, 300.0),
        }]
    }

    fn state_over(cfg: BalanceConfig, slots: Vec<Slot>) -> SimulationState {
        SimulationState::new(cfg, slots, lanes(), BTreeSet::from([SectorId::new("core")]))
    }

    fn row(n: u32) -> Vec<Slot> {
        (1..=n)
            .map(|i| Slot::new(SlotId(i), Position::new((i - 1) as f32 * 30.0, 0.0)))
            .collect()
    }

    fn saved_session() -> SimulationState {
        let mut s = state_over(BalanceConfig::default(), row(4));
        s.credit_hash(20_000);
        let fw = ArchetypeId::new("firewall");
        s.place_tower(&fw, SlotId(1)).unwrap();
        let t = s.place_tower(&fw, SlotId(2)).unwrap();
        s.upgrade_tower(t).unwrap();
        s.pause_lane(SectorId::new("core"));
        s.advance(3.0);
        s
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn snapshot_captures_progress_not_slots() {
        let s = saved_session();
        let blob = snapshot_at(&s, at());
        assert_eq!(blob.version, SAVE_VERSION);
        assert_eq!(blob.towers.len(), 2);
        assert_eq!(blob.towers[1].level, 2);
        assert_eq!(blob.hash, s.hash());
        assert!(blob.paused_lanes.contains(&SectorId::new("core")));
        let json = encode_json(&blob).unwrap();
        assert!(json.contains("\"saved_at\": \"2024-05-01T12:00:00Z\""));
        assert!(!json.contains("slots"));
    }

    #[test]
    fn same_layout_restores_everything() {
        let s = saved_session();
        let blob = snapshot_at(&s, at());
        let (r, report) = restore(blob, state_over(BalanceConfig::default(), row(4)));
        assert_eq!(report.rebound_direct, 2);
        assert!(report.orphans.is_empty());
        assert_eq!(r.hash(), s.hash());
        assert_eq!(r.threat_level(), s.threat_level());
        assert_eq!(r.paused_lanes(), s.paused_lanes());
        assert_eq!(r.power_used(), s.power_used());
        assert!(r.invariants_hold());
    }

    #[test]
    fn missing_slot_rebinds_within_radius() {
        let blob = snapshot_at(&saved_session(), at());
        let fresh = state_over(
            BalanceConfig::default(),
            vec![
                Slot::new(SlotId(1), Position::new(0.0, 0.0)),
                Slot::new(SlotId(50), Position::new(40.0, 0.0)),
            ],
        );
        let (r, report) = restore(blob, fresh);
        assert_eq!(report.rebound_direct, 1);
        assert_eq!(report.rebound_nearby, 1);
        let moved = r.towers().iter().find(|t| t.slot == SlotId(50)).unwrap();
        assert_eq!(moved.position, Position::new(40.0, 0.0));
        assert_eq!(moved.level, 2);
        assert!(r.invariants_hold());
    }

    #[test]
    fn missing_slot_outside_radius_drops_tower() {
        let blob = snapshot_at(&saved_session(), at());
        let fresh = state_over(
            BalanceConfig::default(),
            vec![
                Slot::new(SlotId(1), Position::new(0.0, 0.0)),
                Slot::new(SlotId(50), Position::new(400.0, 0.0)),
            ],
        );
        let (r, report) = restore(blob, fresh);
        assert_eq!(r.towers().len(), 1);
        assert_eq!(report.orphans.len(), 1);
        assert_eq!(report.orphans[0].reason, OrphanReason::NoSlotInRadius);
        let occupied = r.slots().iter().filter(|s| s.is_occupied()).count();
        assert_eq!(occupied, r.towers().len());
        assert!(r.invariants_hold());
    }

    #[test]
    fn hash_clamps_to_current_capacity() {
        let blob = snapshot_at(&saved_session(), at());
        let saved = blob.hash;
        let mut cfg = BalanceConfig::default();
        cfg.economy.hash_storage_capacity = 1_000;
        let (r, report) = restore(blob, state_over(cfg, row(4)));
        assert_eq!(r.hash(), 1_000);
        assert_eq!(report.hash_discarded, saved - 1_000);
    }

    #[test]
    fn unknown_archetype_only_drops_that_tower() {
        let mut blob = snapshot_at(&saved_session(), at());
        blob.towers[0].archetype = ArchetypeId::new("retired");
        let (r, report) = restore(blob, state_over(BalanceConfig::default(), row(4)));
        assert_eq!(r.towers().len(), 1);
        assert_eq!(report.orphans[0].reason, OrphanReason::UnknownArchetype);
    }

    #[test]
    fn garbage_numbers_are_clamped() {
        let blob = SaveBlob {
            threat_level: f64::NAN,
            last_boss_milestone: -40.0,
            boss_cooldown_remaining: f64::INFINITY,
            ..SaveBlob::default()
        };
        let (r, _) = restore(blob, state_over(BalanceConfig::default(), row(2)));
        assert_eq!(r.threat_level(), 1.0);
        assert_eq!(r.last_boss_milestone(), 0.0);
        assert_eq!(r.boss_cooldown_remaining(), 0.0);
    }

    #[test]
    fn defeated_sectors_restore_component_tier() {
        let blob = SaveBlob {
            defeated_boss_sectors: BTreeSet::from([SectorId::new("core")]),
            last_boss_milestone: 5.0,
            threat_level: 6.0,
            ..SaveBlob::default()
        };
        let (r, _) = restore(blob, state_over(BalanceConfig::default(), row(2)));
        assert_eq!(r.component_tier(), 1);
        assert_eq!(r.next_boss_milestone_distance(), Some(4.0));
    }

    #[test]
    fn json_and_bincode_round_trip() {
        let mut blob = snapshot_at(&saved_session(), at());
        blob.threat_level = 3.5;
        assert_eq!(decode_json(&encode_json(&blob).unwrap()).unwrap(), blob);
        assert_eq!(decode_bincode(&encode_bincode(&blob).unwrap()).unwrap(), blob);
    }

    #[test]
    fn bincode_refuses_old_versions() {
        let blob = SaveBlob {
            version: 1,
            ..SaveBlob::default()
        };
        let bytes = encode_bincode(&blob).unwrap();
        assert!(matches!(
            decode_bincode(&bytes),
            Err(PersistenceError::UnsupportedVersion(1))
        ));
        assert!(matches!(
            decode_bincode(&[1, 2, 3]),
            Err(PersistenceError::Bincode(_))
        ));
    }

    #[test]
    fn v1_json_restores() {
        let text = r#"{
            "hash_balance": 900,
            "threat_level": 2.0,
            "towers": [{ "archetype": "firewall", "level": 3, "star": 0, "slot": 2,
                         "position": { "x": 30.0, "y": 0.0 } }]
        }"#;
        let blob = decode_json(text).unwrap();
        let (r, report) = restore(blob, state_over(BalanceConfig::default(), row(4)));
        assert_eq!(report.rebound_direct, 1);
        assert_eq!(r.hash(), 900);
        assert_eq!(r.towers()[0].level, 3);
        assert_eq!(r.towers()[0].slot, SlotId(2));
    }

    #[test]
    fn offline_window() {
        let blob = snapshot_at(&saved_session(), at());
        let later = at() + chrono::Duration::seconds(90);
        assert_eq!(blob.seconds_since_save(later), 90.0);
        let earlier = at() - chrono::Duration::seconds(90);
        assert_eq!(blob.seconds_since_save(earlier), 0.0);
        assert_eq!(SaveBlob::default().seconds_since_save(later), 0.0);
    }

    proptest! {
        #[test]
        fn restore_never_double_binds(
            saved in proptest::collection::vec((0u32..30, -200.0f32..200.0, -200.0f32..200.0, 1u8..12, 0u8..5), 0..25),
            fresh in proptest::collection::vec((0u32..30, -200.0f32..200.0, -200.0f32..200.0), 0..25),
        ) {
            let n = saved.len();
            let blob = SaveBlob {
                towers: saved
                    .iter()
                    .map(|&(slot, x, y, level, star)| SavedTower {
                        archetype: ArchetypeId::new("firewall"),
                        level,
                        star_level: star,
                        slot_id: SlotId(slot),
                        position: Position::new(x, y),
                    })
                    .collect(),
                ..SaveBlob::default()
            };
            let mut cfg = BalanceConfig::default();
            cfg.power.base_capacity = 100_000;
            let slots = fresh
                .iter()
                .map(|&(id, x, y)| Slot::new(SlotId(id), Position::new(x, y)))
                .collect();
            let (r, report) = restore(blob, state_over(cfg, slots));
            prop_assert!(r.invariants_hold());
            prop_assert_eq!(r.towers().len() + report.orphans.len(), n);
            prop_assert!(r.towers().iter().all(|t| t.level <= 10 && t.star_level <= 3));
        }
    }
}
