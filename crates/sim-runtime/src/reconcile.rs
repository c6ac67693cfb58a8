//! Re-binding towers onto a regenerated slot layout.
//!
//! Slot ids are not stable across layouts. Towers whose saved slot id still
//! exists reclaim it first; the rest take the nearest free slot within a
//! radius of their stale position, or are dropped as orphans.

use crate::layout::SlotLayout;
use serde::Serialize;
use sim_core::{ArchetypeId, SlotId, Tower};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum OrphanReason {
    /// The archetype no longer exists in the balance config.
    UnknownArchetype,
    /// No free slot within the rebind radius.
    NoSlotInRadius,
}

/// A tower that could not be restored. Logged, never surfaced as an error.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Orphan {
    pub archetype: ArchetypeId,
    pub saved_slot: SlotId,
    pub reason: OrphanReason,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RebindReport {
    /// Towers that reclaimed their saved slot id.
    pub direct: usize,
    /// Towers moved to the nearest free slot.
    pub nearby: usize,
    pub orphans: Vec<Orphan>,
}

impl RebindReport {
    pub fn bound(&self) -> usize {
        self.direct + self.nearby
    }

    pub(crate) fn orphan(&mut self, archetype: ArchetypeId, saved_slot: SlotId, reason: OrphanReason) {
        warn!(%archetype, %saved_slot, ?reason, "restore orphan dropped");
        self.orphans.push(Orphan {
            archetype,
            saved_slot,
            reason,
        });
    }
}

/// Bind `towers` into `layout`. Returns the towers that found a slot.
///
/// Input order decides who wins contested slots.
pub(crate) fn rebind(
    towers: Vec<Tower>,
    layout: &mut SlotLayout,
    radius: f32,
) -> (Vec<Tower>, RebindReport) {
    let mut report = RebindReport::default();
    let mut bound = Vec::with_capacity(towers.len());
    let mut displaced = Vec::new();

    for mut tower in towers {
        let saved = tower.slot;
        if layout.bind(&mut tower, saved).is_ok() {
            report.direct += 1;
            bound.push(tower);
        } else {
            displaced.push(tower);
        }
    }

    for mut tower in displaced {
        let saved = tower.slot;
        let target = layout.nearest_free(tower.position, radius);
        match target.map(|slot| (slot, layout.bind(&mut tower, slot))) {
            Some((slot, Ok(()))) => {
                debug!(tower = %tower.id, from = %saved, to = %slot, "tower rebound to nearby slot");
                report.nearby += 1;
                bound.push(tower);
            }
            _ => report.orphan(tower.archetype, saved, OrphanReason::NoSlotInRadius),
        }
    }

    (bound, report)
}
