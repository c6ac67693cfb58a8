//! Slot layout and the slot/tower binding routine.
//!
//! `bind` and `release` are the only code that writes both sides of the
//! slot <-> tower association.

use sim_core::{Position, Slot, SlotId, Tower};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindError {
    Missing,
    Occupied,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlotLayout {
    slots: Vec<Slot>,
    index: BTreeMap<SlotId, usize>,
}

impl SlotLayout {
    /// Build a fresh layout. Incoming occupancy is discarded and duplicate
    /// ids keep their first slot.
    pub fn new(slots: Vec<Slot>) -> Self {
        let mut layout = Self::default();
        for mut slot in slots {
            if layout.index.contains_key(&slot.id) {
                warn!(slot = %slot.id, "duplicate slot id in layout, ignoring");
                continue;
            }
            slot.tower = None;
            layout.index.insert(slot.id, layout.slots.len());
            layout.slots.push(slot);
        }
        layout
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn get(&self, id: SlotId) -> Option<&Slot> {
        self.index.get(&id).map(|&i| &self.slots[i])
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_occupied()).count()
    }

    /// Closest free slot within `radius` of `from`; ties go to the lower id.
    pub fn nearest_free(&self, from: Position, radius: f32) -> Option<SlotId> {
        if !from.is_finite() || !radius.is_finite() {
            return None;
        }
        self.slots
            .iter()
            .filter(|s| !s.is_occupied())
            .map(|s| (s.position.distance(&from), s.id))
            .filter(|(d, _)| d.is_finite() && *d <= radius)
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, id)| id)
    }

    /// Occupy `slot` with `tower`, moving the tower onto the slot position.
    pub(crate) fn bind(&mut self, tower: &mut Tower, slot: SlotId) -> Result<(), BindError> {
        let &i = self.index.get(&slot).ok_or(BindError::Missing)?;
        let entry = &mut self.slots[i];
        if entry.tower.is_some() {
            return Err(BindError::Occupied);
        }
        entry.tower = Some(tower.id);
        tower.slot = slot;
        tower.position = entry.position;
        Ok(())
    }

    /// Free the slot held by `tower`, if it really holds it.
    pub(crate) fn release(&mut self, tower: &Tower) {
        if let Some(&i) = self.index.get(&tower.slot) {
            let entry = &mut self.slots[i];
            if entry.tower == Some(tower.id) {
                entry.tower = None;
            }
        }
    }

    /// Every occupied slot references exactly one listed tower bound back to
    /// it, and every tower holds its slot.
    pub fn is_consistent_with(&self, towers: &[Tower]) -> bool {
        let mut seen = BTreeMap::new();
        for t in towers {
            match self.get(t.slot) {
                Some(slot) if slot.tower == Some(t.id) => {}
                _ => return false,
            }
            if seen.insert(t.slot, t.id).is_some() {
                return false;
            }
        }
        self.slots
            .iter()
            .filter_map(|s| s.tower.map(|id| (s.id, id)))
            .all(|(slot, id)| seen.get(&slot) == Some(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::{ArchetypeId, BaseStats, TowerId};

    fn tower(id: u32) -> Tower {
        Tower {
            id: TowerId(id),
            archetype: ArchetypeId::new("firewall"),
            level: 1,
            star_level: 0,
            base_stats: BaseStats {
                damage: 1.0,
                range: 1.0,
                attack_speed: 1.0,
            },
            power_draw: 10,
            base_upgrade_cost: 10,
            invested: 0,
            slot: SlotId(u32::MAX),
            position: Position::default(),
            disabled: false,
        }
    }

    fn layout() -> SlotLayout {
        SlotLayout::new(vec![
            Slot::new(SlotId(1), Position::new(0.0, 0.0)),
            Slot::new(SlotId(2), Position::new(10.0, 0.0)),
            Slot::new(SlotId(3), Position::new(20.0, 0.0)),
        ])
    }

    #[test]
    fn bind_and_release_keep_both_sides_in_step() {
        let mut l = layout();
        let mut t = tower(7);
        l.bind(&mut t, SlotId(2)).unwrap();
        assert_eq!(t.slot, SlotId(2));
        assert_eq!(t.position, Position::new(10.0, 0.0));
        assert!(l.is_consistent_with(std::slice::from_ref(&t)));

        let mut other = tower(8);
        assert_eq!(
            l.bind(&mut other, SlotId(2)),
            Err(BindError::Occupied)
        );
        assert_eq!(l.bind(&mut other, SlotId(99)), Err(BindError::Missing));

        l.release(&t);
        assert_eq!(l.occupied_count(), 0);
        assert!(l.is_consistent_with(&[]));
    }

    #[test]
    fn nearest_free_skips_occupied_and_far_slots() {
        let mut l = layout();
        let mut t = tower(1);
        l.bind(&mut t, SlotId(1)).unwrap();
        assert_eq!(l.nearest_free(Position::new(1.0, 0.0), 15.0), Some(SlotId(2)));
        assert_eq!(l.nearest_free(Position::new(1.0, 0.0), 5.0), None);
        // Equidistant: lower id wins.
        assert_eq!(l.nearest_free(Position::new(15.0, 0.0), 5.0), Some(SlotId(2)));
        assert_eq!(l.nearest_free(Position::new(f32::NAN, 0.0), 100.0), None);
    }

    #[test]
    fn fresh_layout_drops_stale_occupancy_and_duplicates() {
        let mut stale = Slot::new(SlotId(1), Position::default());
        stale.tower = Some(TowerId(4));
        let l = SlotLayout::new(vec![stale, Slot::new(SlotId(1), Position::new(5.0, 5.0))]);
        assert_eq!(l.len(), 1);
        assert_eq!(l.occupied_count(), 0);
        assert_eq!(l.get(SlotId(1)).unwrap().position, Position::default());
    }
}
