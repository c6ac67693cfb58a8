//! Power budget: capacity ceiling versus the summed draw of active towers.
//!
//! Usage is always recomputed from the tower list.

use sim_core::{PlacementError, Tower, TowerId};
use sim_econ::curves::effective_power_draw;
use tracing::debug;

#[derive(Clone, Debug, PartialEq)]
pub struct PowerBudgetAllocator {
    capacity: u32,
    demand_multiplier: f64,
    star_discount: f32,
}

impl PowerBudgetAllocator {
    pub fn new(capacity: u32, star_discount: f32) -> Self {
        Self {
            capacity,
            demand_multiplier: 1.0,
            star_discount,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// 1.0 outside overclock.
    pub fn demand_multiplier(&self) -> f64 {
        self.demand_multiplier
    }

    pub fn set_capacity(&mut self, capacity: u32) {
        self.capacity = capacity;
    }

    /// Power a star-0 tower of raw `draw` would require right now.
    pub fn required_for(&self, draw: u32) -> u32 {
        self.demand(draw, 0)
    }

    /// Power `tower` requires right now, merge discount and demand applied.
    pub fn tower_demand(&self, tower: &Tower) -> u32 {
        self.demand(tower.power_draw, tower.star_level)
    }

    fn demand(&self, draw: u32, star_level: u8) -> u32 {
        self.demand_at(draw, star_level, self.demand_multiplier)
    }

    fn demand_at(&self, draw: u32, star_level: u8, multiplier: f64) -> u32 {
        let base = effective_power_draw(draw, star_level, self.star_discount) as f64;
        let scaled = (base * multiplier - 1e-6).ceil().max(0.0);
        scaled.min(u32::MAX as f64) as u32
    }

    /// Normal-demand draw of every placed tower, disabled ones included.
    /// This is what usage returns to once overclock ends.
    pub fn baseline_usage(&self, towers: &[Tower]) -> u32 {
        let total: u64 = towers
            .iter()
            .map(|t| self.demand_at(t.power_draw, t.star_level, 1.0) as u64)
            .sum();
        total.min(u32::MAX as u64) as u32
    }

    /// Sum of demand over active towers.
    pub fn usage(&self, towers: &[Tower]) -> u32 {
        let total: u64 = towers
            .iter()
            .filter(|t| t.is_active())
            .map(|t| self.tower_demand(t) as u64)
            .sum();
        total.min(u32::MAX as u64) as u32
    }

    pub fn available(&self, towers: &[Tower]) -> u32 {
        self.capacity.saturating_sub(self.usage(towers))
    }

    pub fn can_place(&self, towers: &[Tower], draw: u32) -> bool {
        self.check_placement(towers, draw).is_ok()
    }

    /// During overclock the new tower must also fit at normal demand next to
    /// every placed tower, so power freed by the deficit is never handed out.
    pub fn check_placement(&self, towers: &[Tower], draw: u32) -> Result<(), PlacementError> {
        let required = self.required_for(draw);
        let available = self.available(towers);
        if required > available {
            return Err(PlacementError::InsufficientPower {
                required,
                available,
            });
        }
        if self.demand_multiplier != 1.0 {
            let required = self.demand_at(draw, 0, 1.0);
            let available = self.capacity.saturating_sub(self.baseline_usage(towers));
            if required > available {
                return Err(PlacementError::InsufficientPower {
                    required,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Bring a disabled tower back online if its demand fits. Returns false
    /// if the tower is unknown.
    pub fn activate(&self, towers: &mut [Tower], id: TowerId) -> Result<bool, PlacementError> {
        let available = self.available(towers);
        let Some(tower) = towers.iter_mut().find(|t| t.id == id) else {
            return Ok(false);
        };
        if tower.is_active() {
            return Ok(true);
        }
        let required = self.tower_demand(tower);
        if required > available {
            return Err(PlacementError::InsufficientPower {
                required,
                available,
            });
        }
        tower.disabled = false;
        Ok(true)
    }

    /// Take a tower offline. It keeps its slot. Returns false if unknown.
    pub fn deactivate(&self, towers: &mut [Tower], id: TowerId) -> bool {
        match towers.iter_mut().find(|t| t.id == id) {
            Some(tower) => {
                tower.disabled = true;
                true
            }
            None => false,
        }
    }

    /// Disable active towers, lowest demand first then by id, until usage
    /// fits capacity. Returns the towers disabled.
    pub fn enforce(&self, towers: &mut [Tower]) -> Vec<TowerId> {
        let mut usage = self.usage(towers);
        let mut disabled = Vec::new();
        if usage <= self.capacity {
            return disabled;
        }
        let mut order: Vec<(u32, TowerId)> = towers
            .iter()
            .filter(|t| t.is_active())
            .map(|t| (self.tower_demand(t), t.id))
            .collect();
        order.sort();
        for (demand, id) in order {
            if usage <= self.capacity {
                break;
            }
            if self.deactivate(towers, id) {
                usage = usage.saturating_sub(demand);
                disabled.push(id);
            }
        }
        debug_assert_eq!(usage, self.usage(towers));
        disabled
    }

    /// Re-enable what fits, in id order, then enforce the ceiling.
    pub fn rebalance(&self, towers: &mut [Tower]) -> Vec<TowerId> {
        let mut offline: Vec<TowerId> = towers
            .iter()
            .filter(|t| !t.is_active())
            .map(|t| t.id)
            .collect();
        offline.sort();
        for id in offline {
            // Towers that still don't fit stay disabled.
            let _ = self.activate(towers, id);
        }
        self.enforce(towers)
    }

    /// Enter overclock demand. Returns towers disabled by the deficit.
    pub fn apply_overclock_demand(&mut self, multiplier: f64, towers: &mut [Tower]) -> Vec<TowerId> {
        self.demand_multiplier = if multiplier.is_finite() && multiplier > 0.0 {
            multiplier
        } else {
            1.0
        };
        let disabled = self.enforce(towers);
        if !disabled.is_empty() {
            debug!(count = disabled.len(), "overclock power deficit");
        }
        disabled
    }

    /// Leave overclock: every disabled flag is cleared.
    ///
    /// Only a capacity lowered during overclock can leave a deficit here, which
    /// is enforced again at normal demand.
    pub fn clear_overclock_demand(&mut self, towers: &mut [Tower]) -> Vec<TowerId> {
        self.demand_multiplier = 1.0;
        for t in towers.iter_mut() {
            t.disabled = false;
        }
        self.enforce(towers)
    }
}
