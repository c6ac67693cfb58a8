//! The aggregate simulation root. All mutation goes through its methods.

use crate::boss::{BossMilestoneController, BossPhase, BossResolution, BossSpawn};
use crate::layout::{BindError, SlotLayout};
use crate::power::PowerBudgetAllocator;
use crate::reconcile::{self, OrphanReason, RebindReport};
use crate::spawn::{open_lanes, SpawnContext, SpawnRequest, ThreatSpawnScheduler};
use crate::zero_day::{ActiveZeroDay, ZeroDayController, ZeroDayDefeat, ZeroDaySpawn};
use serde::Serialize;
use sim_core::{
    sanitize_dt, ArchetypeId, BalanceConfig, BossError, Lane, MergeError, PlacementError,
    Position, SectorId, SellError, Slot, SlotId, Tower, TowerId, UpgradeError,
};
use sim_econ::curves::{merge_eligibility, tower_stats, upgrade_cost, EffectiveStats};
use sim_econ::{EconError, EconomyClock, Multipliers};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// What one `advance` produced for the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub credited: u64,
    pub spawn: Option<SpawnRequest>,
    pub boss_spawn: Option<BossSpawn>,
    pub zero_day_spawn: Option<ZeroDaySpawn>,
    pub overclock_expired: bool,
    /// Towers taken offline by a power deficit during this tick.
    pub disabled: Vec<TowerId>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum KillOutcome {
    Regular { bounty: u64 },
    Boss(BossResolution),
    NoBossActive,
}

/// Read-only numbers for the UI.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusView {
    pub hash: u64,
    pub hash_storage_capacity: u64,
    pub hash_per_second: f64,
    pub efficiency: f64,
    /// Efficiency is under `economy.efficiency_warning_threshold`.
    pub below_warning: bool,
    pub threat_level: f64,
    pub power_used: u32,
    pub power_capacity: u32,
    pub towers_placed: usize,
    pub towers_disabled: usize,
    pub enemies_on_field: u32,
    pub component_tier: u32,
    pub boss_active: bool,
    pub zero_day_active: bool,
    pub next_boss_in: Option<f64>,
    pub overclock_remaining: Option<f64>,
}

/// Progress fields loaded from a save, applied verbatim after clamping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Progress {
    pub hash: u64,
    pub leak_counter: u32,
    pub threat_level: f64,
    pub last_boss_milestone: f64,
    pub boss_cooldown_remaining: f64,
    pub defeated_boss_sectors: BTreeSet<SectorId>,
    pub paused_lanes: BTreeSet<SectorId>,
}

/// A persisted tower awaiting a slot.
#[derive(Clone, Debug, PartialEq)]
pub struct TowerSeed {
    pub archetype: ArchetypeId,
    pub level: u8,
    pub star_level: u8,
    pub slot: SlotId,
    pub position: Position,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Overclock {
    active: bool,
    time_remaining: f64,
}

#[derive(Clone, Debug)]
pub struct SimulationState {
    config: BalanceConfig,
    economy: EconomyClock,
    spawner: ThreatSpawnScheduler,
    power: PowerBudgetAllocator,
    boss: BossMilestoneController,
    zero_day: ZeroDayController,
    overclock: Overclock,
    towers: Vec<Tower>,
    layout: SlotLayout,
    lanes: Vec<Lane>,
    unlocked_sectors: BTreeSet<SectorId>,
    paused_lanes: BTreeSet<SectorId>,
    income_multiplier: f64,
    enemies_on_field: u32,
    next_tower_id: u32,
}

impl SimulationState {
    /// Fresh session state over a generated slot layout.
    pub fn new(
        config: BalanceConfig,
        slots: Vec<Slot>,
        lanes: Vec<Lane>,
        unlocked_sectors: BTreeSet<SectorId>,
    ) -> Self {
        let economy = EconomyClock::new(&config.economy);
        let spawner = ThreatSpawnScheduler::new(config.rng_seed);
        let power = PowerBudgetAllocator::new(
            config.power.base_capacity,
            config.power.star_power_discount,
        );
        let boss = BossMilestoneController::new(config.rng_seed.wrapping_add(1));
        let zero_day = ZeroDayController::new(config.rng_seed.wrapping_add(2));
        Self {
            config,
            economy,
            spawner,
            power,
            boss,
            zero_day,
            overclock: Overclock::default(),
            towers: Vec::new(),
            layout: SlotLayout::new(slots),
            lanes,
            unlocked_sectors,
            paused_lanes: BTreeSet::new(),
            income_multiplier: 1.0,
            enemies_on_field: 0,
            next_tower_id: 1,
        }
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// Order: overclock timer, economy, spawns, power, boss, Zero-Day.
    pub fn advance(&mut self, dt: f64) -> TickReport {
        let dt = sanitize_dt(dt);
        let mut report = TickReport::default();

        if self.overclock.active {
            self.overclock.time_remaining -= dt;
            if self.overclock.time_remaining <= 0.0 {
                self.end_overclock();
                report.overclock_expired = true;
            }
        }

        report.credited = self.economy.tick(
            dt,
            self.config.economy.base_hash_per_second,
            self.multipliers(),
        );

        let lanes = open_lanes(&self.lanes, &self.unlocked_sectors, &self.paused_lanes);
        let growth_multiplier = if self.overclock.active {
            self.config.overclock.threat_growth_multiplier
        } else {
            1.0
        };
        let ctx = SpawnContext {
            growth_multiplier,
            enemies_on_field: self.enemies_on_field,
            lanes: &lanes,
        };
        report.spawn = self.spawner.tick(dt, &self.config.threat, &ctx);
        if report.spawn.is_some() {
            self.enemies_on_field = self.enemies_on_field.saturating_add(1);
            self.zero_day.record_wave();
        }

        report.disabled = self.power.enforce(&mut self.towers);

        report.boss_spawn = self.boss.tick(
            dt,
            self.spawner.threat_level(),
            &self.config.boss,
            &lanes,
        );

        let zd = self.zero_day.tick(
            dt,
            self.spawner.threat_level(),
            &self.config.zero_day,
            &self.config.threat,
            self.economy.leak_penalty(),
            &lanes,
        );
        if zd.leaks > 0 {
            self.economy.record_leaks(zd.leaks);
        }
        report.zero_day_spawn = zd.spawn;

        debug_assert!(self.invariants_hold());
        report
    }

    fn multipliers(&self) -> Multipliers {
        Multipliers {
            upgrades: self.income_multiplier,
            overclock: if self.overclock.active {
                self.config.overclock.income_multiplier
            } else {
                1.0
            },
        }
    }

    // ---- inbound: combat layer ----

    pub fn report_enemy_leaked(&mut self) {
        self.economy.record_leak();
        self.enemies_on_field = self.enemies_on_field.saturating_sub(1);
    }

    pub fn report_enemy_killed(&mut self, is_boss: bool) -> KillOutcome {
        if !is_boss {
            self.enemies_on_field = self.enemies_on_field.saturating_sub(1);
            let bounty = self.economy.credit(self.config.economy.hash_per_kill);
            return KillOutcome::Regular { bounty };
        }
        match self.boss.report_killed(&self.config.boss) {
            Ok(resolution) => {
                if let BossResolution::Victory { .. } = resolution {
                    self.economy.credit(self.config.economy.boss_hash_bonus);
                }
                KillOutcome::Boss(resolution)
            }
            Err(BossError::NoBossActive) => KillOutcome::NoBossActive,
        }
    }

    /// The boss reached the defended node. Counts as a leak.
    pub fn report_boss_escaped(&mut self) -> Result<BossResolution, BossError> {
        let resolution = self.boss.report_escaped(&self.config.boss)?;
        self.economy.record_leak();
        Ok(resolution)
    }

    /// The Zero-Day was destroyed: pays its bounty and clears leaks worth
    /// `zero_day.defeat_efficiency_restore` points. `None` if none is active.
    pub fn report_zero_day_defeated(&mut self) -> Option<ZeroDayDefeat> {
        let defeat = self
            .zero_day
            .report_defeated(&self.config.zero_day, self.economy.leak_penalty())?;
        let bounty = self.economy.credit(defeat.hash_bonus);
        let cleared = self.economy.forgive_leaks(defeat.leaks_restored);
        info!(bounty, cleared, "zero-day bounty paid");
        Some(defeat)
    }

    /// The Zero-Day reached the defended node. Counts as a leak.
    pub fn report_zero_day_escaped(&mut self) -> bool {
        if self.zero_day.report_escaped().is_none() {
            return false;
        }
        self.economy.record_leak();
        true
    }

    // ---- inbound: player actions ----

    pub fn place_tower(
        &mut self,
        archetype: &ArchetypeId,
        slot: SlotId,
    ) -> Result<TowerId, PlacementError> {
        match self.layout.get(slot) {
            None => return Err(PlacementError::InvalidSlot(slot)),
            Some(s) if s.is_occupied() => return Err(PlacementError::SlotOccupied(slot)),
            Some(_) => {}
        }
        let arch = self
            .config
            .archetype(archetype)
            .cloned()
            .ok_or_else(|| PlacementError::UnknownArchetype(archetype.clone()))?;
        if arch.unlock_tier > self.component_tier() {
            return Err(PlacementError::ArchetypeLocked {
                archetype: archetype.clone(),
                required: arch.unlock_tier,
            });
        }
        let draw = self.config.archetype_draw(&arch);
        self.power.check_placement(&self.towers, draw)?;
        let cost = arch.placement_cost;
        self.economy.spend(cost).map_err(|e| match e {
            EconError::InsufficientHash { needed, available } => {
                PlacementError::InsufficientCurrency { needed, available }
            }
        })?;

        let mut tower = Tower {
            id: self.allocate_tower_id(),
            archetype: arch.id.clone(),
            level: 1,
            star_level: 0,
            base_stats: arch.base_stats,
            power_draw: draw,
            base_upgrade_cost: arch.base_upgrade_cost,
            invested: cost,
            slot,
            position: Position::default(),
            disabled: false,
        };
        self.layout.bind(&mut tower, slot).map_err(|e| match e {
            BindError::Missing => PlacementError::InvalidSlot(slot),
            BindError::Occupied => PlacementError::SlotOccupied(slot),
        })?;
        info!(tower = %tower.id, %archetype, %slot, cost, "tower placed");
        let id = tower.id;
        self.towers.push(tower);
        Ok(id)
    }

    pub fn upgrade_tower(&mut self, id: TowerId) -> Result<(), UpgradeError> {
        let idx = self.tower_index(id).ok_or(UpgradeError::UnknownTower(id))?;
        let tower = &self.towers[idx];
        let cost = upgrade_cost(tower.base_upgrade_cost, tower.level, &self.config.upgrades)
            .ok_or(UpgradeError::MaxLevel(id))?;
        self.economy.spend(cost).map_err(|e| match e {
            EconError::InsufficientHash { needed, available } => {
                UpgradeError::InsufficientCurrency { needed, available }
            }
        })?;
        let tower = &mut self.towers[idx];
        tower.level += 1;
        tower.invested = tower.invested.saturating_add(cost);
        debug!(tower = %id, level = tower.level, cost, "tower upgraded");
        Ok(())
    }

    /// Merge `donor` into `survivor`. The survivor gains a star tier and the
    /// higher of both levels; the donor is destroyed and its slot freed.
    pub fn merge_towers(&mut self, survivor: TowerId, donor: TowerId) -> Result<TowerId, MergeError> {
        let a = self
            .tower_index(survivor)
            .ok_or(MergeError::UnknownTower(survivor))?;
        let b = self.tower_index(donor).ok_or(MergeError::UnknownTower(donor))?;
        merge_eligibility(&self.towers[a], &self.towers[b], self.config.upgrades.max_star)
            .map_err(MergeError::Ineligible)?;

        let donor_tower = self.towers.remove(b);
        self.layout.release(&donor_tower);
        let a = if b < a { a - 1 } else { a };
        let merged = &mut self.towers[a];
        merged.star_level += 1;
        merged.level = merged.level.max(donor_tower.level);
        merged.invested = merged.invested.saturating_add(donor_tower.invested);
        info!(tower = %survivor, donor = %donor, star = merged.star_level, "towers merged");
        self.power.rebalance(&mut self.towers);
        Ok(survivor)
    }

    /// Remove a tower and refund part of what was invested in it.
    pub fn sell_tower(&mut self, id: TowerId) -> Result<u64, SellError> {
        let idx = self.tower_index(id).ok_or(SellError::UnknownTower(id))?;
        let tower = self.towers.remove(idx);
        self.layout.release(&tower);
        let ratio = self.config.economy.sell_refund_ratio.clamp(0.0, 1.0);
        let refund = (tower.invested as f64 * ratio).floor() as u64;
        let credited = self.economy.credit(refund);
        info!(tower = %id, refund = credited, "tower sold");
        self.power.rebalance(&mut self.towers);
        Ok(credited)
    }

    pub fn set_overclock(&mut self, active: bool) {
        if active {
            if !self.overclock.active {
                let disabled = self.power.apply_overclock_demand(
                    self.config.overclock.power_demand_multiplier,
                    &mut self.towers,
                );
                info!(disabled = disabled.len(), "overclock engaged");
            }
            self.overclock = Overclock {
                active: true,
                time_remaining: self.config.overclock.duration_seconds,
            };
        } else if self.overclock.active {
            self.end_overclock();
        }
    }

    fn end_overclock(&mut self) {
        self.overclock = Overclock::default();
        self.power.clear_overclock_demand(&mut self.towers);
        info!("overclock ended");
    }

    pub fn engage_boss(&mut self) -> Result<(), BossError> {
        self.boss.engage()
    }

    /// Story reset: threat back to 1.0, any boss or Zero-Day in progress
    /// dropped.
    pub fn narrative_reset(&mut self) {
        self.spawner.narrative_reset();
        self.boss.reset_to(self.spawner.threat_level(), &self.config.boss);
        self.zero_day.reset();
        info!("narrative reset");
    }

    // ---- inbound: progression and host ----

    pub fn set_power_capacity(&mut self, capacity: u32) {
        self.power.set_capacity(capacity);
        let disabled = self.power.rebalance(&mut self.towers);
        if !disabled.is_empty() {
            info!(capacity, disabled = disabled.len(), "power capacity below usage");
        }
    }

    pub fn set_hash_storage_capacity(&mut self, capacity: u64) {
        self.economy.set_storage_capacity(capacity);
    }

    /// Ignored unless finite and non-negative.
    pub fn set_income_multiplier(&mut self, multiplier: f64) {
        if multiplier.is_finite() && multiplier >= 0.0 {
            self.income_multiplier = multiplier;
        } else {
            debug!(multiplier, "rejected income multiplier");
        }
    }

    /// Credit external income (e.g. offline earnings) through the ceiling.
    pub fn credit_hash(&mut self, amount: u64) -> u64 {
        self.economy.credit(amount)
    }

    pub fn unlock_sector(&mut self, sector: SectorId) -> bool {
        self.unlocked_sectors.insert(sector)
    }

    pub fn pause_lane(&mut self, sector: SectorId) -> bool {
        self.paused_lanes.insert(sector)
    }

    pub fn resume_lane(&mut self, sector: &SectorId) -> bool {
        self.paused_lanes.remove(sector)
    }

    /// Swap in a regenerated slot layout, re-binding live towers onto it.
    pub fn regenerate_layout(&mut self, slots: Vec<Slot>) -> RebindReport {
        self.layout = SlotLayout::new(slots);
        let towers = std::mem::take(&mut self.towers);
        let (bound, report) = reconcile::rebind(
            towers,
            &mut self.layout,
            self.config.persistence.rebind_radius,
        );
        self.towers = bound;
        self.power.rebalance(&mut self.towers);
        info!(
            direct = report.direct,
            nearby = report.nearby,
            orphans = report.orphans.len(),
            "layout regenerated"
        );
        report
    }

    // ---- restore support ----

    /// Apply persisted progress, clamped against current ceilings.
    pub fn restore_progress(&mut self, progress: Progress) {
        self.economy.restore(progress.hash, progress.leak_counter);
        self.spawner.restore_threat(progress.threat_level);
        self.boss.restore(
            progress.last_boss_milestone,
            progress.boss_cooldown_remaining,
            progress.defeated_boss_sectors,
            &self.config.boss,
        );
        self.paused_lanes = progress.paused_lanes;
    }

    /// Rebuild persisted towers and bind them into the current layout.
    pub fn adopt_towers(&mut self, seeds: Vec<TowerSeed>) -> RebindReport {
        let mut unknown = Vec::new();
        let mut towers = Vec::with_capacity(seeds.len());
        for seed in seeds {
            match self.tower_from_seed(&seed) {
                Some(tower) => towers.push(tower),
                None => unknown.push(seed),
            }
        }
        let (bound, mut report) = reconcile::rebind(
            towers,
            &mut self.layout,
            self.config.persistence.rebind_radius,
        );
        for seed in unknown {
            report.orphan(seed.archetype, seed.slot, OrphanReason::UnknownArchetype);
        }
        self.towers.extend(bound);
        self.power.rebalance(&mut self.towers);
        report
    }

    fn tower_from_seed(&mut self, seed: &TowerSeed) -> Option<Tower> {
        let cfg = &self.config;
        let arch = cfg.archetype(&seed.archetype)?;
        let level = seed.level.clamp(1, cfg.upgrades.max_level.max(1));
        let star_level = seed.star_level.min(cfg.upgrades.max_star);
        // Investment is not persisted; estimate it from the curves.
        let copies = 1u64 << star_level.min(16);
        let upgrades: u64 = (1..level)
            .filter_map(|l| upgrade_cost(arch.base_upgrade_cost, l, &cfg.upgrades))
            .fold(0u64, |acc, c| acc.saturating_add(c));
        let invested = arch
            .placement_cost
            .saturating_mul(copies)
            .saturating_add(upgrades);
        let tower = Tower {
            id: TowerId(0),
            archetype: arch.id.clone(),
            level,
            star_level,
            base_stats: arch.base_stats,
            power_draw: cfg.archetype_draw(arch),
            base_upgrade_cost: arch.base_upgrade_cost,
            invested,
            slot: seed.slot,
            position: seed.position,
            disabled: false,
        };
        Some(Tower {
            id: self.allocate_tower_id(),
            ..tower
        })
    }

    fn allocate_tower_id(&mut self) -> TowerId {
        let id = TowerId(self.next_tower_id);
        self.next_tower_id = self.next_tower_id.wrapping_add(1);
        id
    }

    fn tower_index(&self, id: TowerId) -> Option<usize> {
        self.towers.iter().position(|t| t.id == id)
    }

    // ---- outbound views ----

    pub fn config(&self) -> &BalanceConfig {
        &self.config
    }

    pub fn hash(&self) -> u64 {
        self.economy.hash()
    }

    pub fn hash_storage_capacity(&self) -> u64 {
        self.economy.storage_capacity()
    }

    pub fn hash_per_second(&self) -> f64 {
        self.economy
            .rate_per_second(self.config.economy.base_hash_per_second, self.multipliers())
    }

    pub fn efficiency(&self) -> f64 {
        self.economy.efficiency()
    }

    pub fn efficiency_below_warning(&self) -> bool {
        self.efficiency() < self.config.economy.efficiency_warning_threshold
    }

    pub fn leak_counter(&self) -> u32 {
        self.economy.leak_counter()
    }

    pub fn threat_level(&self) -> f64 {
        self.spawner.threat_level()
    }

    pub fn power_used(&self) -> u32 {
        self.power.usage(&self.towers)
    }

    pub fn power_capacity(&self) -> u32 {
        self.power.capacity()
    }

    pub fn overclock_remaining(&self) -> Option<f64> {
        self.overclock
            .active
            .then_some(self.overclock.time_remaining.max(0.0))
    }

    pub fn boss_phase(&self) -> &BossPhase {
        self.boss.phase()
    }

    pub fn last_boss_milestone(&self) -> f64 {
        self.boss.last_milestone()
    }

    pub fn boss_cooldown_remaining(&self) -> f64 {
        self.boss.cooldown_remaining()
    }

    pub fn defeated_boss_sectors(&self) -> &BTreeSet<SectorId> {
        self.boss.defeated_sectors()
    }

    pub fn zero_day(&self) -> Option<&ActiveZeroDay> {
        self.zero_day.active()
    }

    pub fn component_tier(&self) -> u32 {
        self.boss.component_tier()
    }

    /// Threat still needed before the next boss milestone.
    pub fn next_boss_milestone_distance(&self) -> Option<f64> {
        self.boss
            .next_milestone(&self.config.boss)
            .map(|m| (m - self.threat_level()).max(0.0))
    }

    pub fn towers(&self) -> &[Tower] {
        &self.towers
    }

    pub fn tower(&self, id: TowerId) -> Option<&Tower> {
        self.towers.iter().find(|t| t.id == id)
    }

    pub fn tower_stats(&self, id: TowerId) -> Option<EffectiveStats> {
        self.tower(id).map(|t| tower_stats(t, &self.config.upgrades))
    }

    pub fn tower_power_draw(&self, id: TowerId) -> Option<u32> {
        self.tower(id).map(|t| self.power.tower_demand(t))
    }

    pub fn slots(&self) -> &[Slot] {
        self.layout.slots()
    }

    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    pub fn unlocked_sectors(&self) -> &BTreeSet<SectorId> {
        &self.unlocked_sectors
    }

    pub fn paused_lanes(&self) -> &BTreeSet<SectorId> {
        &self.paused_lanes
    }

    pub fn enemies_on_field(&self) -> u32 {
        self.enemies_on_field
    }

    pub fn status(&self) -> StatusView {
        StatusView {
            hash: self.hash(),
            hash_storage_capacity: self.hash_storage_capacity(),
            hash_per_second: self.hash_per_second(),
            efficiency: self.efficiency(),
            below_warning: self.efficiency_below_warning(),
            threat_level: self.threat_level(),
            power_used: self.power_used(),
            power_capacity: self.power_capacity(),
            towers_placed: self.towers.len(),
            towers_disabled: self.towers.iter().filter(|t| t.disabled).count(),
            enemies_on_field: self.enemies_on_field,
            component_tier: self.component_tier(),
            boss_active: self.boss.is_active(),
            zero_day_active: self.zero_day.is_active(),
            next_boss_in: self.next_boss_milestone_distance(),
            overclock_remaining: self.overclock_remaining(),
        }
    }

    /// Currency ceiling, power ceiling and slot/tower consistency.
    pub fn invariants_hold(&self) -> bool {
        self.hash() <= self.hash_storage_capacity()
            && self.power_used() <= self.power_capacity()
            && self.layout.is_consistent_with(&self.towers)
            && self.threat_level() >= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lanes() -> Vec<Lane> {
        vec![
            Lane {
                sector: SectorId::new("core"),
                spawn_point: Position::new(0.0, 300.0),
            },
            Lane {
                sector: SectorId::new("north"),
                spawn_point: Position::new(300.0, 0.0),
            },
        ]
    }

    fn grid(n: u32) -> Vec<Slot> {
        (1..=n)
            .map(|i| Slot::new(SlotId(i), Position::new((i - 1) as f32 * 30.0, 0.0)))
            .collect()
    }

    fn state_with(cfg: BalanceConfig) -> SimulationState {
        SimulationState::new(cfg, grid(8), lanes(), BTreeSet::from([SectorId::new("core")]))
    }

    fn firewall() -> ArchetypeId {
        ArchetypeId::new("firewall")
    }

    #[test]
    fn ten_seconds_of_income() {
        let mut cfg = BalanceConfig::default();
        cfg.economy.base_hash_per_second = 10.0;
        cfg.economy.hash_storage_capacity = 1000;
        let mut s = state_with(cfg);
        assert_eq!(s.threat_level(), 1.0);
        for _ in 0..100 {
            s.advance(0.1);
        }
        assert!((99..=100).contains(&s.hash()), "hash = {}", s.hash());
    }

    #[test]
    fn leaks_halve_efficiency() {
        let mut s = state_with(BalanceConfig::default());
        for _ in 0..10 {
            s.report_enemy_leaked();
        }
        assert_eq!(s.leak_counter(), 10);
        assert_eq!(s.efficiency(), 50.0);
        s.advance(1_000.0);
        assert_eq!(s.efficiency(), 100.0);
    }

    #[test]
    fn second_heavy_tower_lacks_power() {
        let mut cfg = BalanceConfig::default();
        cfg.power.base_capacity = 1000;
        cfg.archetypes[0].power_draw = Some(600);
        let mut s = state_with(cfg);
        s.credit_hash(1_000);
        s.place_tower(&firewall(), SlotId(1)).unwrap();
        assert_eq!(
            s.place_tower(&firewall(), SlotId(2)),
            Err(PlacementError::InsufficientPower {
                required: 600,
                available: 400
            })
        );
        // Rejected placements cost nothing.
        assert_eq!(s.hash(), 950);
        assert!(!s.slots()[1].is_occupied());
    }

    #[test]
    fn placement_errors_are_typed() {
        let mut s = state_with(BalanceConfig::default());
        assert_eq!(
            s.place_tower(&firewall(), SlotId(1)),
            Err(PlacementError::InsufficientCurrency {
                needed: 50,
                available: 0
            })
        );
        s.credit_hash(10_000);
        assert_eq!(
            s.place_tower(&firewall(), SlotId(99)),
            Err(PlacementError::InvalidSlot(SlotId(99)))
        );
        s.place_tower(&firewall(), SlotId(1)).unwrap();
        assert_eq!(
            s.place_tower(&firewall(), SlotId(1)),
            Err(PlacementError::SlotOccupied(SlotId(1)))
        );
        assert_eq!(
            s.place_tower(&ArchetypeId::new("ghost"), SlotId(2)),
            Err(PlacementError::UnknownArchetype(ArchetypeId::new("ghost")))
        );
        assert_eq!(
            s.place_tower(&ArchetypeId::new("honeypot"), SlotId(2)),
            Err(PlacementError::ArchetypeLocked {
                archetype: ArchetypeId::new("honeypot"),
                required: 1
            })
        );
        assert!(s.invariants_hold());
    }

    #[test]
    fn upgrades_spend_and_stop_at_max() {
        let mut s = state_with(BalanceConfig::default());
        s.credit_hash(25_000);
        let id = s.place_tower(&firewall(), SlotId(1)).unwrap();
        let before = s.tower_stats(id).unwrap();
        s.upgrade_tower(id).unwrap();
        assert_eq!(s.hash(), 25_000 - 50 - 25);
        assert_eq!(s.tower(id).unwrap().level, 2);
        assert!(s.tower_stats(id).unwrap().damage > before.damage);
        for _ in 2..10 {
            s.upgrade_tower(id).unwrap();
        }
        assert_eq!(s.tower(id).unwrap().level, 10);
        assert_eq!(s.upgrade_tower(id), Err(UpgradeError::MaxLevel(id)));
        assert_eq!(
            s.upgrade_tower(TowerId(404)),
            Err(UpgradeError::UnknownTower(TowerId(404)))
        );
    }

    #[test]
    fn upgrade_without_funds_is_rejected() {
        let mut s = state_with(BalanceConfig::default());
        s.credit_hash(60);
        let id = s.place_tower(&firewall(), SlotId(1)).unwrap();
        assert_eq!(
            s.upgrade_tower(id),
            Err(UpgradeError::InsufficientCurrency {
                needed: 25,
                available: 10
            })
        );
        assert_eq!(s.tower(id).unwrap().level, 1);
    }

    #[test]
    fn merge_promotes_and_frees_donor_slot() {
        let mut s = state_with(BalanceConfig::default());
        s.credit_hash(10_000);
        let a = s.place_tower(&firewall(), SlotId(1)).unwrap();
        let b = s.place_tower(&firewall(), SlotId(2)).unwrap();
        let single = s.tower_stats(a).unwrap();
        let base_draw = s.tower(a).unwrap().power_draw;

        assert_eq!(s.merge_towers(a, b), Ok(a));
        let merged = s.tower(a).unwrap();
        assert_eq!(merged.star_level, 1);
        assert!(s.tower(b).is_none());
        assert!(!s.slots()[1].is_occupied());
        assert!(s.tower_stats(a).unwrap().damage > single.damage);
        assert!(s.tower_power_draw(a).unwrap() < 2 * base_draw);
        assert_eq!(s.power_used(), s.tower_power_draw(a).unwrap());
        assert!(s.invariants_hold());
    }

    #[test]
    fn merge_rejects_mismatches() {
        let mut s = state_with(BalanceConfig::default());
        s.credit_hash(10_000);
        let a = s.place_tower(&firewall(), SlotId(1)).unwrap();
        let c = s
            .place_tower(&ArchetypeId::new("scanner"), SlotId(3))
            .unwrap();
        assert_eq!(
            s.merge_towers(a, c),
            Err(MergeError::Ineligible(
                sim_core::MergeIneligibility::DifferentArchetype
            ))
        );
        assert_eq!(
            s.merge_towers(a, TowerId(77)),
            Err(MergeError::UnknownTower(TowerId(77)))
        );
    }

    #[test]
    fn sell_refunds_half_and_frees_slot() {
        let mut s = state_with(BalanceConfig::default());
        s.credit_hash(50);
        let id = s.place_tower(&firewall(), SlotId(4)).unwrap();
        assert_eq!(s.hash(), 0);
        assert_eq!(s.sell_tower(id), Ok(25));
        assert_eq!(s.hash(), 25);
        assert!(s.towers().is_empty());
        assert!(!s.slots()[3].is_occupied());
        assert_eq!(s.sell_tower(id), Err(SellError::UnknownTower(id)));
    }

    #[test]
    fn overclock_deficit_disables_then_restores() {
        let mut s = state_with(BalanceConfig::default());
        s.credit_hash(10_000);
        s.set_power_capacity(100);
        for slot in 1..=3 {
            s.place_tower(&firewall(), SlotId(slot)).unwrap();
        }
        s.place_tower(&ArchetypeId::new("scanner"), SlotId(4))
            .unwrap();
        assert_eq!(s.power_used(), 70);

        let rate = s.hash_per_second();
        s.set_overclock(true);
        assert_eq!(s.hash_per_second(), rate * 2.0);
        let disabled: Vec<_> = s.towers().iter().filter(|t| t.disabled).collect();
        assert_eq!(disabled.len(), 1);
        assert_eq!(disabled[0].id, TowerId(1));
        assert!(s.power_used() <= s.power_capacity());
        // Disabled towers keep their slot.
        assert!(s.slots()[0].is_occupied());

        let report = s.advance(61.0);
        assert!(report.overclock_expired);
        assert!(s.overclock_remaining().is_none());
        assert!(s.towers().iter().all(|t| t.is_active()));
        assert_eq!(s.power_used(), 70);
    }

    #[test]
    fn overclock_placement_cannot_borrow_disabled_power() {
        let mut cfg = BalanceConfig::default();
        cfg.archetypes[0].power_draw = Some(40);
        cfg.archetypes[1].power_draw = Some(26);
        let mut s = state_with(cfg);
        s.credit_hash(10_000);
        s.set_power_capacity(100);
        s.place_tower(&firewall(), SlotId(1)).unwrap();
        s.place_tower(&firewall(), SlotId(2)).unwrap();
        s.set_overclock(true);
        assert_eq!(s.status().towers_disabled, 1);
        assert_eq!(s.power_used(), 60);

        // 39 fits the overclocked headroom but 26 does not fit beside 80 at
        // normal demand.
        let hash = s.hash();
        assert_eq!(
            s.place_tower(&ArchetypeId::new("scanner"), SlotId(3)),
            Err(PlacementError::InsufficientPower {
                required: 26,
                available: 20
            })
        );
        assert_eq!(s.hash(), hash);

        let mut cfg = s.config().clone();
        cfg.archetypes[1].power_draw = Some(20);
        let mut s = state_with(cfg);
        s.credit_hash(10_000);
        s.set_power_capacity(100);
        s.place_tower(&firewall(), SlotId(1)).unwrap();
        s.place_tower(&firewall(), SlotId(2)).unwrap();
        s.set_overclock(true);
        let scanner = s.place_tower(&ArchetypeId::new("scanner"), SlotId(3)).unwrap();
        s.advance(0.1);
        assert!(s.tower(scanner).is_some_and(|t| t.is_active()));

        s.set_overclock(false);
        assert!(s.towers().iter().all(|t| t.is_active()));
        assert_eq!(s.power_used(), 100);
    }

    #[test]
    fn overclock_doubles_threat_growth() {
        let mut plain = state_with(BalanceConfig::default());
        let mut boosted = state_with(BalanceConfig::default());
        boosted.set_overclock(true);
        plain.advance(10.0);
        boosted.advance(10.0);
        let gp = plain.threat_level() - 1.0;
        let gb = boosted.threat_level() - 1.0;
        assert!((gb - 2.0 * gp).abs() < 1e-9);
    }

    #[test]
    fn boss_victory_unlocks_tier_once() {
        let mut s = state_with(BalanceConfig::default());
        s.restore_progress(Progress {
            threat_level: 5.2,
            ..Progress::default()
        });
        assert!(s.advance(0.1).boss_spawn.is_none());
        let spawn = s.advance(0.1).boss_spawn.expect("boss spawns");
        assert_eq!(spawn.sector, SectorId::new("core"));
        assert_eq!(s.engage_boss(), Ok(()));

        let hash_before = s.hash();
        let outcome = s.report_enemy_killed(true);
        assert!(matches!(
            outcome,
            KillOutcome::Boss(BossResolution::Victory {
                first_defeat: true,
                ..
            })
        ));
        assert_eq!(s.hash(), hash_before + 250);
        assert_eq!(s.component_tier(), 1);
        assert_eq!(s.report_enemy_killed(true), KillOutcome::NoBossActive);
        assert_eq!(s.component_tier(), 1);

        s.credit_hash(1_000);
        assert!(s
            .place_tower(&ArchetypeId::new("honeypot"), SlotId(1))
            .is_ok());
    }

    #[test]
    fn unengaged_boss_ignores_kills() {
        let mut s = state_with(BalanceConfig::default());
        s.restore_progress(Progress {
            threat_level: 5.0,
            ..Progress::default()
        });
        s.advance(0.1);
        s.advance(0.1);
        assert!(matches!(s.boss_phase(), BossPhase::Active(_)));
        assert_eq!(
            s.report_enemy_killed(true),
            KillOutcome::Boss(BossResolution::NotEngaged)
        );
        assert!(matches!(s.boss_phase(), BossPhase::Active(_)));
        let leaks = s.leak_counter();
        assert!(s.report_boss_escaped().is_ok());
        assert_eq!(s.leak_counter(), leaks + 1);
        assert_eq!(s.component_tier(), 0);
        assert_eq!(s.engage_boss(), Err(BossError::NoBossActive));
    }

    #[test]
    fn regular_kills_pay_bounty() {
        let mut s = state_with(BalanceConfig::default());
        assert_eq!(
            s.report_enemy_killed(false),
            KillOutcome::Regular { bounty: 1 }
        );
        assert_eq!(s.hash(), 1);
    }

    #[test]
    fn host_setters_shape_income_and_storage() {
        let mut s = state_with(BalanceConfig::default());
        s.set_income_multiplier(3.0);
        assert_eq!(s.hash_per_second(), 3.0);
        s.set_income_multiplier(f64::NAN);
        assert_eq!(s.hash_per_second(), 3.0);

        s.credit_hash(500);
        s.set_hash_storage_capacity(200);
        assert_eq!(s.hash(), 200);
        assert_eq!(s.credit_hash(50), 0);
    }

    #[test]
    fn resumed_lane_spawns_again() {
        let mut s = state_with(BalanceConfig::default());
        assert!(s.pause_lane(SectorId::new("core")));
        assert!(crate::run_seconds(&mut s, 30.0, 0.5).spawns.is_empty());
        assert!(s.resume_lane(&SectorId::new("core")));
        let spawned = crate::run_seconds(&mut s, 30.0, 0.5).spawns.len();
        assert!(spawned > 0);
        assert_eq!(s.enemies_on_field() as usize, spawned);
    }

    #[test]
    fn locked_and_paused_lanes_never_spawn() {
        let mut cfg = BalanceConfig::default();
        cfg.threat.max_enemies_on_screen = 10_000;
        let mut s = state_with(cfg);
        let mut summary = crate::run_seconds(&mut s, 120.0, 0.5);
        assert!(summary
            .spawns
            .iter()
            .all(|r| r.sector == SectorId::new("core")));

        s.pause_lane(SectorId::new("core"));
        summary = crate::run_seconds(&mut s, 60.0, 0.5);
        assert!(summary.spawns.is_empty());

        s.unlock_sector(SectorId::new("north"));
        summary = crate::run_seconds(&mut s, 60.0, 0.5);
        assert!(!summary.spawns.is_empty());
        assert!(summary
            .spawns
            .iter()
            .all(|r| r.sector == SectorId::new("north")));
    }

    #[test]
    fn narrative_reset_is_the_only_threat_decrease() {
        let mut s = state_with(BalanceConfig::default());
        s.advance(100.0);
        assert!(s.threat_level() > 1.0);
        s.narrative_reset();
        assert_eq!(s.threat_level(), 1.0);
    }

    #[test]
    fn regenerated_layout_rebinds_or_drops() {
        let mut s = state_with(BalanceConfig::default());
        s.credit_hash(10_000);
        let t1 = s.place_tower(&firewall(), SlotId(1)).unwrap();
        let t2 = s.place_tower(&firewall(), SlotId(2)).unwrap();
        let t3 = s.place_tower(&firewall(), SlotId(3)).unwrap();

        let report = s.regenerate_layout(vec![
            Slot::new(SlotId(1), Position::new(0.0, 0.0)),
            Slot::new(SlotId(40), Position::new(32.0, 0.0)),
        ]);
        assert_eq!(report.direct, 1);
        assert_eq!(report.nearby, 1);
        assert_eq!(report.orphans.len(), 1);
        assert_eq!(s.tower(t1).unwrap().slot, SlotId(1));
        assert_eq!(s.tower(t2).unwrap().slot, SlotId(40));
        assert_eq!(s.tower(t2).unwrap().position, Position::new(32.0, 0.0));
        assert!(s.tower(t3).is_none());
        assert_eq!(s.power_used(), 30);
        assert!(s.invariants_hold());
    }

    #[test]
    fn adopting_unknown_archetype_orphans_only_that_tower() {
        let mut s = state_with(BalanceConfig::default());
        let report = s.adopt_towers(vec![
            TowerSeed {
                archetype: ArchetypeId::new("ghost"),
                level: 3,
                star_level: 0,
                slot: SlotId(1),
                position: Position::new(0.0, 0.0),
            },
            TowerSeed {
                archetype: firewall(),
                level: 42,
                star_level: 9,
                slot: SlotId(2),
                position: Position::new(30.0, 0.0),
            },
        ]);
        assert_eq!(report.direct, 1);
        assert_eq!(report.orphans.len(), 1);
        assert_eq!(report.orphans[0].reason, OrphanReason::UnknownArchetype);
        let t = &s.towers()[0];
        assert_eq!(t.level, 10);
        assert_eq!(t.star_level, 3);
        assert!(s.invariants_hold());
    }

    fn zero_day_state() -> SimulationState {
        let mut cfg = BalanceConfig::default();
        cfg.economy.base_hash_per_second = 0.0;
        cfg.economy.leak_decay_interval = 1e9;
        cfg.zero_day.min_waves_before_spawn = 2;
        cfg.zero_day.efficiency_drain_rate = 5.0;
        cfg.zero_day.defeat_efficiency_restore = 25.0;
        cfg.zero_day.defeat_hash_bonus = 500;
        let mut s = state_with(cfg);
        let spawned = (0..20).any(|_| s.advance(1.0).zero_day_spawn.is_some());
        assert!(spawned, "zero-day never spawned");
        s
    }

    #[test]
    fn zero_day_drains_efficiency_until_defeated() {
        let mut s = zero_day_state();
        assert!(s.status().zero_day_active);
        assert_eq!(s.leak_counter(), 0);

        for _ in 0..10 {
            s.advance(1.0);
        }
        assert_eq!(s.efficiency(), 50.0);
        assert!(!s.status().below_warning);
        s.advance(1.0);
        assert_eq!(s.efficiency(), 45.0);
        assert!(s.status().below_warning);

        let defeat = s.report_zero_day_defeated().unwrap();
        assert_eq!(defeat.leaks_restored, 5);
        assert_eq!(s.hash(), 500);
        assert_eq!(s.efficiency(), 70.0);
        let status = s.status();
        assert!(!status.zero_day_active && !status.below_warning);
        assert!(s.report_zero_day_defeated().is_none());

        // Drain stops with it.
        s.advance(1.0);
        assert_eq!(s.efficiency(), 70.0);
    }

    #[test]
    fn zero_day_escape_leaks_and_reset_drops_it() {
        let mut s = zero_day_state();
        assert!(s.report_zero_day_escaped());
        assert_eq!(s.leak_counter(), 1);
        assert!(!s.report_zero_day_escaped());

        let mut s = zero_day_state();
        s.narrative_reset();
        assert!(s.zero_day().is_none());
        assert_eq!(s.hash(), 0);
    }

    #[test]
    fn status_view_serializes() {
        let s = state_with(BalanceConfig::default());
        let json = serde_json::to_string(&s.status()).unwrap();
        assert!(json.contains("\"efficiency\":100.0"));
    }

    #[test]
    fn bad_dt_is_a_no_op() {
        let mut s = state_with(BalanceConfig::default());
        let report = s.advance(f64::NAN);
        assert_eq!(report.credited, 0);
        assert_eq!(s.threat_level(), 1.0);
        s.advance(-3.0);
        assert_eq!(s.threat_level(), 1.0);
    }

    proptest! {
        #[test]
        fn invariants_hold_under_random_play(
            ops in proptest::collection::vec((0u8..9, any::<u8>(), any::<u8>()), 1..80)
        ) {
            let mut s = state_with(BalanceConfig::default());
            s.credit_hash(20_000);
            let archetypes = [firewall(), ArchetypeId::new("scanner")];
            for (op, a, b) in ops {
                let ids: Vec<TowerId> = s.towers().iter().map(|t| t.id).collect();
                let pick = |n: u8| ids.get(n as usize % ids.len().max(1)).copied();
                match op {
                    0 => {
                        let _ = s.place_tower(&archetypes[a as usize % 2], SlotId(b as u32 % 10 + 1));
                    }
                    1 => {
                        if let (Some(x), Some(y)) = (pick(a), pick(b)) {
                            let _ = s.merge_towers(x, y);
                        }
                    }
                    2 => s.set_overclock(a % 2 == 0),
                    3 => {
                        s.advance(b as f64 / 10.0);
                    }
                    4 => s.report_enemy_leaked(),
                    5 => {
                        if let Some(x) = pick(a) {
                            let _ = s.sell_tower(x);
                        }
                    }
                    6 => s.set_power_capacity(a as u32 * 2),
                    7 => {
                        if let Some(x) = pick(a) {
                            let _ = s.upgrade_tower(x);
                        }
                    }
                    _ => {
                        let _ = s.report_enemy_killed(false);
                    }
                }
                prop_assert!(s.invariants_hold());
                prop_assert!(s.hash() <= s.hash_storage_capacity());
                prop_assert!(
                    s.power_used() <= s.power_capacity()
                        || s.towers().iter().any(|t| t.disabled)
                );
            }
        }
    }
}
