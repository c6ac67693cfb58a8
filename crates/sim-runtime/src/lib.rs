#![deny(warnings)]

//! Simulation runtime: the aggregate state and its per-tick systems.
//!
//! A host loop owns one [`SimulationState`] and calls
//! [`SimulationState::advance`] once per frame. Economy, spawning, power and
//! boss milestones each run one ordered sub-step inside that call.

pub mod boss;
pub mod layout;
pub mod power;
pub mod reconcile;
pub mod spawn;
pub mod state;
pub mod zero_day;

pub use boss::{ActiveBoss, BossMilestoneController, BossPhase, BossResolution, BossSpawn};
pub use layout::SlotLayout;
pub use power::PowerBudgetAllocator;
pub use reconcile::{Orphan, OrphanReason, RebindReport};
pub use spawn::{SpawnRequest, ThreatSpawnScheduler};
pub use state::{KillOutcome, Progress, SimulationState, StatusView, TickReport, TowerSeed};
pub use zero_day::{ActiveZeroDay, ZeroDayController, ZeroDayDefeat, ZeroDaySpawn, ZeroDayTick};

use serde::Serialize;
use sim_core::sanitize_dt;

/// Aggregate of a multi-tick run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub credited: u64,
    pub spawns: Vec<SpawnRequest>,
    pub boss_spawns: Vec<BossSpawn>,
    pub zero_day_spawns: Vec<ZeroDaySpawn>,
}

/// Advance `state` by `seconds` in fixed steps of `step` seconds; the last
/// step is shortened to land exactly on the total.
pub fn run_seconds(state: &mut SimulationState, seconds: f64, step: f64) -> RunSummary {
    let mut summary = RunSummary::default();
    let step = sanitize_dt(step);
    if step <= 0.0 {
        return summary;
    }
    let mut remaining = sanitize_dt(seconds);
    while remaining > 0.0 {
        let dt = step.min(remaining);
        remaining -= dt;
        let report = state.advance(dt);
        summary.ticks += 1;
        summary.credited = summary.credited.saturating_add(report.credited);
        summary.spawns.extend(report.spawn);
        summary.boss_spawns.extend(report.boss_spawn);
        summary.zero_day_spawns.extend(report.zero_day_spawn);
    }
    summary
}
