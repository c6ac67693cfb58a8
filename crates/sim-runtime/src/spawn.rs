//! Threat growth and the continuous enemy spawn cadence.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use sim_core::{sanitize_dt, EnemyKind, Lane, Position, SectorId, ThreatConfig};
use std::collections::BTreeSet;
use tracing::trace;

/// One enemy the combat layer should spawn.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpawnRequest {
    pub kind: EnemyKind,
    pub sector: SectorId,
    pub spawn_point: Position,
    pub health_multiplier: f32,
    pub speed_multiplier: f32,
    pub damage_multiplier: f32,
}

/// Seconds between spawns at `threat`; asymptotic, never below the floor.
pub fn spawn_interval(threat: f64, cfg: &ThreatConfig) -> f64 {
    let scaled = cfg.base_spawn_interval / (1.0 + threat * cfg.spawn_scaling_factor);
    scaled.max(cfg.floor_spawn_interval)
}

/// Enemy kinds unlocked at `threat`. Always contains `Basic`.
pub fn eligible_kinds(threat: f64, cfg: &ThreatConfig) -> Vec<EnemyKind> {
    let mut kinds = vec![EnemyKind::Basic];
    if threat >= cfg.fast_unlock_threat {
        kinds.push(EnemyKind::Fast);
    }
    if threat >= cfg.tank_unlock_threat {
        kinds.push(EnemyKind::Tank);
    }
    if threat >= cfg.elite_unlock_threat {
        kinds.push(EnemyKind::Elite);
    }
    kinds
}

/// Lanes whose sector is unlocked and not paused, in declaration order.
pub fn open_lanes<'a>(
    lanes: &'a [Lane],
    unlocked: &BTreeSet<SectorId>,
    paused: &BTreeSet<SectorId>,
) -> Vec<&'a Lane> {
    lanes
        .iter()
        .filter(|l| unlocked.contains(&l.sector) && !paused.contains(&l.sector))
        .collect()
}

fn scale(threat: f64, per_point: f64) -> f32 {
    (1.0 + (threat - 1.0).max(0.0) * per_point).min(f32::MAX as f64) as f32
}

/// Read-only inputs of one scheduler tick.
#[derive(Clone, Copy, Debug)]
pub struct SpawnContext<'a> {
    /// Growth multiplier, e.g. the overclock factor.
    pub growth_multiplier: f64,
    pub enemies_on_field: u32,
    pub lanes: &'a [&'a Lane],
}

/// Owns the threat level and the spawn timer.
#[derive(Clone, Debug)]
pub struct ThreatSpawnScheduler {
    threat_level: f64,
    spawn_timer: f64,
    rng: ChaCha8Rng,
}

impl ThreatSpawnScheduler {
    pub fn new(seed: u64) -> Self {
        Self {
            threat_level: 1.0,
            spawn_timer: 0.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn threat_level(&self) -> f64 {
        self.threat_level
    }

    /// Grow threat and emit at most one spawn.
    ///
    /// The timer resets whenever it elapses, even when the field is at cap or
    /// no lane is open, so skipped spawns are never banked.
    pub fn tick(
        &mut self,
        dt: f64,
        cfg: &ThreatConfig,
        ctx: &SpawnContext<'_>,
    ) -> Option<SpawnRequest> {
        let dt = sanitize_dt(dt);
        let growth = cfg.growth_rate_per_second * ctx.growth_multiplier;
        if growth.is_finite() && growth > 0.0 {
            // Saturates at f64::MAX so threat never turns infinite.
            self.threat_level = (self.threat_level + growth * dt).min(f64::MAX);
        }

        self.spawn_timer += dt;
        if self.spawn_timer < spawn_interval(self.threat_level, cfg) {
            return None;
        }
        self.spawn_timer = 0.0;

        if ctx.enemies_on_field >= cfg.max_enemies_on_screen {
            trace!(on_field = ctx.enemies_on_field, "spawn skipped at cap");
            return None;
        }
        if ctx.lanes.is_empty() {
            return None;
        }
        let lane = ctx.lanes[self.rng.gen_range(0..ctx.lanes.len())];
        let kinds = eligible_kinds(self.threat_level, cfg);
        let kind = kinds[self.rng.gen_range(0..kinds.len())];
        let threat = self.threat_level;
        Some(SpawnRequest {
            kind,
            sector: lane.sector.clone(),
            spawn_point: lane.spawn_point,
            health_multiplier: scale(threat, cfg.health_scaling),
            speed_multiplier: scale(threat, cfg.speed_scaling),
            damage_multiplier: scale(threat, cfg.damage_scaling),
        })
    }

    /// Load a persisted threat level. Non-finite or sub-1 values become 1.0.
    pub fn restore_threat(&mut self, threat: f64) {
        self.threat_level = if threat.is_finite() { threat.max(1.0) } else { 1.0 };
        self.spawn_timer = 0.0;
    }

    /// The only path that lowers threat.
    pub fn narrative_reset(&mut self) {
        self.threat_level = 1.0;
        self.spawn_timer = 0.0;
    }
}
