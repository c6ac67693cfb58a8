//! The Zero-Day: a single rare enemy that drains efficiency while alive.
//!
//! It becomes due after a number of regular spawns, enters on a random open
//! lane, and converts its efficiency drain into leaks on the economy's
//! counter. Defeating it pays a bounty and gives efficiency back.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use sim_core::{sanitize_dt, Lane, Position, SectorId, ThreatConfig, ZeroDayConfig};
use tracing::info;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActiveZeroDay {
    pub id: u32,
    pub sector: SectorId,
    pub health: f32,
    pub speed: f32,
}

/// Emitted when a Zero-Day enters the field.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZeroDaySpawn {
    pub id: u32,
    pub sector: SectorId,
    pub spawn_point: Position,
    pub health: f32,
    pub speed: f32,
}

/// What one controller tick produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZeroDayTick {
    pub spawn: Option<ZeroDaySpawn>,
    /// Leaks to record for the drain accrued this tick.
    pub leaks: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ZeroDayDefeat {
    pub hash_bonus: u64,
    /// Leaks to clear from the counter.
    pub leaks_restored: u32,
}

#[derive(Clone, Debug)]
pub struct ZeroDayController {
    waves_seen: u32,
    active: Option<ActiveZeroDay>,
    drain_carry: f64,
    next_id: u32,
    rng: ChaCha8Rng,
}

impl ZeroDayController {
    pub fn new(seed: u64) -> Self {
        Self {
            waves_seen: 0,
            active: None,
            drain_carry: 0.0,
            next_id: 1,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn active(&self) -> Option<&ActiveZeroDay> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Regular spawns counted toward the next Zero-Day.
    pub fn waves_seen(&self) -> u32 {
        self.waves_seen
    }

    /// A regular enemy spawned.
    pub fn record_wave(&mut self) {
        if self.active.is_none() {
            self.waves_seen = self.waves_seen.saturating_add(1);
        }
    }

    /// Drain while active, otherwise spawn once enough waves have passed and
    /// a lane is open. `leak_penalty` is efficiency points per leak.
    pub fn tick(
        &mut self,
        dt: f64,
        threat: f64,
        cfg: &ZeroDayConfig,
        threat_cfg: &ThreatConfig,
        leak_penalty: f64,
        lanes: &[&Lane],
    ) -> ZeroDayTick {
        let dt = sanitize_dt(dt);
        if self.active.is_some() {
            return ZeroDayTick {
                spawn: None,
                leaks: self.drain(dt, cfg, leak_penalty),
            };
        }
        if self.waves_seen < cfg.min_waves_before_spawn || lanes.is_empty() {
            return ZeroDayTick::default();
        }
        let lane = lanes[self.rng.gen_range(0..lanes.len())];
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let scale = 1.0 + (threat - 1.0).max(0.0) * threat_cfg.health_scaling;
        let health = (cfg.base_health as f64 * scale).min(f32::MAX as f64) as f32;
        info!(id, sector = %lane.sector, health, "zero-day spawned");
        self.waves_seen = 0;
        self.drain_carry = 0.0;
        self.active = Some(ActiveZeroDay {
            id,
            sector: lane.sector.clone(),
            health,
            speed: cfg.speed,
        });
        ZeroDayTick {
            spawn: Some(ZeroDaySpawn {
                id,
                sector: lane.sector.clone(),
                spawn_point: lane.spawn_point,
                health,
                speed: cfg.speed,
            }),
            leaks: 0,
        }
    }

    fn drain(&mut self, dt: f64, cfg: &ZeroDayConfig, leak_penalty: f64) -> u32 {
        if !(leak_penalty > 0.0 && cfg.efficiency_drain_rate > 0.0) {
            return 0;
        }
        let carry = self.drain_carry + cfg.efficiency_drain_rate * dt;
        if !carry.is_finite() {
            self.drain_carry = 0.0;
            return u32::MAX;
        }
        let leaks = (carry / leak_penalty).floor();
        self.drain_carry = carry - leaks * leak_penalty;
        leaks.min(u32::MAX as f64) as u32
    }

    /// The player killed the Zero-Day. `None` when none is on the field.
    pub fn report_defeated(
        &mut self,
        cfg: &ZeroDayConfig,
        leak_penalty: f64,
    ) -> Option<ZeroDayDefeat> {
        let zd = self.active.take()?;
        self.drain_carry = 0.0;
        let leaks_restored = if leak_penalty > 0.0 && cfg.defeat_efficiency_restore > 0.0 {
            (cfg.defeat_efficiency_restore / leak_penalty)
                .ceil()
                .min(u32::MAX as f64) as u32
        } else {
            0
        };
        info!(id = zd.id, sector = %zd.sector, "zero-day defeated");
        Some(ZeroDayDefeat {
            hash_bonus: cfg.defeat_hash_bonus,
            leaks_restored,
        })
    }

    /// The Zero-Day reached the defended node and left the field.
    pub fn report_escaped(&mut self) -> Option<ActiveZeroDay> {
        let zd = self.active.take()?;
        self.drain_carry = 0.0;
        info!(id = zd.id, sector = %zd.sector, "zero-day escaped");
        Some(zd)
    }

    /// Drop any Zero-Day in progress and restart the wave count.
    pub fn reset(&mut self) {
        self.active = None;
        self.waves_seen = 0;
        self.drain_carry = 0.0;
    }
}
