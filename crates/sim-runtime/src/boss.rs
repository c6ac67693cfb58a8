//! Boss milestones: Dormant -> Eligible -> Active -> (Victory | Escaped) ->
//! Cooldown -> Dormant.
//!
//! Bosses ignore passive tower damage. A kill only counts after the host
//! reports that the player engaged the boss.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use sim_core::{sanitize_dt, BossConfig, BossError, Lane, Position, SectorId};
use std::collections::BTreeSet;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActiveBoss {
    pub id: u32,
    pub sector: SectorId,
    pub milestone: f64,
    pub health: f32,
    pub engaged: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum BossPhase {
    Dormant,
    Eligible { milestone: f64 },
    Active(ActiveBoss),
    Cooldown { remaining: f64 },
}

/// Emitted when a boss enters the field.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BossSpawn {
    pub id: u32,
    pub sector: SectorId,
    pub spawn_point: Position,
    pub health: f32,
    pub milestone: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum BossResolution {
    Victory {
        sector: SectorId,
        milestone: f64,
        /// True the first time this sector's boss falls.
        first_defeat: bool,
    },
    Escaped {
        sector: SectorId,
        milestone: f64,
    },
    /// Kill reported before the player engaged; the boss stays active.
    NotEngaged,
}

/// Highest milestone reached at `threat`, capped at the configured maximum.
pub fn milestone_at(threat: f64, cfg: &BossConfig) -> f64 {
    if !(threat.is_finite() && cfg.milestone_interval > 0.0) {
        return 0.0;
    }
    let reached = (threat / cfg.milestone_interval).floor() * cfg.milestone_interval;
    reached.clamp(0.0, cfg.max_milestone)
}

#[derive(Clone, Debug)]
pub struct BossMilestoneController {
    phase: BossPhase,
    last_milestone: f64,
    defeated_sectors: BTreeSet<SectorId>,
    next_boss_id: u32,
    rng: ChaCha8Rng,
}

impl BossMilestoneController {
    pub fn new(seed: u64) -> Self {
        Self {
            phase: BossPhase::Dormant,
            last_milestone: 0.0,
            defeated_sectors: BTreeSet::new(),
            next_boss_id: 1,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn phase(&self) -> &BossPhase {
        &self.phase
    }

    pub fn active_boss(&self) -> Option<&ActiveBoss> {
        match &self.phase {
            BossPhase::Active(boss) => Some(boss),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active_boss().is_some()
    }

    pub fn last_milestone(&self) -> f64 {
        self.last_milestone
    }

    pub fn cooldown_remaining(&self) -> f64 {
        match self.phase {
            BossPhase::Cooldown { remaining } => remaining.max(0.0),
            _ => 0.0,
        }
    }

    pub fn defeated_sectors(&self) -> &BTreeSet<SectorId> {
        &self.defeated_sectors
    }

    /// Unlock tier earned from first-time boss defeats.
    pub fn component_tier(&self) -> u32 {
        self.defeated_sectors.len() as u32
    }

    /// Next milestone that can still trigger a boss.
    pub fn next_milestone(&self, cfg: &BossConfig) -> Option<f64> {
        let next = self.last_milestone + cfg.milestone_interval;
        (next <= cfg.max_milestone).then_some(next)
    }

    /// One ordered step. `lanes` are the currently open lanes.
    pub fn tick(
        &mut self,
        dt: f64,
        threat: f64,
        cfg: &BossConfig,
        lanes: &[&Lane],
    ) -> Option<BossSpawn> {
        let dt = sanitize_dt(dt);
        match self.phase {
            BossPhase::Active(_) => None,
            BossPhase::Eligible { milestone } => {
                if lanes.is_empty() {
                    return None;
                }
                let lane = lanes[self.rng.gen_range(0..lanes.len())];
                Some(self.spawn(lane, milestone, cfg))
            }
            BossPhase::Cooldown { remaining } => {
                let remaining = remaining - dt;
                if remaining > 0.0 {
                    self.phase = BossPhase::Cooldown { remaining };
                    return None;
                }
                info!("boss cooldown finished");
                self.phase = BossPhase::Dormant;
                self.check_eligible(threat, cfg);
                None
            }
            BossPhase::Dormant => {
                self.check_eligible(threat, cfg);
                None
            }
        }
    }

    fn check_eligible(&mut self, threat: f64, cfg: &BossConfig) {
        let milestone = milestone_at(threat, cfg);
        if milestone > self.last_milestone && milestone >= cfg.milestone_interval {
            info!(milestone, threat, "boss milestone reached");
            self.phase = BossPhase::Eligible { milestone };
        }
    }

    fn spawn(&mut self, lane: &Lane, milestone: f64, cfg: &BossConfig) -> BossSpawn {
        let id = self.next_boss_id;
        self.next_boss_id = self.next_boss_id.wrapping_add(1);
        let index = (milestone / cfg.milestone_interval).max(1.0) as f32;
        let health = cfg.base_health * (1.0 + (index - 1.0) * cfg.health_per_milestone);
        info!(id, sector = %lane.sector, milestone, health, "boss spawned");
        self.phase = BossPhase::Active(ActiveBoss {
            id,
            sector: lane.sector.clone(),
            milestone,
            health,
            engaged: false,
        });
        BossSpawn {
            id,
            sector: lane.sector.clone(),
            spawn_point: lane.spawn_point,
            health,
            milestone,
        }
    }

    /// The player committed to the fight; kills are honored from now on.
    pub fn engage(&mut self) -> Result<(), BossError> {
        match &mut self.phase {
            BossPhase::Active(boss) => {
                boss.engaged = true;
                Ok(())
            }
            _ => Err(BossError::NoBossActive),
        }
    }

    pub fn report_killed(&mut self, cfg: &BossConfig) -> Result<BossResolution, BossError> {
        let boss = match &self.phase {
            BossPhase::Active(boss) => boss.clone(),
            _ => return Err(BossError::NoBossActive),
        };
        if !boss.engaged {
            return Ok(BossResolution::NotEngaged);
        }
        self.last_milestone = boss.milestone;
        let first_defeat = self.defeated_sectors.insert(boss.sector.clone());
        self.phase = BossPhase::Cooldown {
            remaining: cfg.cooldown_seconds,
        };
        info!(sector = %boss.sector, first_defeat, "boss defeated");
        Ok(BossResolution::Victory {
            sector: boss.sector,
            milestone: boss.milestone,
            first_defeat,
        })
    }

    pub fn report_escaped(&mut self, cfg: &BossConfig) -> Result<BossResolution, BossError> {
        let boss = match &self.phase {
            BossPhase::Active(boss) => boss.clone(),
            _ => return Err(BossError::NoBossActive),
        };
        self.last_milestone = boss.milestone;
        self.phase = BossPhase::Cooldown {
            remaining: cfg.cooldown_seconds,
        };
        info!(sector = %boss.sector, "boss escaped");
        Ok(BossResolution::Escaped {
            sector: boss.sector,
            milestone: boss.milestone,
        })
    }

    /// Load persisted progress. A boss in flight at save time is not
    /// restored; its milestone becomes eligible again.
    pub fn restore(
        &mut self,
        last_milestone: f64,
        cooldown_remaining: f64,
        defeated_sectors: BTreeSet<SectorId>,
        cfg: &BossConfig,
    ) {
        // Milestones live on the interval grid; off-grid values snap down.
        self.last_milestone = if last_milestone.is_finite() && cfg.milestone_interval > 0.0 {
            let snapped = (last_milestone / cfg.milestone_interval).floor() * cfg.milestone_interval;
            snapped.clamp(0.0, cfg.max_milestone)
        } else {
            0.0
        };
        let remaining = if cooldown_remaining.is_finite() {
            cooldown_remaining.clamp(0.0, cfg.cooldown_seconds)
        } else {
            0.0
        };
        self.phase = if remaining > 0.0 {
            BossPhase::Cooldown { remaining }
        } else {
            BossPhase::Dormant
        };
        self.defeated_sectors = defeated_sectors;
    }

    /// Drop any boss in progress and pull the milestone back under `threat`.
    pub fn reset_to(&mut self, threat: f64, cfg: &BossConfig) {
        self.phase = BossPhase::Dormant;
        self.last_milestone = self.last_milestone.min(milestone_at(threat, cfg));
    }
}
