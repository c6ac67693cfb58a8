//! Balance configuration consumed read-only by the simulation.
//!
//! Every section has serde defaults so partial config files only need the
//! values they override.

use crate::{ArchetypeId, BaseStats, Rarity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Income, leak and storage parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Hash per second at 100% efficiency before multipliers.
    pub base_hash_per_second: f64,
    /// Efficiency points lost per outstanding leak.
    pub leak_penalty: f64,
    /// Seconds between decays of the leak counter by one.
    pub leak_decay_interval: f64,
    /// Hard ceiling of the hash balance.
    pub hash_storage_capacity: u64,
    /// Hash credited per regular kill.
    pub hash_per_kill: u64,
    /// Hash credited per honored boss victory.
    pub boss_hash_bonus: u64,
    /// Fraction of invested hash returned when selling, in [0,1].
    pub sell_refund_ratio: f64,
    /// Efficiency below this percentage is flagged to the UI.
    pub efficiency_warning_threshold: f64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            base_hash_per_second: 1.0,
            leak_penalty: 5.0,
            leak_decay_interval: 5.0,
            hash_storage_capacity: 25_000,
            hash_per_kill: 1,
            boss_hash_bonus: 250,
            sell_refund_ratio: 0.5,
            efficiency_warning_threshold: 50.0,
        }
    }
}

/// Threat growth, spawn cadence and enemy roster gating.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatConfig {
    pub growth_rate_per_second: f64,
    pub base_spawn_interval: f64,
    pub floor_spawn_interval: f64,
    pub spawn_scaling_factor: f64,
    pub max_enemies_on_screen: u32,
    pub fast_unlock_threat: f64,
    pub tank_unlock_threat: f64,
    pub elite_unlock_threat: f64,
    /// Per threat point above 1.0, added to the enemy health multiplier.
    pub health_scaling: f64,
    pub speed_scaling: f64,
    pub damage_scaling: f64,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            growth_rate_per_second: 0.01,
            base_spawn_interval: 2.0,
            floor_spawn_interval: 0.4,
            spawn_scaling_factor: 0.1,
            max_enemies_on_screen: 40,
            fast_unlock_threat: 2.0,
            tank_unlock_threat: 4.0,
            elite_unlock_threat: 8.0,
            health_scaling: 0.15,
            speed_scaling: 0.02,
            damage_scaling: 0.05,
        }
    }
}

/// Default power draw per rarity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RarityDraw {
    pub common: u32,
    pub rare: u32,
    pub epic: u32,
    pub legendary: u32,
}

impl Default for RarityDraw {
    fn default() -> Self {
        Self {
            common: 15,
            rare: 25,
            epic: 40,
            legendary: 60,
        }
    }
}

impl RarityDraw {
    pub fn for_rarity(&self, rarity: Rarity) -> u32 {
        match rarity {
            Rarity::Common => self.common,
            Rarity::Rare => self.rare,
            Rarity::Epic => self.epic,
            Rarity::Legendary => self.legendary,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    /// Capacity before persistent upgrades.
    pub base_capacity: u32,
    pub rarity_draw: RarityDraw,
    /// Fraction of draw shaved off per star tier, compounding.
    pub star_power_discount: f32,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            base_capacity: 300,
            rarity_draw: RarityDraw::default(),
            star_power_discount: 0.15,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BossConfig {
    /// Threat distance between boss milestones.
    pub milestone_interval: f64,
    /// Highest milestone that still triggers a boss.
    pub max_milestone: f64,
    pub cooldown_seconds: f64,
    pub base_health: f32,
    /// Added to the health multiplier per milestone index.
    pub health_per_milestone: f32,
}

impl Default for BossConfig {
    fn default() -> Self {
        Self {
            milestone_interval: 5.0,
            max_milestone: 50.0,
            cooldown_seconds: 60.0,
            base_health: 5_000.0,
            health_per_milestone: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverclockConfig {
    pub duration_seconds: f64,
    pub income_multiplier: f64,
    pub threat_growth_multiplier: f64,
    pub power_demand_multiplier: f64,
}

impl Default for OverclockConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 60.0,
            income_multiplier: 2.0,
            threat_growth_multiplier: 2.0,
            power_demand_multiplier: 1.5,
        }
    }
}

/// Level and merge curves shared by every archetype.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    pub max_level: u8,
    pub max_star: u8,
    pub cost_growth_factor: f64,
    pub damage_per_level: f32,
    pub range_per_level: f32,
    pub attack_speed_per_level: f32,
    /// Multiplicative stat bonus per star tier.
    pub star_stat_bonus: f32,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            max_level: 10,
            max_star: 3,
            cost_growth_factor: 1.5,
            damage_per_level: 0.15,
            range_per_level: 0.05,
            attack_speed_per_level: 0.08,
            star_stat_bonus: 0.5,
        }
    }
}

/// The Zero-Day: a rare enemy that drains efficiency while it is alive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZeroDayConfig {
    pub base_health: f32,
    pub speed: f32,
    /// Efficiency points drained per second while alive.
    pub efficiency_drain_rate: f64,
    /// Regular spawns that must pass before (another) Zero-Day appears.
    pub min_waves_before_spawn: u32,
    pub defeat_hash_bonus: u64,
    /// Efficiency points given back on defeat.
    pub defeat_efficiency_restore: f64,
}

impl Default for ZeroDayConfig {
    fn default() -> Self {
        Self {
            base_health: 3_000.0,
            speed: 25.0,
            efficiency_drain_rate: 2.0,
            min_waves_before_spawn: 25,
            defeat_hash_bonus: 500,
            defeat_efficiency_restore: 25.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    pub max_offline_hours: f64,
    /// Fraction of the live income rate earned while away.
    pub offline_earnings_rate: f64,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            max_offline_hours: 8.0,
            offline_earnings_rate: 0.2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Max distance between a stale tower position and a replacement slot.
    pub rebind_radius: f32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            rebind_radius: 48.0,
        }
    }
}

/// A placeable tower archetype.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Archetype {
    pub id: ArchetypeId,
    pub rarity: Rarity,
    pub base_stats: BaseStats,
    /// Overrides the rarity default draw.
    #[serde(default)]
    pub power_draw: Option<u32>,
    pub placement_cost: u64,
    pub base_upgrade_cost: u64,
    /// Component tier required before the archetype can be placed.
    #[serde(default)]
    pub unlock_tier: u32,
}

/// Top-level balance configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Seed for the deterministic spawn/boss RNG.
    pub rng_seed: u64,
    pub economy: EconomyConfig,
    pub threat: ThreatConfig,
    pub power: PowerConfig,
    pub boss: BossConfig,
    pub overclock: OverclockConfig,
    pub upgrades: UpgradeConfig,
    pub zero_day: ZeroDayConfig,
    pub offline: OfflineConfig,
    pub persistence: PersistenceConfig,
    pub archetypes: Vec<Archetype>,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            rng_seed: 42,
            economy: EconomyConfig::default(),
            threat: ThreatConfig::default(),
            power: PowerConfig::default(),
            boss: BossConfig::default(),
            overclock: OverclockConfig::default(),
            upgrades: UpgradeConfig::default(),
            zero_day: ZeroDayConfig::default(),
            offline: OfflineConfig::default(),
            persistence: PersistenceConfig::default(),
            archetypes: default_archetypes(),
        }
    }
}

impl BalanceConfig {
    pub fn archetype(&self, id: &ArchetypeId) -> Option<&Archetype> {
        self.archetypes.iter().find(|a| &a.id == id)
    }

    /// Raw draw of an archetype: explicit override or rarity default.
    pub fn archetype_draw(&self, archetype: &Archetype) -> u32 {
        archetype
            .power_draw
            .unwrap_or_else(|| self.power.rarity_draw.for_rarity(archetype.rarity))
    }
}

fn default_archetypes() -> Vec<Archetype> {
    let make = |id: &str, rarity, damage, range, attack_speed, cost, upgrade, tier| Archetype {
        id: ArchetypeId::new(id),
        rarity,
        base_stats: BaseStats {
            damage,
            range,
            attack_speed,
        },
        power_draw: None,
        placement_cost: cost,
        base_upgrade_cost: upgrade,
        unlock_tier: tier,
    };
    vec![
        make("firewall", Rarity::Common, 10.0, 90.0, 1.0, 50, 25, 0),
        make("scanner", Rarity::Rare, 6.0, 140.0, 2.0, 120, 60, 0),
        make("honeypot", Rarity::Epic, 30.0, 70.0, 0.6, 300, 150, 1),
        make("quarantine", Rarity::Legendary, 75.0, 110.0, 0.5, 800, 400, 2),
    ]
}

/// Validation errors for balance configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Numeric field must be finite.
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
    /// Field must be strictly positive.
    #[error("{0} must be > 0")]
    NonPositive(&'static str),
    /// Ratio must lie within [0, 1].
    #[error("{0} must be within [0,1]")]
    RatioOutOfRange(&'static str),
    /// Spawn floor above the base interval inverts the spawn curve.
    #[error("floor spawn interval exceeds base interval")]
    SpawnFloorAboveBase,
    /// Level or star bounds unusable.
    #[error("invalid level/star bounds")]
    InvalidTierBounds,
    /// Two archetypes share an id.
    #[error("duplicate archetype: {0}")]
    DuplicateArchetype(String),
}

fn positive(value: f64, name: &'static str) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite(name));
    }
    if value <= 0.0 {
        return Err(ValidationError::NonPositive(name));
    }
    Ok(())
}

fn ratio(value: f64, name: &'static str) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite(name));
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::RatioOutOfRange(name));
    }
    Ok(())
}

/// Validate the economy section.
pub fn validate_economy(e: &EconomyConfig) -> Result<(), ValidationError> {
    positive(e.base_hash_per_second, "economy.base_hash_per_second")?;
    positive(e.leak_penalty, "economy.leak_penalty")?;
    positive(e.leak_decay_interval, "economy.leak_decay_interval")?;
    ratio(e.sell_refund_ratio, "economy.sell_refund_ratio")?;
    if !e.efficiency_warning_threshold.is_finite() {
        return Err(ValidationError::NonFinite("economy.efficiency_warning_threshold"));
    }
    Ok(())
}

/// Validate threat growth and spawn cadence.
pub fn validate_threat(t: &ThreatConfig) -> Result<(), ValidationError> {
    positive(t.growth_rate_per_second, "threat.growth_rate_per_second")?;
    positive(t.base_spawn_interval, "threat.base_spawn_interval")?;
    positive(t.floor_spawn_interval, "threat.floor_spawn_interval")?;
    if !t.spawn_scaling_factor.is_finite() || t.spawn_scaling_factor < 0.0 {
        return Err(ValidationError::NonFinite("threat.spawn_scaling_factor"));
    }
    if t.floor_spawn_interval > t.base_spawn_interval {
        return Err(ValidationError::SpawnFloorAboveBase);
    }
    for (v, name) in [
        (t.health_scaling, "threat.health_scaling"),
        (t.speed_scaling, "threat.speed_scaling"),
        (t.damage_scaling, "threat.damage_scaling"),
        (t.fast_unlock_threat, "threat.fast_unlock_threat"),
        (t.tank_unlock_threat, "threat.tank_unlock_threat"),
        (t.elite_unlock_threat, "threat.elite_unlock_threat"),
    ] {
        if !v.is_finite() {
            return Err(ValidationError::NonFinite(name));
        }
    }
    Ok(())
}

/// Validate the whole configuration, including archetype id uniqueness.
pub fn validate_config(cfg: &BalanceConfig) -> Result<(), ValidationError> {
    validate_economy(&cfg.economy)?;
    validate_threat(&cfg.threat)?;
    positive(cfg.boss.milestone_interval, "boss.milestone_interval")?;
    positive(cfg.boss.max_milestone, "boss.max_milestone")?;
    if !cfg.boss.cooldown_seconds.is_finite() || cfg.boss.cooldown_seconds < 0.0 {
        return Err(ValidationError::NonFinite("boss.cooldown_seconds"));
    }
    positive(cfg.overclock.duration_seconds, "overclock.duration_seconds")?;
    positive(cfg.overclock.income_multiplier, "overclock.income_multiplier")?;
    positive(
        cfg.overclock.threat_growth_multiplier,
        "overclock.threat_growth_multiplier",
    )?;
    positive(
        cfg.overclock.power_demand_multiplier,
        "overclock.power_demand_multiplier",
    )?;
    ratio(
        cfg.power.star_power_discount as f64,
        "power.star_power_discount",
    )?;
    positive(cfg.upgrades.cost_growth_factor, "upgrades.cost_growth_factor")?;
    if cfg.upgrades.max_level == 0 {
        return Err(ValidationError::InvalidTierBounds);
    }
    positive(cfg.zero_day.base_health as f64, "zero_day.base_health")?;
    positive(cfg.zero_day.speed as f64, "zero_day.speed")?;
    for (v, name) in [
        (cfg.zero_day.efficiency_drain_rate, "zero_day.efficiency_drain_rate"),
        (cfg.zero_day.defeat_efficiency_restore, "zero_day.defeat_efficiency_restore"),
    ] {
        if !v.is_finite() || v < 0.0 {
            return Err(ValidationError::NonFinite(name));
        }
    }
    ratio(
        cfg.offline.offline_earnings_rate,
        "offline.offline_earnings_rate",
    )?;
    if !cfg.offline.max_offline_hours.is_finite() || cfg.offline.max_offline_hours < 0.0 {
        return Err(ValidationError::NonFinite("offline.max_offline_hours"));
    }
    positive(
        cfg.persistence.rebind_radius as f64,
        "persistence.rebind_radius",
    )?;

    let mut ids: BTreeSet<&ArchetypeId> = BTreeSet::new();
    for a in &cfg.archetypes {
        if !ids.insert(&a.id) {
            return Err(ValidationError::DuplicateArchetype(a.id.0.clone()));
        }
        let s = a.base_stats;
        if !(s.damage.is_finite() && s.range.is_finite() && s.attack_speed.is_finite()) {
            return Err(ValidationError::NonFinite("archetype.base_stats"));
        }
    }
    Ok(())
}
