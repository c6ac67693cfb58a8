//! Tower level and merge curves. Pure functions, no state.

use sim_core::{BaseStats, MergeIneligibility, Tower, UpgradeConfig};

/// Cost to upgrade from `level` to `level + 1`: `base * growth^(level - 1)`.
///
/// Returns `None` at or above the configured max level.
///
/// Example:
/// let cfg = UpgradeConfig::default();
/// assert_eq!(upgrade_cost(100, 1, &cfg), Some(100));
/// assert_eq!(upgrade_cost(100, cfg.max_level, &cfg), None);
pub fn upgrade_cost(base_cost: u64, level: u8, cfg: &UpgradeConfig) -> Option<u64> {
    if level == 0 || level >= cfg.max_level {
        return None;
    }
    let cost = base_cost as f64 * cfg.cost_growth_factor.powi(level as i32 - 1);
    if !cost.is_finite() || cost < 0.0 {
        return None;
    }
    if cost >= u64::MAX as f64 {
        return Some(u64::MAX);
    }
    Some(cost.round() as u64)
}

/// Per-stat multipliers of a level/star combination.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatMultipliers {
    pub damage: f32,
    pub range: f32,
    pub attack_speed: f32,
}

/// Linear per-stat level curve; level 1 is the identity.
pub fn level_multipliers(level: u8, cfg: &UpgradeConfig) -> StatMultipliers {
    let steps = level.saturating_sub(1) as f32;
    StatMultipliers {
        damage: 1.0 + cfg.damage_per_level * steps,
        range: 1.0 + cfg.range_per_level * steps,
        attack_speed: 1.0 + cfg.attack_speed_per_level * steps,
    }
}

/// Multiplicative bonus of a star tier, stacked on the level curve.
pub fn star_multiplier(star_level: u8, cfg: &UpgradeConfig) -> f32 {
    (1.0 + cfg.star_stat_bonus).powi(star_level as i32)
}

/// Scaled combat stats of a tower.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectiveStats {
    pub damage: f32,
    pub range: f32,
    pub attack_speed: f32,
}

impl EffectiveStats {
    pub fn dps(&self) -> f32 {
        self.damage * self.attack_speed
    }
}

pub fn effective_stats(
    base: BaseStats,
    level: u8,
    star_level: u8,
    cfg: &UpgradeConfig,
) -> EffectiveStats {
    let lv = level_multipliers(level, cfg);
    let star = star_multiplier(star_level, cfg);
    EffectiveStats {
        damage: base.damage * lv.damage * star,
        range: base.range * lv.range * star,
        attack_speed: base.attack_speed * lv.attack_speed * star,
    }
}

pub fn tower_stats(tower: &Tower, cfg: &UpgradeConfig) -> EffectiveStats {
    effective_stats(tower.base_stats, tower.level, tower.star_level, cfg)
}

/// Draw after the merge discount: `ceil(draw * (1 - discount)^star)`.
///
/// Read-only; the tower's raw draw never changes, so merge and upgrade order
/// commute.
pub fn effective_power_draw(power_draw: u32, star_level: u8, discount: f32) -> u32 {
    let factor = (1.0 - discount.clamp(0.0, 1.0) as f64).powi(star_level as i32);
    // Epsilon keeps exact products like 20 * 0.85 from rounding up.
    (power_draw as f64 * factor - 1e-6).ceil().max(0.0) as u32
}

/// Check that `a` and `b` can merge under `max_star`.
pub fn merge_eligibility(a: &Tower, b: &Tower, max_star: u8) -> Result<(), MergeIneligibility> {
    if a.id == b.id {
        return Err(MergeIneligibility::SameTower);
    }
    if a.archetype != b.archetype {
        return Err(MergeIneligibility::DifferentArchetype);
    }
    if a.star_level != b.star_level {
        return Err(MergeIneligibility::DifferentTier);
    }
    if a.star_level >= max_star {
        return Err(MergeIneligibility::MaxTier);
    }
    Ok(())
}
