//! Offline earnings estimate applied by hosts when a session resumes.

use sim_core::OfflineConfig;

/// Hash earned while away: `rate * min(elapsed, cap) * offline_rate`, floored.
///
/// Negative or non-finite inputs earn nothing.
///
/// Example:
/// let cfg = OfflineConfig::default();
/// assert_eq!(offline_earnings(10.0, 100.0, &cfg), 200);
pub fn offline_earnings(rate_per_second: f64, elapsed_seconds: f64, cfg: &OfflineConfig) -> u64 {
    if !(rate_per_second.is_finite() && elapsed_seconds.is_finite()) {
        return 0;
    }
    if rate_per_second <= 0.0 || elapsed_seconds <= 0.0 {
        return 0;
    }
    let cap = (cfg.max_offline_hours * 3600.0).max(0.0);
    let earned = rate_per_second * elapsed_seconds.min(cap) * cfg.offline_earnings_rate;
    if !earned.is_finite() || earned <= 0.0 {
        return 0;
    }
    earned.floor().min(u64::MAX as f64) as u64
}
