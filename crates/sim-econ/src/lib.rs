#![deny(warnings)]

//! Economic models: hash income, efficiency and tower cost curves.
//!
//! This crate provides:
//! - [`EconomyClock`], converting elapsed time and leaks into hash income
//!   under a hard storage ceiling
//! - tower upgrade/merge curves in [`curves`]
//! - an offline earnings estimate in [`offline`]

use sim_core::{sanitize_dt, EconomyConfig};
use thiserror::Error;
use tracing::debug;

pub mod curves;
pub mod offline;

/// Errors produced by economic helpers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EconError {
    /// Balance below the requested spend.
    #[error("insufficient hash: {needed} needed, {available} available")]
    InsufficientHash { needed: u64, available: u64 },
}

/// Per-source multipliers on the base income rate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Multipliers {
    /// Persistent upgrades (e.g. CPU level scaling).
    pub upgrades: f64,
    /// Overclock income factor, 1.0 when inactive.
    pub overclock: f64,
}

impl Default for Multipliers {
    fn default() -> Self {
        Self {
            upgrades: 1.0,
            overclock: 1.0,
        }
    }
}

impl Multipliers {
    pub fn product(&self) -> f64 {
        self.upgrades * self.overclock
    }
}

/// Efficiency in percent for a leak count: `clamp(100 - leaks * penalty, 0, 100)`.
pub fn efficiency_for(leak_counter: u32, leak_penalty: f64) -> f64 {
    let e = 100.0 - leak_counter as f64 * leak_penalty;
    if e.is_nan() {
        return 0.0;
    }
    e.clamp(0.0, 100.0)
}

/// Hash balance, fractional carry and leak bookkeeping.
///
/// Efficiency is never stored; it is recomputed from the leak counter.
#[derive(Clone, Debug, PartialEq)]
pub struct EconomyClock {
    hash: u64,
    accumulator: f64,
    leak_counter: u32,
    leak_decay_timer: f64,
    storage_capacity: u64,
    leak_penalty: f64,
    leak_decay_interval: f64,
}

impl EconomyClock {
    pub fn new(cfg: &EconomyConfig) -> Self {
        Self {
            hash: 0,
            accumulator: 0.0,
            leak_counter: 0,
            leak_decay_timer: 0.0,
            storage_capacity: cfg.hash_storage_capacity,
            leak_penalty: cfg.leak_penalty,
            leak_decay_interval: cfg.leak_decay_interval,
        }
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Sub-unit income not yet moved into the balance, in [0, 1).
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn leak_counter(&self) -> u32 {
        self.leak_counter
    }

    pub fn storage_capacity(&self) -> u64 {
        self.storage_capacity
    }

    pub fn efficiency(&self) -> f64 {
        efficiency_for(self.leak_counter, self.leak_penalty)
    }

    /// Instantaneous income in hash per second.
    pub fn rate_per_second(&self, base_rate: f64, multipliers: Multipliers) -> f64 {
        let rate = base_rate * multipliers.product() * (self.efficiency() / 100.0);
        if rate.is_finite() && rate > 0.0 {
            rate
        } else {
            0.0
        }
    }

    /// Advance income and leak decay by `dt` seconds. Returns hash credited.
    ///
    /// Income is computed at the efficiency in effect at the start of the
    /// tick; leak decay is applied afterwards.
    pub fn tick(&mut self, dt: f64, base_rate: f64, multipliers: Multipliers) -> u64 {
        let dt = sanitize_dt(dt);
        let rate = self.rate_per_second(base_rate, multipliers);
        self.decay_leaks(dt);

        let pending = self.accumulator + rate * dt;
        if !pending.is_finite() {
            // Overflowed income fills storage and the carry restarts at zero.
            self.accumulator = 0.0;
            return self.credit(u64::MAX);
        }
        self.accumulator = pending;
        let whole = self.accumulator.floor();
        if whole < 1.0 {
            return 0;
        }
        self.accumulator -= whole;
        let whole = if whole >= u64::MAX as f64 {
            u64::MAX
        } else {
            whole as u64
        };
        self.credit(whole)
    }

    fn decay_leaks(&mut self, dt: f64) {
        if self.leak_counter == 0 {
            self.leak_decay_timer = 0.0;
            return;
        }
        self.leak_decay_timer += dt;
        if self.leak_decay_interval <= 0.0 {
            self.leak_counter = 0;
            self.leak_decay_timer = 0.0;
            return;
        }
        let steps = (self.leak_decay_timer / self.leak_decay_interval).floor();
        if steps < 1.0 {
            return;
        }
        self.leak_decay_timer -= steps * self.leak_decay_interval;
        let steps = if steps >= u32::MAX as f64 {
            u32::MAX
        } else {
            steps as u32
        };
        self.leak_counter = self.leak_counter.saturating_sub(steps);
        if self.leak_counter == 0 {
            self.leak_decay_timer = 0.0;
        }
    }

    pub fn record_leak(&mut self) {
        self.record_leaks(1);
    }

    pub fn record_leaks(&mut self, count: u32) {
        self.leak_counter = self.leak_counter.saturating_add(count);
    }

    /// Clear up to `count` outstanding leaks. Returns how many were cleared.
    pub fn forgive_leaks(&mut self, count: u32) -> u32 {
        let cleared = count.min(self.leak_counter);
        self.leak_counter -= cleared;
        if self.leak_counter == 0 {
            self.leak_decay_timer = 0.0;
        }
        cleared
    }

    pub fn leak_penalty(&self) -> f64 {
        self.leak_penalty
    }

    /// Add hash up to the storage ceiling; the excess is discarded.
    pub fn credit(&mut self, amount: u64) -> u64 {
        let room = self.storage_capacity.saturating_sub(self.hash);
        let credited = amount.min(room);
        if credited < amount {
            debug!(discarded = amount - credited, "hash storage full");
        }
        self.hash += credited;
        credited
    }

    pub fn spend(&mut self, amount: u64) -> Result<(), EconError> {
        if amount > self.hash {
            return Err(EconError::InsufficientHash {
                needed: amount,
                available: self.hash,
            });
        }
        self.hash -= amount;
        Ok(())
    }

    /// Change the storage ceiling, clamping the balance down if needed.
    pub fn set_storage_capacity(&mut self, capacity: u64) {
        self.storage_capacity = capacity;
        self.hash = self.hash.min(capacity);
    }

    /// Load a persisted balance and leak count, clamped to the current ceiling.
    pub fn restore(&mut self, hash: u64, leak_counter: u32) {
        self.hash = hash.min(self.storage_capacity);
        self.leak_counter = leak_counter;
        self.accumulator = 0.0;
        self.leak_decay_timer = 0.0;
    }
}
