//! Typed outcomes of player-facing simulation operations.
//!
//! These are expected, frequent results ("can't afford"), so every operation
//! returns them by value instead of panicking.

use crate::{ArchetypeId, SlotId, TowerId};
use thiserror::Error;

/// Why a tower could not be placed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error("{0} does not exist in the current layout")]
    InvalidSlot(SlotId),
    #[error("{0} is already occupied")]
    SlotOccupied(SlotId),
    #[error("unknown archetype: {0}")]
    UnknownArchetype(ArchetypeId),
    #[error("archetype {archetype} requires component tier {required}")]
    ArchetypeLocked {
        archetype: ArchetypeId,
        required: u32,
    },
    #[error("insufficient power: {required} required, {available} available")]
    InsufficientPower { required: u32, available: u32 },
    #[error("insufficient hash: {needed} needed, {available} available")]
    InsufficientCurrency { needed: u64, available: u64 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpgradeError {
    #[error("unknown tower: {0}")]
    UnknownTower(TowerId),
    #[error("{0} is already at max level")]
    MaxLevel(TowerId),
    #[error("insufficient hash: {needed} needed, {available} available")]
    InsufficientCurrency { needed: u64, available: u64 },
}

/// Reason two towers cannot be merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeIneligibility {
    SameTower,
    DifferentArchetype,
    DifferentTier,
    MaxTier,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("unknown tower: {0}")]
    UnknownTower(TowerId),
    #[error("towers cannot be merged: {0:?}")]
    Ineligible(MergeIneligibility),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SellError {
    #[error("unknown tower: {0}")]
    UnknownTower(TowerId),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BossError {
    #[error("no boss is active")]
    NoBossActive,
}
