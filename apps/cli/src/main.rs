#![deny(warnings)]

//! Headless CLI: run a session for a while, optionally from and to a save.

use anyhow::{Context, Result};
use chrono::Utc;
use sim_core::*;
use sim_econ::offline::offline_earnings;
use sim_runtime::{run_seconds, BossPhase, RunSummary, SimulationState};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Enemy hit points at threat 1.0 for the stand-in combat resolver.
const ENEMY_BASE_HEALTH: f32 = 40.0;
const SLOT_COUNT: u32 = 12;
const RING_RADIUS: f32 = 160.0;

#[derive(Debug, Default)]
struct Args {
    seconds: Option<f64>,
    step: Option<f64>,
    config: Option<PathBuf>,
    save: Option<PathBuf>,
    load: Option<PathBuf>,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--seconds" => args.seconds = it.next().and_then(|s| s.parse().ok()),
            "--step" => args.step = it.next().and_then(|s| s.parse().ok()),
            "--config" => args.config = it.next().map(PathBuf::from),
            "--save" => args.save = it.next().map(PathBuf::from),
            "--load" => args.load = it.next().map(PathBuf::from),
            other => warn!(arg = other, "ignoring unknown argument"),
        }
    }
    args
}

fn load_config(path: Option<&Path>) -> Result<BalanceConfig> {
    let cfg = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .with_context(|| format!("reading config {}", p.display()))?;
            if p.extension().is_some_and(|e| e == "json") {
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", p.display()))?
            } else {
                serde_yaml::from_str(&text)
                    .with_context(|| format!("parsing {}", p.display()))?
            }
        }
        None => BalanceConfig::default(),
    };
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Slots evenly spaced on a ring around the defended node.
fn ring_layout(count: u32, radius: f32) -> Vec<Slot> {
    (0..count)
        .map(|i| {
            let angle = i as f32 / count as f32 * std::f32::consts::TAU;
            Slot::new(
                SlotId(i + 1),
                Position::new(radius * angle.cos(), radius * angle.sin()),
            )
        })
        .collect()
}

fn lanes() -> Vec<Lane> {
    [("core", 0.0, 400.0), ("north", 400.0, 0.0), ("east", -400.0, 0.0)]
        .into_iter()
        .map(|(name, x, y)| Lane {
            sector: SectorId::new(name),
            spawn_point: Position::new(x, y),
        })
        .collect()
}

fn fresh_state(cfg: BalanceConfig) -> SimulationState {
    SimulationState::new(
        cfg,
        ring_layout(SLOT_COUNT, RING_RADIUS),
        lanes(),
        BTreeSet::from([SectorId::new("core")]),
    )
}

fn is_binary(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "bin")
}

fn load_session(path: &Path, cfg: BalanceConfig) -> Result<SimulationState> {
    let blob = if is_binary(path) {
        persistence::decode_bincode(&std::fs::read(path)?)?
    } else {
        persistence::decode_json(&std::fs::read_to_string(path)?)?
    };
    let away = blob.seconds_since_save(Utc::now());
    let (mut state, report) = persistence::restore(blob, fresh_state(cfg));
    let earned = offline_earnings(state.hash_per_second(), away, &state.config().offline);
    let credited = state.credit_hash(earned);
    info!(
        towers = state.towers().len(),
        orphans = report.orphans.len(),
        away_seconds = away,
        offline_hash = credited,
        "session loaded"
    );
    Ok(state)
}

fn save_session(path: &Path, state: &SimulationState) -> Result<()> {
    let blob = persistence::snapshot(state);
    if is_binary(path) {
        std::fs::write(path, persistence::encode_bincode(&blob)?)?;
    } else {
        std::fs::write(path, persistence::encode_json(&blob)?)?;
    }
    info!(path = %path.display(), "session saved");
    Ok(())
}

fn active_dps(state: &SimulationState) -> f32 {
    state
        .towers()
        .iter()
        .filter(|t| t.is_active())
        .filter_map(|t| state.tower_stats(t.id))
        .map(|s| s.dps())
        .sum()
}

/// Stand-in for the combat layer: an enemy dies if one second of tower fire
/// covers its scaled health, otherwise it leaks.
fn resolve_combat(state: &mut SimulationState, summary: &RunSummary) {
    let dps = active_dps(state);
    for spawn in &summary.spawns {
        if dps >= ENEMY_BASE_HEALTH * spawn.health_multiplier {
            state.report_enemy_killed(false);
        } else {
            state.report_enemy_leaked();
        }
    }
    if let BossPhase::Active(boss) = state.boss_phase().clone() {
        if state.engage_boss().is_err() {
            return;
        }
        let outcome = if dps * 60.0 >= boss.health {
            state.report_enemy_killed(true);
            "defeated"
        } else {
            let _ = state.report_boss_escaped();
            "escaped"
        };
        info!(sector = %boss.sector, milestone = boss.milestone, outcome, "boss resolved");
    }
    if let Some(zd) = state.zero_day().cloned() {
        if dps * 60.0 >= zd.health {
            state.report_zero_day_defeated();
        } else {
            state.report_zero_day_escaped();
        }
    }
}

/// Spend on the cheapest affordable improvement: a new firewall, else an
/// upgrade of the weakest tower.
fn autobuild(state: &mut SimulationState) {
    let firewall = ArchetypeId::new("firewall");
    let free = state.slots().iter().find(|s| !s.is_occupied()).map(|s| s.id);
    if let Some(slot) = free {
        if state.place_tower(&firewall, slot).is_ok() {
            return;
        }
    }
    let weakest = state
        .towers()
        .iter()
        .min_by_key(|t| (t.level, t.id))
        .map(|t| t.id);
    if let Some(id) = weakest {
        let _ = state.upgrade_tower(id);
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args();
    info!(
        git_sha = env!("GIT_SHA"),
        build_date = env!("BUILD_DATE"),
        ?args,
        "starting CLI"
    );

    let cfg = load_config(args.config.as_deref())?;
    let mut state = match args.load.as_deref() {
        Some(path) => load_session(path, cfg)?,
        None => fresh_state(cfg),
    };

    let seconds = args.seconds.unwrap_or(300.0).max(0.0);
    let step = args.step.unwrap_or(0.1);
    let mut elapsed = 0.0;
    while elapsed < seconds {
        let chunk = (seconds - elapsed).min(1.0);
        let summary = run_seconds(&mut state, chunk, step);
        resolve_combat(&mut state, &summary);
        autobuild(&mut state);
        elapsed += chunk;
    }

    if let Some(path) = args.save.as_deref() {
        save_session(path, &state)?;
    }
    println!("{}", serde_json::to_string_pretty(&state.status())?);
    Ok(())
}
