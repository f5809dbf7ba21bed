//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use solar_deploy_sim::config::ScenarioConfig;
use solar_deploy_sim::scenario::build_engine;
use solar_deploy_sim::sim::engine::SimulationEngine;
use solar_deploy_sim::sim::types::SimulationYearRecord;

/// Path to a bundled scenario file, e.g. `scenario_path("baseline")`.
pub fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(format!("{name}.toml"))
}

/// Baseline scenario shortened to `start..=end`.
pub fn baseline_years(start: i32, end: i32) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::baseline();
    cfg.simulation.start_year = start;
    cfg.simulation.end_year = end;
    cfg
}

/// Baseline scenario where every market pays nothing for energy.
pub fn unprofitable() -> ScenarioConfig {
    let mut cfg = ScenarioConfig::baseline();
    for design in cfg.market.values_mut() {
        design.base_energy_price_usd_per_mwh = 0.0;
    }
    cfg
}

/// Builds and runs an engine, returning it with its records.
pub fn run(cfg: &ScenarioConfig) -> (SimulationEngine, Vec<SimulationYearRecord>) {
    let mut engine = build_engine(cfg).expect("engine should build");
    let records = engine.run().expect("run should succeed");
    (engine, records)
}
