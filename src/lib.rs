//! Annual techno-economic simulation of solar and storage deployment.
//!
//! Each simulated year evolves technology costs, appraises a reference
//! project for every region and technology, dispatches regional markets
//! against installed capacity, and adds the new builds to the grid.

/// Carbon pricing schemes and border adjustments.
pub mod carbon;
pub mod cli;
/// TOML scenario configuration and presets.
pub mod config;
pub mod cost;
pub mod error;
pub mod grid;
pub mod investment;
pub mod io;
/// Narrow lookup traits between models.
pub mod lookup;
pub mod market;
pub mod policy;
pub mod scenario;
/// Simulation engine, year records, and run summary.
pub mod sim;
pub mod supply_chain;
pub mod tech;
pub mod telemetry;
