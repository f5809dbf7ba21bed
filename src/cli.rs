//! Command-line options.

use std::path::PathBuf;

use clap::Parser;

/// Annual solar and storage deployment simulation.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(author, version, about, long_about = None)]
pub struct CliOptions {
    /// Scenario TOML file.
    #[arg(long, conflicts_with = "preset")]
    pub scenario: Option<PathBuf>,

    /// Built-in preset: baseline, high_carbon_price or tight_grid.
    #[arg(long)]
    pub preset: Option<String>,

    /// Overrides the scenario's first simulated year.
    #[arg(long)]
    pub start_year: Option<i32>,

    /// Overrides the scenario's last simulated year.
    #[arg(long)]
    pub end_year: Option<i32>,

    /// Writes the long-format CSV export here.
    #[arg(long)]
    pub csv_out: Option<PathBuf>,

    /// Writes the JSON export here.
    #[arg(long)]
    pub json_out: Option<PathBuf>,

    /// More log output on stderr (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long)]
    pub quiet: bool,
}

impl CliOptions {
    /// Preset to load when no scenario file is given.
    pub fn preset_or_default(&self) -> &str {
        self.preset.as_deref().unwrap_or("baseline")
    }
}
