//! Solar deployment simulator entry point: CLI wiring and config-driven engine construction.

use anyhow::{Context, bail};
use clap::Parser;

use solar_deploy_sim::cli::CliOptions;
use solar_deploy_sim::config::ScenarioConfig;
use solar_deploy_sim::io::export::{CsvReport, JsonReport, ReportFanout};
use solar_deploy_sim::scenario::engine_builder;
use solar_deploy_sim::sim::kpi::RunSummary;
use solar_deploy_sim::telemetry;

fn main() -> anyhow::Result<()> {
    let cli = CliOptions::parse();

    if let Err(e) = telemetry::init_logging(cli.verbose, cli.quiet) {
        eprintln!("warning: logging not initialized: {e}");
    }

    // --scenario takes priority, then --preset, then baseline
    let mut scenario = match &cli.scenario {
        Some(path) => ScenarioConfig::from_toml_file(path)
            .with_context(|| format!("failed to load scenario {}", path.display()))?,
        None => ScenarioConfig::from_preset(cli.preset_or_default())?,
    };

    if let Some(year) = cli.start_year {
        scenario.simulation.start_year = year;
    }
    if let Some(year) = cli.end_year {
        scenario.simulation.end_year = year;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        bail!("scenario has {} configuration error(s)", errors.len());
    }

    let mut reports = ReportFanout::new();
    if let Some(path) = &cli.csv_out {
        reports.push(Box::new(CsvReport::new(path)));
    }
    if let Some(path) = &cli.json_out {
        reports.push(Box::new(JsonReport::new(path)));
    }

    let mut builder = engine_builder(&scenario);
    if !reports.is_empty() {
        builder = builder.report_sink(Box::new(reports));
    }
    let mut engine = builder.build().context("failed to build simulation engine")?;
    let records = engine.run().context("simulation failed")?;

    for r in &records {
        println!("{r}");
    }
    println!("\n{}", RunSummary::from_records(&records));

    if let Some(path) = &cli.csv_out {
        eprintln!("CSV written to {}", path.display());
    }
    if let Some(path) = &cli.json_out {
        eprintln!("JSON written to {}", path.display());
    }
    Ok(())
}
