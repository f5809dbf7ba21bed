//! CSV and JSON export for simulation year records.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexSet;

use crate::error::ExportError;
use crate::lookup::ReportSink;
use crate::sim::types::SimulationYearRecord;

/// Column header for the long-format CSV export.
pub const HEADER: &str = "year,region,technology,new_capacity_mw,dispatched_mwh,\
                          annual_demand_mwh,total_dispatched_mwh,unmet_demand_mwh,\
                          carbon_price_usd_per_ton,capex_usd_per_kw";

/// Exports year records to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `ExportError` if file creation or writing fails.
pub fn export_csv(records: &[SimulationYearRecord], path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_csv(records, io::BufWriter::new(file))
}

/// Writes year records as long-format CSV to any writer.
///
/// One row per (year, region, technology), where a technology appears if
/// it was built or dispatched. A region with neither gets a single row
/// with an empty technology cell. Region-level columns repeat on each row.
///
/// # Errors
///
/// Returns an `ExportError` if writing fails.
pub fn write_csv(records: &[SimulationYearRecord], writer: impl Write) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in records {
        let regions: IndexSet<&String> = r
            .investments
            .keys()
            .chain(r.market_outcomes.keys())
            .collect();

        for region in regions {
            let built = r.investments.get(region);
            let dispatch = r.market_outcomes.get(region);
            let signals = r.policy_signals.get(region);

            let techs: IndexSet<&String> = built
                .into_iter()
                .flat_map(|b| b.keys())
                .chain(dispatch.into_iter().flat_map(|d| d.generation_mwh.keys()))
                .collect();

            let demand = dispatch.map_or(0.0, |d| d.annual_demand_mwh);
            let total = dispatch.map_or(0.0, |d| d.total_dispatched_mwh);
            let unmet = dispatch.map_or(0.0, |d| d.unmet_demand_mwh);
            let carbon = signals.map_or(0.0, |s| s.carbon_price_usd_per_ton);

            let region_cols = [
                format!("{demand:.4}"),
                format!("{total:.4}"),
                format!("{unmet:.4}"),
                format!("{carbon:.4}"),
            ];

            if techs.is_empty() {
                wtr.write_record(
                    [r.year.to_string(), region.clone(), String::new()]
                        .into_iter()
                        .chain([format!("{:.4}", 0.0), format!("{:.4}", 0.0)])
                        .chain(region_cols.iter().cloned())
                        .chain([String::new()]),
                )?;
                continue;
            }

            for tech in techs {
                let new_mw = built.and_then(|b| b.get(tech)).copied().unwrap_or(0.0);
                let gen_mwh = dispatch
                    .and_then(|d| d.generation_mwh.get(tech))
                    .copied()
                    .unwrap_or(0.0);
                let capex = r
                    .capex_usd_per_kw
                    .get(tech)
                    .map(|c| format!("{c:.4}"))
                    .unwrap_or_default();
                wtr.write_record(
                    [r.year.to_string(), region.clone(), tech.clone()]
                        .into_iter()
                        .chain([format!("{new_mw:.4}"), format!("{gen_mwh:.4}")])
                        .chain(region_cols.iter().cloned())
                        .chain([capex]),
                )?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

/// Exports the full record sequence as pretty JSON.
///
/// # Errors
///
/// Returns an `ExportError` if file creation or serialization fails.
pub fn export_json(records: &[SimulationYearRecord], path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_json(records, io::BufWriter::new(file))
}

/// Writes the record sequence as pretty JSON to any writer.
///
/// # Errors
///
/// Returns an `ExportError` if serialization or writing fails.
pub fn write_json(records: &[SimulationYearRecord], mut writer: impl Write) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(&mut writer, records)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Report sink that writes the CSV export to a file.
#[derive(Debug, Clone)]
pub struct CsvReport {
    path: PathBuf,
}

impl CsvReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for CsvReport {
    fn consume(&mut self, records: &[SimulationYearRecord]) -> Result<(), ExportError> {
        export_csv(records, &self.path)?;
        tracing::info!(path = %self.path.display(), rows = records.len(), "csv report written");
        Ok(())
    }
}

/// Report sink that writes the JSON export to a file.
#[derive(Debug, Clone)]
pub struct JsonReport {
    path: PathBuf,
}

impl JsonReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for JsonReport {
    fn consume(&mut self, records: &[SimulationYearRecord]) -> Result<(), ExportError> {
        export_json(records, &self.path)?;
        tracing::info!(path = %self.path.display(), years = records.len(), "json report written");
        Ok(())
    }
}

/// Fans one record sequence out to several sinks, in order.
#[derive(Default)]
pub struct ReportFanout {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl ReportFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn ReportSink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ReportSink for ReportFanout {
    fn consume(&mut self, records: &[SimulationYearRecord]) -> Result<(), ExportError> {
        for sink in &mut self.sinks {
            sink.consume(records)?;
        }
        Ok(())
    }
}
