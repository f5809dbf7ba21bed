//! Post-hoc run summary computed from the year records.

use std::fmt;

use indexmap::IndexMap;

use super::types::SimulationYearRecord;

/// Aggregate indicators derived from a complete simulation run.
///
/// Computed post-hoc from the record sequence so the summary always agrees
/// with the exported rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Years simulated.
    pub years: usize,
    /// New capacity over the run, per technology (MW).
    pub new_capacity_mw_by_tech: IndexMap<String, f64>,
    /// New capacity over the run, all technologies (MW).
    pub total_new_capacity_mw: f64,
    /// Dispatched energy in the final year (MWh).
    pub final_year_dispatched_mwh: f64,
    /// Unmet demand in the final year (MWh).
    pub final_year_unmet_mwh: f64,
    /// Mean served share over (year, region) pairs with positive demand, in percent.
    pub avg_demand_served_pct: f64,
    /// Years in which anything was built.
    pub years_with_investment: usize,
}

impl RunSummary {
    /// Computes the summary from the full record sequence.
    pub fn from_records(records: &[SimulationYearRecord]) -> Self {
        let Some(last) = records.last() else {
            return Self::default();
        };

        let mut by_tech: IndexMap<String, f64> = IndexMap::new();
        let mut years_with_investment = 0;
        let mut served_sum = 0.0;
        let mut served_n = 0_usize;

        for r in records {
            for region in r.investments.values() {
                for (tech, &mw) in region {
                    *by_tech.entry(tech.clone()).or_insert(0.0) += mw;
                }
            }
            if r.total_new_capacity_mw() > 0.0 {
                years_with_investment += 1;
            }
            for fraction in r.market_outcomes.values().filter_map(|d| d.served_fraction()) {
                served_sum += fraction;
                served_n += 1;
            }
        }

        let avg_demand_served_pct = if served_n > 0 {
            100.0 * served_sum / served_n as f64
        } else {
            0.0
        };

        Self {
            years: records.len(),
            total_new_capacity_mw: by_tech.values().sum(),
            new_capacity_mw_by_tech: by_tech,
            final_year_dispatched_mwh: last.total_dispatched_mwh(),
            final_year_unmet_mwh: last.total_unmet_mwh(),
            avg_demand_served_pct,
            years_with_investment,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Run Summary ---")?;
        writeln!(f, "Years simulated:        {}", self.years)?;
        writeln!(f, "Total new capacity:     {:.2} MW", self.total_new_capacity_mw)?;
        for (tech, mw) in &self.new_capacity_mw_by_tech {
            writeln!(f, "  {tech}: {mw:.2} MW")?;
        }
        writeln!(f, "Final-year dispatched:  {:.2} MWh", self.final_year_dispatched_mwh)?;
        writeln!(f, "Final-year unmet:       {:.2} MWh", self.final_year_unmet_mwh)?;
        writeln!(f, "Avg demand served:      {:.1}%", self.avg_demand_served_pct)?;
        write!(f, "Years with investment:  {}", self.years_with_investment)
    }
}
