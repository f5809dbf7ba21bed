//! Core simulation types: the run period, dispatch outcomes, and year records.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

/// New capacity in MW, keyed `region → technology`.
pub type InvestmentPlan = IndexMap<String, IndexMap<String, f64>>;

/// Inclusive range of simulated years.
///
/// # Examples
///
/// ```
/// use solar_deploy_sim::sim::types::SimulationPeriod;
///
/// let period = SimulationPeriod::new(2025, 2030);
/// assert_eq!(period.len(), 6);
/// assert_eq!(period.years().next(), Some(2025));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationPeriod {
    pub start_year: i32,
    pub end_year: i32,
}

impl SimulationPeriod {
    pub fn new(start_year: i32, end_year: i32) -> Self {
        Self {
            start_year,
            end_year,
        }
    }

    /// Returns `true` when the start year is after the end year.
    pub fn is_inverted(&self) -> bool {
        self.start_year > self.end_year
    }

    /// Number of simulated years; zero when inverted.
    pub fn len(&self) -> usize {
        usize::try_from(self.end_year - self.start_year + 1).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + use<> {
        self.start_year..=self.end_year
    }
}

/// One region's dispatch result for a year.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegionDispatch {
    /// Dispatched energy per technology (MWh). Technologies that
    /// dispatched nothing are absent.
    pub generation_mwh: IndexMap<String, f64>,
    /// Peak load × 8760 h.
    pub annual_demand_mwh: f64,
    pub total_dispatched_mwh: f64,
    pub unmet_demand_mwh: f64,
}

impl RegionDispatch {
    /// A record where nothing was dispatched.
    pub fn unmet_only(annual_demand_mwh: f64) -> Self {
        Self {
            generation_mwh: IndexMap::new(),
            annual_demand_mwh,
            total_dispatched_mwh: 0.0,
            unmet_demand_mwh: annual_demand_mwh,
        }
    }

    /// Share of demand served, or `None` with no demand.
    pub fn served_fraction(&self) -> Option<f64> {
        (self.annual_demand_mwh > 0.0).then(|| self.total_dispatched_mwh / self.annual_demand_mwh)
    }
}

/// Dispatch results for all regions in a year.
pub type MarketOutcome = IndexMap<String, RegionDispatch>;

/// Policy values observed for a region in a year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PolicySignals {
    pub carbon_price_usd_per_ton: f64,
    /// Capex multiplier for photovoltaic technologies after credits and grants.
    pub capex_factor: f64,
}

/// Everything recorded about one simulated year.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationYearRecord {
    pub year: i32,
    pub investments: InvestmentPlan,
    pub market_outcomes: MarketOutcome,
    /// Cost-ledger capex per technology after the year's cost update.
    pub capex_usd_per_kw: IndexMap<String, f64>,
    pub policy_signals: IndexMap<String, PolicySignals>,
}

impl SimulationYearRecord {
    /// Total MW invested across all regions and technologies.
    pub fn total_new_capacity_mw(&self) -> f64 {
        self.investments.values().flat_map(IndexMap::values).sum()
    }

    pub fn total_dispatched_mwh(&self) -> f64 {
        self.market_outcomes.values().map(|d| d.total_dispatched_mwh).sum()
    }

    pub fn total_unmet_mwh(&self) -> f64 {
        self.market_outcomes.values().map(|d| d.unmet_demand_mwh).sum()
    }
}

impl fmt::Display for SimulationYearRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "year={} new_mw={:.2} dispatched_mwh={:.2} unmet_mwh={:.2}",
            self.year,
            self.total_new_capacity_mw(),
            self.total_dispatched_mwh(),
            self.total_unmet_mwh()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_length_and_inversion() {
        assert_eq!(SimulationPeriod::new(2025, 2025).len(), 1);
        assert!(SimulationPeriod::new(2030, 2025).is_inverted());
        assert!(SimulationPeriod::new(2030, 2025).is_empty());
        assert_eq!(SimulationPeriod::new(2025, 2027).years().collect::<Vec<_>>(), vec![2025, 2026, 2027]);
    }

    #[test]
    fn years_do_not_borrow_the_period() {
        let mut period = SimulationPeriod::new(2025, 2027);
        let years = period.years();
        period.end_year = 2040;
        assert_eq!(years.collect::<Vec<_>>(), vec![2025, 2026, 2027]);
        assert_eq!(period.len(), 16);
    }

    #[test]
    fn unmet_only_record() {
        let d = RegionDispatch::unmet_only(100.0);
        assert_eq!(d.unmet_demand_mwh, 100.0);
        assert_eq!(d.served_fraction(), Some(0.0));
        assert_eq!(RegionDispatch::unmet_only(0.0).served_fraction(), None);
    }

    #[test]
    fn record_totals() {
        let mut record = SimulationYearRecord {
            year: 2030,
            ..SimulationYearRecord::default()
        };
        let mut usa = IndexMap::new();
        usa.insert("TOPCon_PV".to_string(), 50.0);
        usa.insert("LFP_Battery".to_string(), 50.0);
        record.investments.insert("USA".to_string(), usa);
        record.market_outcomes.insert(
            "USA".to_string(),
            RegionDispatch {
                total_dispatched_mwh: 10.0,
                unmet_demand_mwh: 5.0,
                annual_demand_mwh: 15.0,
                generation_mwh: IndexMap::new(),
            },
        );
        assert_eq!(record.total_new_capacity_mw(), 100.0);
        assert_eq!(record.total_dispatched_mwh(), 10.0);
        assert_eq!(record.total_unmet_mwh(), 5.0);
        assert_eq!(
            record.to_string(),
            "year=2030 new_mw=100.00 dispatched_mwh=10.00 unmet_mwh=5.00"
        );
    }
}
