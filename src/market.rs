//! Wholesale energy prices, ancillary services, and annual merit-order dispatch.

use indexmap::IndexMap;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cost::HOURS_PER_YEAR;
use crate::lookup::{GridLookup, MarketLookup, TechnologyLookup};
use crate::sim::types::{MarketOutcome, RegionDispatch};
use crate::tech::TechnologyCategory;

/// Base energy price used for regions without a market design, USD/MWh.
pub const DEFAULT_BASE_PRICE_USD_PER_MWH: f64 = 50.0;
/// Assumed annual capacity factor for generating technologies in dispatch.
pub const DISPATCH_GENERATION_CF: f64 = 0.20;
/// Assumed effective annual energy factor for storage in dispatch.
pub const DISPATCH_STORAGE_CF: f64 = 0.10;

/// An ancillary service market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AncillaryService {
    pub price_usd_per_mw_year: f64,
    /// Realizable share of the nominal price (default 1.0).
    pub availability_factor: f64,
    pub notes: Option<String>,
}

impl Default for AncillaryService {
    fn default() -> Self {
        Self {
            price_usd_per_mw_year: 0.0,
            availability_factor: 1.0,
            notes: None,
        }
    }
}

/// Market structure for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarketDesign {
    /// e.g. `energy_only` or `capacity_market`.
    #[serde(rename = "type")]
    pub market_type: String,
    pub base_energy_price_usd_per_mwh: f64,
    /// Time-of-use multipliers; unlisted periods use 1.0.
    pub tou_factors: IndexMap<String, f64>,
    pub ancillary_services: IndexMap<String, AncillaryService>,
}

impl Default for MarketDesign {
    fn default() -> Self {
        Self {
            market_type: "energy_only".to_string(),
            base_energy_price_usd_per_mwh: DEFAULT_BASE_PRICE_USD_PER_MWH,
            tou_factors: IndexMap::new(),
            ancillary_services: IndexMap::new(),
        }
    }
}

/// Prices and dispatch across all configured market regions.
#[derive(Debug, Clone, Default)]
pub struct MarketSimulator {
    designs: IndexMap<String, MarketDesign>,
}

impl MarketSimulator {
    pub fn new(designs: IndexMap<String, MarketDesign>) -> Self {
        info!(designs = designs.len(), "market simulator initialized");
        Self { designs }
    }

    pub fn design(&self, region: &str) -> Option<&MarketDesign> {
        self.designs.get(region)
    }

    /// `base price × time-of-use multiplier`.
    ///
    /// Regions without a design use a base price of 50 USD/MWh.
    pub fn get_energy_price(&self, region: &str, time_of_day: &str) -> f64 {
        let (base, multiplier) = match self.designs.get(region) {
            Some(d) => (
                d.base_energy_price_usd_per_mwh,
                d.tou_factors.get(time_of_day).copied().unwrap_or(1.0),
            ),
            None => (DEFAULT_BASE_PRICE_USD_PER_MWH, 1.0),
        };
        let price = base * multiplier;
        debug!(region, time_of_day, price, "energy price");
        price
    }

    /// `capacity × price per MW-year × availability`; zero for undefined
    /// services or regions.
    pub fn estimate_ancillary_revenue(&self, capacity_mw: f64, service: &str, region: &str) -> f64 {
        let Some(svc) = self
            .designs
            .get(region)
            .and_then(|d| d.ancillary_services.get(service))
        else {
            debug!(region, service, "ancillary service not defined");
            return 0.0;
        };
        capacity_mw * svc.price_usd_per_mw_year * svc.availability_factor
    }

    /// Dispatches every region for `year` against current grid capacity.
    ///
    /// Results come back in `regions` order whether or not the `parallel`
    /// feature is enabled.
    pub fn simulate_dispatch_for_year(
        &self,
        year: i32,
        regions: &[String],
        grid: &dyn GridLookup,
        technologies: &dyn TechnologyLookup,
    ) -> MarketOutcome {
        #[cfg(feature = "parallel")]
        let iter = regions.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = regions.iter();

        let results: Vec<RegionDispatch> = iter
            .map(|region| dispatch_region(year, region, grid, technologies))
            .collect();

        regions.iter().cloned().zip(results).collect()
    }
}

/// Merit-order dispatch for one region.
///
/// Demand is a flat profile at peak load. Every commercially available
/// technology with capacity runs at a fixed factor, all at zero marginal
/// cost, until demand is met.
pub fn dispatch_region(
    year: i32,
    region: &str,
    grid: &dyn GridLookup,
    technologies: &dyn TechnologyLookup,
) -> RegionDispatch {
    let Some(load_mw) = grid.current_load_mw(region) else {
        warn!(region, year, "no grid load for region; skipping dispatch");
        return RegionDispatch::default();
    };
    let demand = load_mw * HOURS_PER_YEAR;

    let installed = grid.capacity_by_tech(region);
    if installed.is_empty() {
        info!(region, year, "no installed capacity; demand unmet");
        return RegionDispatch::unmet_only(demand);
    }

    struct Candidate<'a> {
        name: &'a str,
        potential_mwh: f64,
        marginal_cost: f64,
    }

    let mut candidates: Vec<Candidate<'_>> = Vec::new();
    for (tech, &capacity_mw) in &installed {
        if capacity_mw <= 0.0 {
            continue;
        }
        let params = match technologies.technology_params(tech, year) {
            Ok(p) => p,
            Err(e) => {
                warn!(region, technology = %tech, error = %e, "skipping technology in dispatch");
                continue;
            }
        };
        if !params.is_commercially_available {
            debug!(region, technology = %tech, year, "not commercially available; skipped");
            continue;
        }
        let factor = match params.category {
            TechnologyCategory::Storage => DISPATCH_STORAGE_CF,
            _ => DISPATCH_GENERATION_CF,
        };
        let potential_mwh = capacity_mw * factor * HOURS_PER_YEAR;
        if potential_mwh > 0.0 {
            candidates.push(Candidate {
                name: tech,
                potential_mwh,
                marginal_cost: 0.0,
            });
        }
    }

    candidates.sort_by(|a, b| a.marginal_cost.total_cmp(&b.marginal_cost));

    let mut outcome = RegionDispatch {
        annual_demand_mwh: demand,
        ..RegionDispatch::default()
    };
    for c in &candidates {
        let remaining = demand - outcome.total_dispatched_mwh;
        if remaining <= 0.0 {
            break;
        }
        let dispatched = c.potential_mwh.min(remaining);
        if dispatched > 0.0 {
            outcome.generation_mwh.insert(c.name.to_string(), dispatched);
            outcome.total_dispatched_mwh += dispatched;
        }
    }
    outcome.unmet_demand_mwh = (demand - outcome.total_dispatched_mwh).max(0.0);

    info!(
        region,
        year,
        demand_mwh = demand,
        dispatched_mwh = outcome.total_dispatched_mwh,
        unmet_mwh = outcome.unmet_demand_mwh,
        "dispatch complete"
    );
    outcome
}

impl MarketLookup for MarketSimulator {
    fn energy_price(&self, region: &str, time_of_day: &str) -> f64 {
        self.get_energy_price(region, time_of_day)
    }

    fn ancillary_revenue(&self, capacity_mw: f64, service: &str, region: &str) -> f64 {
        self.estimate_ancillary_revenue(capacity_mw, service, region)
    }
}
