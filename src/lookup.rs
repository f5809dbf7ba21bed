//! Narrow lookup interfaces between the models.
//!
//! Each model depends on the capabilities it queries, not on the concrete
//! type providing them. The engine hands out `&dyn` references per call, so
//! no model holds another.

use indexmap::IndexMap;

use crate::cost::LcoeResult;
use crate::error::{ExportError, ModelError, SupplyChainError};
use crate::sim::types::SimulationYearRecord;
use crate::supply_chain::{CapacityUnit, ConcentrationRisk, MaterialAvailability};
use crate::tech::{TechParams, TechnologyCategory};

/// Year-indexed technology parameters.
pub trait TechnologyLookup: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownTechnology`] for unregistered names.
    fn technology_params(&self, name: &str, year: i32) -> Result<TechParams, ModelError>;

    fn category(&self, name: &str) -> Option<TechnologyCategory>;
}

/// Levelized cost of a technology in a given year.
pub trait CostLookup: Send + Sync {
    fn evolving_lcoe(
        &self,
        technologies: &dyn TechnologyLookup,
        technology: &str,
        year: i32,
        capacity_factor: f64,
        discount_rate: f64,
        lifetime_years: u32,
    ) -> LcoeResult;
}

/// Wholesale prices and ancillary service revenue.
pub trait MarketLookup: Send + Sync {
    /// Energy price in USD/MWh for a region and time-of-day band.
    fn energy_price(&self, region: &str, time_of_day: &str) -> f64;

    /// Annual ancillary revenue in USD for `capacity_mw` providing `service`.
    fn ancillary_revenue(&self, capacity_mw: f64, service: &str, region: &str) -> f64;
}

/// Regional grid state.
pub trait GridLookup: Send + Sync {
    fn current_load_mw(&self, region: &str) -> Option<f64>;

    fn capacity_by_tech(&self, region: &str) -> IndexMap<String, f64>;

    /// Whether `additional_mw` of solar fits under the region's penetration ceiling.
    fn check_grid_constraints(&self, region: &str, additional_mw: f64) -> bool;
}

/// Converts emissions into a carbon cost (or revenue, for avoided emissions).
pub trait CarbonPricing: Send + Sync {
    fn get_carbon_cost(&self, emissions_tons_co2: f64, scheme: &str) -> f64;
}

/// Policy signals queried by the engine each year.
pub trait PolicyCollaborator: Send + Sync {
    fn get_carbon_price(&self, region: &str, year: i32) -> f64;

    /// Multiplier applied to capex after investment tax credits and grants.
    fn effective_capex_factor(&self, region: &str, year: i32, technology: Option<&str>) -> f64;
}

/// Upstream manufacturing and material capacity.
pub trait SupplyChainCollaborator: Send + Sync {
    fn global_capacity(&self, item: &str) -> Option<f64>;

    fn get_material_availability(&self, material: &str, required: f64) -> MaterialAvailability;

    /// # Errors
    ///
    /// Fails when the item is unknown or tracked in another unit.
    fn get_concentration_risk(
        &self,
        item: &str,
        unit: CapacityUnit,
    ) -> Result<ConcentrationRisk, SupplyChainError>;

    fn model_capacity_expansion(&mut self, item: &str, region: &str, additional: f64, year: i32);
}

/// Receives the full set of yearly records once a run completes.
pub trait ReportSink {
    /// # Errors
    ///
    /// Returns an [`ExportError`] when the records cannot be written.
    fn consume(&mut self, records: &[SimulationYearRecord]) -> Result<(), ExportError>;
}
