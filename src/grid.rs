//! Regional grid bookkeeping: installed capacity, load, and the solar
//! penetration ceiling.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::lookup::{GridLookup, TechnologyLookup};
use crate::tech::TechnologyCategory;

/// Default interconnection distance in km.
pub const DEFAULT_INTERCONNECTION_DISTANCE_KM: f64 = 10.0;

/// Grid parameters for one region as written in a scenario.
///
/// Regions missing `existing_capacity_mw` or `current_load_mw` are skipped
/// when the ledger is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridRegionSpec {
    pub existing_capacity_mw: Option<f64>,
    pub current_load_mw: Option<f64>,
    /// Solar ceiling as a share of existing capacity (default 0.50).
    pub max_solar_penetration_pct: f64,
    /// Default 100,000 USD/MW.
    pub base_interconnection_cost_usd_per_mw: f64,
    /// Multiplier on interconnection cost (default 1.0).
    pub transmission_constraint_factor: f64,
    /// Default 2,000 USD per MW-km.
    pub avg_transmission_cost_usd_per_mw_km: f64,
    /// Default 1.0.
    pub avg_terrain_factor: f64,
    /// Solar capacity not attributed to a technology (default 0).
    pub current_solar_mw: f64,
    /// Installed capacity loaded at construction.
    pub initial_capacity_mw_by_tech: IndexMap<String, f64>,
}

impl Default for GridRegionSpec {
    fn default() -> Self {
        Self {
            existing_capacity_mw: None,
            current_load_mw: None,
            max_solar_penetration_pct: 0.50,
            base_interconnection_cost_usd_per_mw: 100_000.0,
            transmission_constraint_factor: 1.0,
            avg_transmission_cost_usd_per_mw_km: 2000.0,
            avg_terrain_factor: 1.0,
            current_solar_mw: 0.0,
            initial_capacity_mw_by_tech: IndexMap::new(),
        }
    }
}

/// Live grid state for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRegion {
    pub existing_capacity_mw: f64,
    pub current_load_mw: f64,
    pub max_solar_penetration_pct: f64,
    pub base_interconnection_cost_usd_per_mw: f64,
    pub transmission_constraint_factor: f64,
    pub avg_transmission_cost_usd_per_mw_km: f64,
    pub avg_terrain_factor: f64,
    current_solar_mw: f64,
    capacities_mw_by_tech: IndexMap<String, f64>,
}

impl GridRegion {
    /// Creates a region with default cost parameters and no installed capacity.
    pub fn new(existing_capacity_mw: f64, current_load_mw: f64) -> Self {
        let defaults = GridRegionSpec::default();
        Self {
            existing_capacity_mw,
            current_load_mw,
            max_solar_penetration_pct: defaults.max_solar_penetration_pct,
            base_interconnection_cost_usd_per_mw: defaults.base_interconnection_cost_usd_per_mw,
            transmission_constraint_factor: defaults.transmission_constraint_factor,
            avg_transmission_cost_usd_per_mw_km: defaults.avg_transmission_cost_usd_per_mw_km,
            avg_terrain_factor: defaults.avg_terrain_factor,
            current_solar_mw: 0.0,
            capacities_mw_by_tech: IndexMap::new(),
        }
    }

    fn from_spec(spec: &GridRegionSpec) -> Option<Self> {
        Some(Self {
            existing_capacity_mw: spec.existing_capacity_mw?,
            current_load_mw: spec.current_load_mw?,
            max_solar_penetration_pct: spec.max_solar_penetration_pct,
            base_interconnection_cost_usd_per_mw: spec.base_interconnection_cost_usd_per_mw,
            transmission_constraint_factor: spec.transmission_constraint_factor,
            avg_transmission_cost_usd_per_mw_km: spec.avg_transmission_cost_usd_per_mw_km,
            avg_terrain_factor: spec.avg_terrain_factor,
            current_solar_mw: spec.current_solar_mw,
            capacities_mw_by_tech: IndexMap::new(),
        })
    }

    /// Maximum solar capacity allowed, in MW.
    pub fn max_solar_mw(&self) -> f64 {
        self.existing_capacity_mw * self.max_solar_penetration_pct
    }

    pub fn current_solar_mw(&self) -> f64 {
        self.current_solar_mw
    }

    pub fn capacities_mw_by_tech(&self) -> &IndexMap<String, f64> {
        &self.capacities_mw_by_tech
    }
}

/// Grid state for every configured region.
#[derive(Debug, Clone, Default)]
pub struct GridLedger {
    regions: IndexMap<String, GridRegion>,
}

impl GridLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the ledger from scenario specs and loads initial capacity
    /// through [`GridLedger::add_new_capacity`].
    ///
    /// Regions without existing capacity or load are skipped with an error log.
    pub fn from_specs(
        specs: &IndexMap<String, GridRegionSpec>,
        technologies: &dyn TechnologyLookup,
        year: i32,
    ) -> Self {
        let mut ledger = Self::new();
        let mut initial = IndexMap::new();
        for (name, spec) in specs {
            let Some(region) = GridRegion::from_spec(spec) else {
                error!(region = %name, "missing existing_capacity_mw or current_load_mw; skipping region");
                continue;
            };
            ledger.insert_region(name.clone(), region);
            if !spec.initial_capacity_mw_by_tech.is_empty() {
                initial.insert(name.clone(), spec.initial_capacity_mw_by_tech.clone());
            }
        }
        if ledger.regions.is_empty() {
            warn!("grid ledger has no valid regions");
        }
        ledger.add_new_capacity(year, &initial, technologies);
        ledger
    }

    pub fn insert_region(&mut self, name: impl Into<String>, region: GridRegion) {
        let name = name.into();
        info!(region = %name, max_solar_mw = region.max_solar_mw(), "grid region loaded");
        self.regions.insert(name, region);
    }

    pub fn region(&self, name: &str) -> Option<&GridRegion> {
        self.regions.get(name)
    }

    pub fn region_names(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    fn lookup(&self, name: &str, op: &'static str) -> Option<&GridRegion> {
        let region = self.regions.get(name);
        if region.is_none() {
            warn!(region = name, op, "grid region not found");
        }
        region
    }

    pub fn update_for_year(&self, year: i32, regions: &[String]) {
        for name in regions {
            if self.lookup(name, "update_for_year").is_some() {
                debug!(region = %name, year, "grid region ready");
            }
        }
    }

    /// `existing_capacity × penetration ceiling`, or 0 for an unknown region.
    pub fn max_solar_penetration_mw(&self, region: &str) -> f64 {
        self.lookup(region, "max_solar_penetration_mw")
            .map_or(0.0, GridRegion::max_solar_mw)
    }

    pub fn current_solar_mw(&self, region: &str) -> f64 {
        self.lookup(region, "current_solar_mw")
            .map_or(0.0, GridRegion::current_solar_mw)
    }

    pub fn add_solar_capacity(&mut self, region: &str, mw: f64) {
        match self.regions.get_mut(region) {
            Some(r) => {
                r.current_solar_mw += mw;
                info!(region, added_mw = mw, total_mw = r.current_solar_mw, "solar capacity added");
            }
            None => warn!(region, op = "add_solar_capacity", "grid region not found"),
        }
    }

    /// Adds a year's new capacity, `region → technology → MW`.
    ///
    /// Non-positive amounts are skipped. Only photovoltaic technologies count
    /// toward aggregate solar.
    pub fn add_new_capacity(
        &mut self,
        year: i32,
        additions: &IndexMap<String, IndexMap<String, f64>>,
        technologies: &dyn TechnologyLookup,
    ) {
        for (region_name, by_tech) in additions {
            let Some(region) = self.regions.get_mut(region_name) else {
                warn!(region = %region_name, year, "grid region not found; capacity not added");
                continue;
            };
            for (tech, &mw) in by_tech {
                if mw <= 0.0 {
                    continue;
                }
                let total = region.capacities_mw_by_tech.entry(tech.clone()).or_insert(0.0);
                *total += mw;
                debug!(region = %region_name, technology = %tech, added_mw = mw, total_mw = *total, year, "capacity added");

                if technologies.category(tech) == Some(TechnologyCategory::Photovoltaic) {
                    region.current_solar_mw += mw;
                }
            }
        }
    }

    pub fn capacity_by_tech(&self, region: &str) -> IndexMap<String, f64> {
        self.lookup(region, "capacity_by_tech")
            .map(|r| r.capacities_mw_by_tech.clone())
            .unwrap_or_default()
    }

    /// `(base × MW + rate × MW × km × terrain) × constraint factor`.
    ///
    /// An unknown region costs 0.
    pub fn calculate_interconnection_costs(&self, region: &str, capacity_mw: f64, distance_km: f64) -> f64 {
        self.lookup(region, "calculate_interconnection_costs")
            .map_or(0.0, |r| {
                let base = r.base_interconnection_cost_usd_per_mw * capacity_mw;
                let transmission = r.avg_transmission_cost_usd_per_mw_km
                    * capacity_mw
                    * distance_km
                    * r.avg_terrain_factor;
                (base + transmission) * r.transmission_constraint_factor
            })
    }

    /// Distance-dependent share of the interconnection cost.
    pub fn transmission_upgrade_cost(&self, region: &str, capacity_mw: f64, distance_km: f64) -> f64 {
        self.lookup(region, "transmission_upgrade_cost")
            .map_or(0.0, |r| {
                capacity_mw
                    * distance_km
                    * r.avg_transmission_cost_usd_per_mw_km
                    * r.avg_terrain_factor
                    * r.transmission_constraint_factor
            })
    }

    /// Whether `additional_mw` of solar stays within the penetration ceiling.
    ///
    /// Always `false` for an unknown region.
    pub fn check_grid_constraints(&self, region: &str, additional_mw: f64) -> bool {
        let Some(r) = self.lookup(region, "check_grid_constraints") else {
            return false;
        };
        let max = r.max_solar_mw();
        if r.current_solar_mw + additional_mw > max {
            info!(
                region,
                additional_mw,
                current_mw = r.current_solar_mw,
                max_mw = max,
                "addition would exceed solar penetration ceiling"
            );
            return false;
        }
        true
    }
}

impl GridLookup for GridLedger {
    fn current_load_mw(&self, region: &str) -> Option<f64> {
        self.regions.get(region).map(|r| r.current_load_mw)
    }

    fn capacity_by_tech(&self, region: &str) -> IndexMap<String, f64> {
        GridLedger::capacity_by_tech(self, region)
    }

    fn check_grid_constraints(&self, region: &str, additional_mw: f64) -> bool {
        GridLedger::check_grid_constraints(self, region, additional_mw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tech::{Technology, TechnologyEvolutionModel};

    fn techs() -> TechnologyEvolutionModel {
        let mut model = TechnologyEvolutionModel::new();
        model.add_technology(Technology::new(
            "TOPCon_PV",
            TechnologyCategory::Photovoltaic,
            0.22,
            0.26,
            2025,
            2025,
            0.004,
            1000.0,
            0.02,
        ));
        model.add_technology(Technology::new(
            "LFP_Battery",
            TechnologyCategory::Storage,
            0.90,
            0.92,
            2020,
            2020,
            0.01,
            400.0,
            0.03,
        ));
        model
    }

    fn usa() -> GridLedger {
        let mut region = GridRegion::new(500_000.0, 450_000.0);
        region.max_solar_penetration_pct = 0.6;
        let mut ledger = GridLedger::new();
        ledger.insert_region("USA", region);
        ledger
    }

    fn additions(region: &str, rows: &[(&str, f64)]) -> IndexMap<String, IndexMap<String, f64>> {
        let mut by_tech = IndexMap::new();
        for (t, mw) in rows {
            by_tech.insert((*t).to_string(), *mw);
        }
        let mut out = IndexMap::new();
        out.insert(region.to_string(), by_tech);
        out
    }

    #[test]
    fn penetration_ceiling_boundary() {
        let grid = usa();
        assert_eq!(grid.max_solar_penetration_mw("USA"), 300_000.0);
        assert!(grid.check_grid_constraints("USA", 300_000.0));
        assert!(!grid.check_grid_constraints("USA", 300_000.1));
    }

    #[test]
    fn unknown_region_defaults() {
        let grid = usa();
        assert_eq!(grid.max_solar_penetration_mw("Mars"), 0.0);
        assert_eq!(grid.current_solar_mw("Mars"), 0.0);
        assert!(grid.capacity_by_tech("Mars").is_empty());
        assert!(!grid.check_grid_constraints("Mars", 1.0));
        assert_eq!(grid.calculate_interconnection_costs("Mars", 10.0, 10.0), 0.0);
        assert_eq!(grid.current_load_mw("Mars"), None);
    }

    #[test]
    fn only_photovoltaic_counts_as_solar() {
        let mut grid = usa();
        let t = techs();
        grid.add_new_capacity(
            2030,
            &additions("USA", &[("TOPCon_PV", 50.0), ("LFP_Battery", 20.0), ("Mystery", 5.0)]),
            &t,
        );
        assert_eq!(grid.current_solar_mw("USA"), 50.0);
        let caps = grid.capacity_by_tech("USA");
        assert_eq!(caps.get("LFP_Battery"), Some(&20.0));
        assert_eq!(caps.get("Mystery"), Some(&5.0));
    }

    #[test]
    fn non_positive_additions_are_skipped() {
        let mut grid = usa();
        let t = techs();
        grid.add_new_capacity(2030, &additions("USA", &[("TOPCon_PV", 0.0), ("LFP_Battery", -5.0)]), &t);
        assert!(grid.capacity_by_tech("USA").is_empty());
        assert_eq!(grid.current_solar_mw("USA"), 0.0);
    }

    #[test]
    fn additions_accumulate_across_years() {
        let mut grid = usa();
        let t = techs();
        grid.add_new_capacity(2030, &additions("USA", &[("TOPCon_PV", 50.0)]), &t);
        grid.add_new_capacity(2031, &additions("USA", &[("TOPCon_PV", 50.0)]), &t);
        assert_eq!(grid.capacity_by_tech("USA").get("TOPCon_PV"), Some(&100.0));
        assert_eq!(grid.current_solar_mw("USA"), 100.0);
    }

    #[test]
    fn interconnection_cost_formula() {
        let mut region = GridRegion::new(1000.0, 800.0);
        region.transmission_constraint_factor = 1.5;
        region.avg_terrain_factor = 2.0;
        let mut grid = GridLedger::new();
        grid.insert_region("EU", region);

        let expected = (100_000.0 * 10.0 + 2000.0 * 10.0 * 10.0 * 2.0) * 1.5;
        assert_eq!(
            grid.calculate_interconnection_costs("EU", 10.0, DEFAULT_INTERCONNECTION_DISTANCE_KM),
            expected
        );
        assert_eq!(
            grid.transmission_upgrade_cost("EU", 10.0, 10.0),
            10.0 * 10.0 * 2000.0 * 2.0 * 1.5
        );
    }

    #[test]
    fn specs_missing_required_fields_are_skipped() {
        let mut specs = IndexMap::new();
        specs.insert(
            "China".to_string(),
            GridRegionSpec {
                existing_capacity_mw: Some(1_200_000.0),
                current_load_mw: Some(1_000_000.0),
                current_solar_mw: 50_000.0,
                initial_capacity_mw_by_tech: [("TOPCon_PV".to_string(), 1000.0)].into_iter().collect(),
                ..GridRegionSpec::default()
            },
        );
        specs.insert(
            "Atlantis".to_string(),
            GridRegionSpec {
                existing_capacity_mw: Some(10.0),
                ..GridRegionSpec::default()
            },
        );
        let grid = GridLedger::from_specs(&specs, &techs(), 2025);
        assert!(grid.region("Atlantis").is_none());
        assert_eq!(grid.current_solar_mw("China"), 51_000.0);
        assert_eq!(grid.max_solar_penetration_mw("China"), 600_000.0);
        assert_eq!(grid.region_names().collect::<Vec<_>>(), vec!["China"]);
    }

    #[test]
    fn spec_defaults_parse_from_toml() {
        let spec: Option<GridRegionSpec> = toml::from_str(
            r#"
existing_capacity_mw = 500000
current_load_mw = 450000
"#,
        )
        .ok();
        let spec = spec.unwrap_or_default();
        assert_eq!(spec.existing_capacity_mw, Some(500_000.0));
        assert_eq!(spec.max_solar_penetration_pct, 0.5);
        assert_eq!(spec.base_interconnection_cost_usd_per_mw, 100_000.0);
    }
}
