//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::carbon::{CarbonScheme, CarbonSchemeKind};
use crate::cost::{CapexComponents, SupplyChainWatch};
use crate::grid::GridRegionSpec;
use crate::investment::ReferenceProject;
use crate::market::MarketDesign;
use crate::policy::{Policy, PolicyKind};
use crate::supply_chain::{ScheduledExpansion, SupplyItem};
use crate::tech::{Technology, TechnologyCategory};

/// Top-level scenario configuration parsed from TOML.
///
/// Omitted sections keep the baseline values. Load from TOML with
/// [`ScenarioConfig::from_toml_file`] or use [`ScenarioConfig::baseline`]
/// for the built-in default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulated period, regions and technologies.
    pub simulation: SimulationConfig,
    /// Technology registry.
    pub technologies: Vec<TechnologyConfig>,
    /// Cost ledgers and learning.
    pub costs: CostConfig,
    /// Grid data per region.
    pub grid: IndexMap<String, GridRegionSpec>,
    /// Market design per region.
    pub market: IndexMap<String, MarketDesign>,
    /// Carbon pricing schemes by name.
    pub carbon: IndexMap<String, CarbonScheme>,
    pub policies: Vec<Policy>,
    pub supply_chain: SupplyChainConfig,
    /// Reference project evaluated for every (region, technology) pair.
    pub investment: ReferenceProject,
}

/// Simulated period and the region and technology sets.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// First simulated year (inclusive).
    pub start_year: i32,
    /// Last simulated year (inclusive, must be >= `start_year`).
    pub end_year: i32,
    pub regions: Vec<String>,
    /// Technologies evaluated each year; each must appear in `[[technologies]]`.
    pub technologies: Vec<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_year: 2025,
            end_year: 2030,
            regions: vec!["USA".into(), "China".into(), "EU_Germany".into()],
            technologies: vec![
                "TOPCon_PV".into(),
                "AdvancedMonocrystallineSilicon".into(),
                "LFP_Battery".into(),
            ],
        }
    }
}

/// One technology definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TechnologyConfig {
    pub name: String,
    pub category: TechnologyCategory,
    /// Efficiency at `start_year`.
    pub base_efficiency: f64,
    pub projected_efficiency_2035: f64,
    pub start_year: i32,
    pub commercial_scale_year: i32,
    #[serde(default)]
    pub degradation_rate_annual: f64,
    pub base_capex_usd_per_kw: f64,
    /// Fractional capex decline per year after `start_year`.
    #[serde(default)]
    pub annual_capex_reduction_rate: f64,
}

impl TechnologyConfig {
    pub fn to_technology(&self) -> Technology {
        Technology::new(
            self.name.clone(),
            self.category,
            self.base_efficiency,
            self.projected_efficiency_2035,
            self.start_year,
            self.commercial_scale_year,
            self.degradation_rate_annual,
            self.base_capex_usd_per_kw,
            self.annual_capex_reduction_rate,
        )
    }
}

/// Reference cost ledger plus per-technology overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CostConfig {
    /// Name given to the reference ledger.
    pub reference_technology: String,
    pub components: CapexComponents,
    pub opex_per_kw_year: f64,
    /// Fractional cost reduction per doubling of volume, in [0, 1).
    pub learning_rate: f64,
    /// Cumulative production behind `components`, in GW.
    pub initial_production_volume_gw: f64,
    /// Apply the supply-chain surcharge to module cost each year.
    pub apply_supply_chain: bool,
    pub supply_chain_watch: SupplyChainWatch,
    /// Technology-specific ledgers; unset fields fall back to the reference.
    pub overrides: IndexMap<String, CostOverride>,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            reference_technology: "TOPCon_PV".to_string(),
            components: CapexComponents {
                module_usd_per_kw: 650.0,
                bos_usd_per_kw: 120.0,
                inverter_usd_per_kw: 80.0,
                installation_usd_per_kw: 150.0,
            },
            opex_per_kw_year: 15.0,
            learning_rate: 0.20,
            initial_production_volume_gw: 50.0,
            apply_supply_chain: false,
            supply_chain_watch: SupplyChainWatch::default(),
            overrides: IndexMap::new(),
        }
    }
}

/// Overrides for one technology's cost ledger.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CostOverride {
    pub components: Option<CapexComponents>,
    pub opex_per_kw_year: Option<f64>,
    pub learning_rate: Option<f64>,
    pub initial_production_volume_gw: Option<f64>,
}

/// Supply-chain data and scheduled capacity expansions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupplyChainConfig {
    /// Start from the built-in polysilicon/module/lithium dataset.
    pub use_default_data: bool,
    /// Extra or replacement items, keyed by name.
    pub items: IndexMap<String, SupplyItem>,
    pub expansions: Vec<ScheduledExpansion>,
}

impl Default for SupplyChainConfig {
    fn default() -> Self {
        Self {
            use_default_data: true,
            items: IndexMap::new(),
            expansions: Vec::new(),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.start_year"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::baseline()
    }
}

fn grid_region(existing_mw: f64, load_mw: f64) -> GridRegionSpec {
    GridRegionSpec {
        existing_capacity_mw: Some(existing_mw),
        current_load_mw: Some(load_mw),
        ..GridRegionSpec::default()
    }
}

fn scheme(kind: CarbonSchemeKind, price: f64) -> CarbonScheme {
    CarbonScheme {
        kind,
        price_per_ton_co2: price,
        reference_carbon_price_per_ton_co2: None,
    }
}

fn policy(id: &str, kind: PolicyKind, value: f64, region: &str, years: (i32, i32)) -> Policy {
    Policy {
        id: id.to_string(),
        kind,
        value,
        region: Some(region.to_string()),
        applicable_regions: Vec::new(),
        technology_scope: None,
        start_year: Some(years.0),
        end_year: Some(years.1),
        target_year: None,
        unit: None,
        description: String::new(),
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: three regions, two PV technologies and
    /// one battery, 2025 to 2030.
    pub fn baseline() -> Self {
        let technologies = vec![
            TechnologyConfig {
                name: "TOPCon_PV".into(),
                category: TechnologyCategory::Photovoltaic,
                base_efficiency: 0.24,
                projected_efficiency_2035: 0.279,
                start_year: 2022,
                commercial_scale_year: 2022,
                degradation_rate_annual: 0.004,
                base_capex_usd_per_kw: 650.0,
                annual_capex_reduction_rate: 0.02,
            },
            TechnologyConfig {
                name: "AdvancedMonocrystallineSilicon".into(),
                category: TechnologyCategory::Photovoltaic,
                base_efficiency: 0.23,
                projected_efficiency_2035: 0.305,
                start_year: 2020,
                commercial_scale_year: 2020,
                degradation_rate_annual: 0.005,
                base_capex_usd_per_kw: 700.0,
                annual_capex_reduction_rate: 0.025,
            },
            TechnologyConfig {
                name: "LFP_Battery".into(),
                category: TechnologyCategory::Storage,
                base_efficiency: 0.90,
                projected_efficiency_2035: 0.917,
                start_year: 2018,
                commercial_scale_year: 2018,
                degradation_rate_annual: 0.01,
                base_capex_usd_per_kw: 400.0,
                annual_capex_reduction_rate: 0.03,
            },
        ];

        let mut grid = IndexMap::new();
        grid.insert(
            "USA".to_string(),
            GridRegionSpec {
                max_solar_penetration_pct: 0.6,
                base_interconnection_cost_usd_per_mw: 120_000.0,
                ..grid_region(500_000.0, 450_000.0)
            },
        );
        grid.insert("China".to_string(), grid_region(1_200_000.0, 1_000_000.0));
        grid.insert(
            "EU_Germany".to_string(),
            GridRegionSpec {
                max_solar_penetration_pct: 0.55,
                base_interconnection_cost_usd_per_mw: 90_000.0,
                ..grid_region(150_000.0, 130_000.0)
            },
        );

        let mut market = IndexMap::new();
        market.insert(
            "USA".to_string(),
            MarketDesign {
                base_energy_price_usd_per_mwh: 40.0,
                ..MarketDesign::default()
            },
        );
        market.insert(
            "China".to_string(),
            MarketDesign {
                market_type: "capacity_market".into(),
                base_energy_price_usd_per_mwh: 35.0,
                ..MarketDesign::default()
            },
        );
        let mut tou = IndexMap::new();
        tou.insert("peak".to_string(), 1.5);
        tou.insert("off_peak".to_string(), 0.8);
        market.insert(
            "EU_Germany".to_string(),
            MarketDesign {
                base_energy_price_usd_per_mwh: 50.0,
                tou_factors: tou,
                ..MarketDesign::default()
            },
        );

        let mut carbon = IndexMap::new();
        carbon.insert("EU_ETS".to_string(), scheme(CarbonSchemeKind::CapAndTrade, 85.0));
        carbon.insert("California_CCA".to_string(), scheme(CarbonSchemeKind::CapAndTrade, 30.0));
        carbon.insert(
            "CBAM_EU".to_string(),
            CarbonScheme {
                reference_carbon_price_per_ton_co2: Some(85.0),
                ..scheme(CarbonSchemeKind::Cbam, 0.0)
            },
        );

        let policies = vec![
            Policy {
                technology_scope: Some(vec![
                    "TOPCon_PV".into(),
                    "AdvancedMonocrystallineSilicon".into(),
                ]),
                description: "Investment tax credit for solar".into(),
                ..policy("US_ITC_SOLAR", PolicyKind::Itc, 0.30, "USA", (2022, 2032))
            },
            Policy {
                applicable_regions: vec!["EU_Germany".into()],
                unit: Some("USD/tCO2".into()),
                ..policy("EU_CARBON_PRICE", PolicyKind::CarbonPrice, 80.0, "EU", (2025, 2035))
            },
            Policy {
                applicable_regions: vec!["EU_Germany".into()],
                description: "Upfront grant for rooftop solar".into(),
                ..policy("GER_SOLAR_GRANT", PolicyKind::GrantCapexPercentage, 0.10, "Germany", (2024, 2028))
            },
        ];

        Self {
            simulation: SimulationConfig::default(),
            technologies,
            costs: CostConfig::default(),
            grid,
            market,
            carbon,
            policies,
            supply_chain: SupplyChainConfig::default(),
            investment: ReferenceProject::default(),
        }
    }

    /// Returns the high-carbon-price preset: stronger carbon schemes whose
    /// credits count toward project revenue, and supply-chain cost pressure.
    pub fn high_carbon_price() -> Self {
        let mut cfg = Self::baseline();
        cfg.carbon.insert("EU_ETS".to_string(), scheme(CarbonSchemeKind::CapAndTrade, 150.0));
        cfg.carbon.insert("California_CCA".to_string(), scheme(CarbonSchemeKind::CapAndTrade, 90.0));
        cfg.carbon.insert("GLOBAL_CARBON_TAX".to_string(), scheme(CarbonSchemeKind::Tax, 120.0));
        cfg.policies.push(policy("US_CARBON_PRICE", PolicyKind::CarbonPrice, 90.0, "USA", (2025, 2040)));
        cfg.policies.push(policy("CN_CARBON_PRICE", PolicyKind::CarbonPrice, 60.0, "China", (2025, 2040)));
        cfg.investment.carbon_scheme = Some("GLOBAL_CARBON_TAX".to_string());
        cfg.costs.apply_supply_chain = true;
        cfg
    }

    /// Returns the tight-grid preset: low solar ceilings that investment
    /// decisions respect, and costlier interconnection.
    pub fn tight_grid() -> Self {
        let mut cfg = Self::baseline();
        for (region, ceiling) in [("USA", 0.0002), ("China", 0.0001), ("EU_Germany", 0.0005)] {
            if let Some(spec) = cfg.grid.get_mut(region) {
                spec.max_solar_penetration_pct = ceiling;
                spec.transmission_constraint_factor = 1.5;
            }
        }
        cfg.investment.respect_penetration_ceiling = true;
        cfg
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "high_carbon_price", "tight_grid"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "high_carbon_price" => Ok(Self::high_carbon_price()),
            "tight_grid" => Ok(Self::tight_grid()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Looks up a technology definition by name.
    pub fn technology(&self, name: &str) -> Option<&TechnologyConfig> {
        self.technologies.iter().find(|t| t.name == name)
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if s.start_year > s.end_year {
            errors.push(ConfigError::new(
                "simulation.start_year",
                "must be <= simulation.end_year",
            ));
        }
        if s.regions.is_empty() {
            errors.push(ConfigError::new("simulation.regions", "must not be empty"));
        }
        if s.technologies.is_empty() {
            errors.push(ConfigError::new("simulation.technologies", "must not be empty"));
        }
        for name in &s.technologies {
            if self.technology(name).is_none() {
                errors.push(ConfigError::new(
                    "simulation.technologies",
                    format!("\"{name}\" is not defined in [[technologies]]"),
                ));
            }
        }

        for (i, t) in self.technologies.iter().enumerate() {
            if t.base_capex_usd_per_kw < 0.0 {
                errors.push(ConfigError::new(
                    format!("technologies[{i}].base_capex_usd_per_kw"),
                    "must be >= 0",
                ));
            }
            if !(0.0..=1.0).contains(&t.annual_capex_reduction_rate) {
                errors.push(ConfigError::new(
                    format!("technologies[{i}].annual_capex_reduction_rate"),
                    "must be in [0.0, 1.0]",
                ));
            }
        }

        let c = &self.costs;
        if !(0.0..1.0).contains(&c.learning_rate) {
            errors.push(ConfigError::new("costs.learning_rate", "must be in [0.0, 1.0)"));
        }
        for (tech, o) in &c.overrides {
            if o.learning_rate.is_some_and(|lr| !(0.0..1.0).contains(&lr)) {
                errors.push(ConfigError::new(
                    format!("costs.overrides.{tech}.learning_rate"),
                    "must be in [0.0, 1.0)",
                ));
            }
        }

        for (region, g) in &self.grid {
            if !(0.0..=1.0).contains(&g.max_solar_penetration_pct) {
                errors.push(ConfigError::new(
                    format!("grid.{region}.max_solar_penetration_pct"),
                    "must be in [0.0, 1.0]",
                ));
            }
        }

        for (region, m) in &self.market {
            for (service, a) in &m.ancillary_services {
                if !(0.0..=1.0).contains(&a.availability_factor) {
                    errors.push(ConfigError::new(
                        format!("market.{region}.ancillary_services.{service}.availability_factor"),
                        "must be in [0.0, 1.0]",
                    ));
                }
            }
        }

        let inv = &self.investment;
        if !(0.0..=1.0).contains(&inv.capacity_factor) {
            errors.push(ConfigError::new("investment.capacity_factor", "must be in [0.0, 1.0]"));
        }
        if inv.lifetime_years == 0 {
            errors.push(ConfigError::new("investment.lifetime_years", "must be > 0"));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn baseline_preset_valid() {
        let cfg = ScenarioConfig::baseline();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "baseline should be valid: {errors:?}");
    }

    #[test]
    fn from_preset_unknown() {
        let err = ScenarioConfig::from_preset("nonexistent");
        assert!(err.is_err());
        let e = err.unwrap_err();
        assert!(e.message.contains("unknown preset"));
        assert!(e.to_string().starts_with("config error: preset:"));
    }

    #[rstest]
    #[case("baseline")]
    #[case("high_carbon_price")]
    #[case("tight_grid")]
    fn all_presets_are_valid(#[case] name: &str) {
        let cfg = ScenarioConfig::from_preset(name);
        assert!(cfg.is_ok(), "preset \"{name}\" should load");
        let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
        assert!(errors.is_empty(), "preset \"{name}\" should be valid: {errors:?}");
    }

    #[test]
    fn presets_differ_from_baseline() {
        let base = ScenarioConfig::baseline();
        let carbon = ScenarioConfig::high_carbon_price();
        let tight = ScenarioConfig::tight_grid();
        assert!(carbon.carbon["EU_ETS"].price_per_ton_co2 > base.carbon["EU_ETS"].price_per_ton_co2);
        assert!(carbon.investment.carbon_scheme.is_some());
        assert!(tight.grid["USA"].max_solar_penetration_pct < base.grid["USA"].max_solar_penetration_pct);
        assert!(tight.investment.respect_penetration_ceiling);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml = r#"
[simulation]
start_year = 2026
"#;
        let cfg = ScenarioConfig::from_toml_str(toml);
        assert!(cfg.is_ok());
        let cfg = cfg.ok();
        assert_eq!(cfg.as_ref().map(|c| c.simulation.start_year), Some(2026));
        assert_eq!(cfg.as_ref().map(|c| c.simulation.end_year), Some(2030));
        assert_eq!(cfg.as_ref().map(|c| c.technologies.len()), Some(3));
        assert_eq!(cfg.as_ref().map(|c| c.investment.capacity_mw), Some(50.0));
    }

    #[test]
    fn full_sections_parse() {
        let toml = r#"
[simulation]
start_year = 2025
end_year = 2027
regions = ["Chile"]
technologies = ["HJT_PV"]

[[technologies]]
name = "HJT_PV"
category = "photovoltaic"
base_efficiency = 0.24
projected_efficiency_2035 = 0.27
start_year = 2023
commercial_scale_year = 2024
base_capex_usd_per_kw = 720.0

[costs]
learning_rate = 0.18
apply_supply_chain = true

[costs.overrides.HJT_PV]
opex_per_kw_year = 12.0

[grid.Chile]
existing_capacity_mw = 35000.0
current_load_mw = 11000.0
max_solar_penetration_pct = 0.4

[grid.Chile.initial_capacity_mw_by_tech]
HJT_PV = 500.0

[market.Chile]
type = "energy_only"
base_energy_price_usd_per_mwh = 60.0

[market.Chile.tou_factors]
mid_peak = 1.1

[market.Chile.ancillary_services.frequency_response]
price_usd_per_mw_year = 5000.0
availability_factor = 0.8

[carbon.CL_TAX]
kind = "tax"
price_per_ton_co2 = 5.0

[[policies]]
id = "CL_GRANT"
type = "grant_capex_percentage"
value = 0.05
region = "Chile"

[[supply_chain.expansions]]
item = "polysilicon"
region = "Chile"
additional = 10000.0
year = 2026

[investment]
capacity_mw = 20.0
ancillary_services = ["frequency_response"]
carbon_scheme = "CL_TAX"
"#;
        let cfg = ScenarioConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.as_ref().err());
        let cfg = cfg.ok();
        let cfg = cfg.as_ref();
        assert_eq!(cfg.map(|c| c.validate().len()), Some(0));
        assert_eq!(
            cfg.and_then(|c| c.technology("HJT_PV")).map(|t| t.annual_capex_reduction_rate),
            Some(0.0)
        );
        assert_eq!(
            cfg.and_then(|c| c.grid.get("Chile")).map(|g| g.initial_capacity_mw_by_tech.len()),
            Some(1)
        );
        assert_eq!(cfg.map(|c| c.supply_chain.expansions.len()), Some(1));
        assert_eq!(cfg.map(|c| c.investment.lifetime_years), Some(25));
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[simulation]
start_year = 2025
bogus_field = true
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.simulation.start_year = 2031;
        cfg.simulation.technologies.push("Perovskite".into());
        cfg.costs.learning_rate = 1.0;
        cfg.investment.lifetime_years = 0;
        cfg.investment.capacity_factor = 1.2;
        if let Some(g) = cfg.grid.get_mut("USA") {
            g.max_solar_penetration_pct = 1.5;
        }
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        for expected in [
            "simulation.start_year",
            "simulation.technologies",
            "costs.learning_rate",
            "investment.lifetime_years",
            "investment.capacity_factor",
            "grid.USA.max_solar_penetration_pct",
        ] {
            assert!(fields.iter().any(|f| f == expected), "missing {expected}: {fields:?}");
        }
    }

    #[rstest]
    #[case(1.5, false)]
    #[case(-0.1, false)]
    #[case(0.0, true)]
    #[case(1.0, true)]
    fn capex_reduction_rate_must_be_a_fraction(#[case] rate: f64, #[case] ok: bool) {
        let mut cfg = ScenarioConfig::baseline();
        cfg.technologies[0].annual_capex_reduction_rate = rate;
        let rejected = cfg
            .validate()
            .iter()
            .any(|e| e.field == "technologies[0].annual_capex_reduction_rate");
        assert_eq!(rejected, !ok, "rate {rate}");
    }

    #[test]
    fn validation_catches_empty_lists() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.simulation.regions.clear();
        cfg.simulation.technologies.clear();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "simulation.regions"));
        assert!(errors.iter().any(|e| e.field == "simulation.technologies"));
    }
}
