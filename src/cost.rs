//! Capital and operating cost ledgers, learning curves, and LCOE.
//!
//! A [`CostLedger`] tracks the four capital-cost components of one
//! technology. Total capex is never stored; it is always the component sum.
//! [`CostBook`] collects one ledger per simulated technology and serves
//! evolving LCOE queries for the investment evaluator.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ModelError;
use crate::lookup::{CostLookup, SupplyChainCollaborator, TechnologyLookup};
use crate::supply_chain::{CapacityUnit, ConcentrationLevel, MaterialAvailability};

/// Hours in a non-leap year.
pub const HOURS_PER_YEAR: f64 = 8760.0;

const MATERIAL_SHORTFALL_LOW_IMPACT: f64 = 0.02;
const MATERIAL_SHORTFALL_MEDIUM_IMPACT: f64 = 0.07;
const MATERIAL_SHORTFALL_HIGH_IMPACT: f64 = 0.15;
const MATERIAL_TIGHT_SURPLUS_IMPACT: f64 = 0.01;
const CONCENTRATION_MODERATE_IMPACT: f64 = 0.02;
const CONCENTRATION_HIGH_IMPACT: f64 = 0.07;
/// Surplus below this share of global capacity counts as tight.
const TIGHT_SURPLUS_SHARE: f64 = 0.10;

/// One of the four capital-cost components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostComponent {
    Module,
    BalanceOfSystem,
    Inverter,
    Installation,
}

/// Capital-cost breakdown in USD/kW.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapexComponents {
    pub module_usd_per_kw: f64,
    pub bos_usd_per_kw: f64,
    pub inverter_usd_per_kw: f64,
    pub installation_usd_per_kw: f64,
}

impl CapexComponents {
    pub fn total(&self) -> f64 {
        self.module_usd_per_kw
            + self.bos_usd_per_kw
            + self.inverter_usd_per_kw
            + self.installation_usd_per_kw
    }

    fn get_mut(&mut self, component: CostComponent) -> &mut f64 {
        match component {
            CostComponent::Module => &mut self.module_usd_per_kw,
            CostComponent::BalanceOfSystem => &mut self.bos_usd_per_kw,
            CostComponent::Inverter => &mut self.inverter_usd_per_kw,
            CostComponent::Installation => &mut self.installation_usd_per_kw,
        }
    }

    fn scaled(&self, factor: f64) -> Self {
        Self {
            module_usd_per_kw: self.module_usd_per_kw * factor,
            bos_usd_per_kw: self.bos_usd_per_kw * factor,
            inverter_usd_per_kw: self.inverter_usd_per_kw * factor,
            installation_usd_per_kw: self.installation_usd_per_kw * factor,
        }
    }
}

impl Default for CapexComponents {
    fn default() -> Self {
        Self {
            module_usd_per_kw: 300.0,
            bos_usd_per_kw: 400.0,
            inverter_usd_per_kw: 100.0,
            installation_usd_per_kw: 200.0,
        }
    }
}

/// Supply-chain items consulted when adjusting module cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupplyChainWatch {
    /// Reference material checked for shortfall (default `polysilicon`).
    pub material_item: String,
    /// Reference component checked for market concentration (default `solar_modules`).
    pub module_item: String,
    /// Assumed requirement as a share of global material capacity (default 0.5).
    pub required_fraction_of_global: f64,
}

impl Default for SupplyChainWatch {
    fn default() -> Self {
        Self {
            material_item: "polysilicon".to_string(),
            module_item: "solar_modules".to_string(),
            required_fraction_of_global: 0.5,
        }
    }
}

/// Surcharges applied by one supply-chain adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SupplyChainAdjustment {
    pub material_pct: f64,
    pub concentration_pct: f64,
}

impl SupplyChainAdjustment {
    pub fn total(&self) -> f64 {
        self.material_pct + self.concentration_pct
    }
}

/// LCOE breakdown for one technology.
///
/// When `error` is set, `lcoe_usd_per_mwh` is `+inf` and callers should
/// treat the other fields as partial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LcoeResult {
    pub technology: String,
    pub year: Option<i32>,
    pub lcoe_usd_per_mwh: f64,
    pub capex_usd_per_kw: Option<f64>,
    pub opex_per_kw_year: Option<f64>,
    pub efficiency: Option<f64>,
    pub annual_generation_mwh_per_kw: f64,
    pub crf: f64,
    pub annualized_capex_per_kw: f64,
    pub is_commercially_available: Option<bool>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ModelError>,
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<ModelError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl LcoeResult {
    fn failed(technology: &str, year: Option<i32>, error: ModelError) -> Self {
        Self {
            technology: technology.to_string(),
            year,
            lcoe_usd_per_mwh: f64::INFINITY,
            capex_usd_per_kw: None,
            opex_per_kw_year: None,
            efficiency: None,
            annual_generation_mwh_per_kw: 0.0,
            crf: 0.0,
            annualized_capex_per_kw: 0.0,
            is_commercially_available: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Inputs to the shared levelized-cost routine.
#[derive(Debug, Clone, Copy)]
pub struct LevelizedInputs {
    pub capex_usd_per_kw: f64,
    pub opex_per_kw_year: f64,
    pub fuel_cost_per_mwh: f64,
    pub capacity_factor: f64,
    pub discount_rate: f64,
    pub lifetime_years: u32,
}

/// Output of [`levelized_cost`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelizedCost {
    pub lcoe_usd_per_mwh: f64,
    pub crf: f64,
    pub annualized_capex_per_kw: f64,
    pub annual_generation_mwh_per_kw: f64,
}

/// Capital recovery factor for discount rate `r` over `n` years.
///
/// Returns `None` when the factor is undefined (zero lifetime, a zero
/// denominator, or overflow).
pub fn capital_recovery_factor(discount_rate: f64, lifetime_years: u32) -> Option<f64> {
    if lifetime_years == 0 {
        return None;
    }
    if discount_rate == 0.0 {
        return Some(1.0 / f64::from(lifetime_years));
    }
    let growth = (1.0 + discount_rate).powf(f64::from(lifetime_years));
    let denominator = growth - 1.0;
    if denominator == 0.0 {
        return None;
    }
    let crf = discount_rate * growth / denominator;
    crf.is_finite().then_some(crf)
}

/// Computes LCOE in USD/MWh from per-kW costs.
///
/// Annual generation is `8760 × capacity_factor / 1000` MWh per kW. With no
/// costs and no generation the LCOE is 0, not infinite. `year` only labels
/// errors and is `None` for the flat LCOE.
///
/// # Errors
///
/// - [`ModelError::ZeroLifetime`] for a zero lifetime with positive capex.
/// - [`ModelError::DegenerateCrf`] when the recovery factor is undefined and
///   capex is positive.
/// - [`ModelError::ZeroGeneration`] when costs are positive but generation is zero.
pub fn levelized_cost(
    technology: &str,
    year: Option<i32>,
    inputs: &LevelizedInputs,
) -> Result<LevelizedCost, ModelError> {
    let capex = inputs.capex_usd_per_kw;
    let crf = match capital_recovery_factor(inputs.discount_rate, inputs.lifetime_years) {
        Some(crf) => crf,
        None if capex <= 0.0 => 0.0,
        None if inputs.lifetime_years == 0 => {
            return Err(ModelError::ZeroLifetime {
                technology: technology.to_string(),
                year,
                lifetime: inputs.lifetime_years,
            });
        }
        None => {
            return Err(ModelError::DegenerateCrf {
                technology: technology.to_string(),
                year,
                discount_rate: inputs.discount_rate,
                lifetime: inputs.lifetime_years,
            });
        }
    };

    let annualized_capex = capex * crf;
    let generation = HOURS_PER_YEAR * inputs.capacity_factor / 1000.0;

    let lcoe = if generation == 0.0 {
        if annualized_capex + inputs.opex_per_kw_year > 0.0 {
            return Err(ModelError::ZeroGeneration {
                technology: technology.to_string(),
                year,
            });
        }
        0.0
    } else {
        (annualized_capex + inputs.opex_per_kw_year + inputs.fuel_cost_per_mwh * generation)
            / generation
    };

    Ok(LevelizedCost {
        lcoe_usd_per_mwh: lcoe,
        crf,
        annualized_capex_per_kw: annualized_capex,
        annual_generation_mwh_per_kw: generation,
    })
}

/// Cost state for one technology.
#[derive(Debug, Clone)]
pub struct CostLedger {
    technology: String,
    components: CapexComponents,
    opex_per_kw_year: f64,
    learning_rate: f64,
    current_production_volume: f64,
    initial_production_volume: f64,
    initial_components: CapexComponents,
}

impl CostLedger {
    /// Creates a ledger.
    ///
    /// # Arguments
    ///
    /// * `learning_rate` - Fractional cost reduction per doubling of volume.
    /// * `initial_production_volume` - Cumulative volume at which
    ///   `components` were observed (GW in the simulation loop).
    pub fn new(
        technology: impl Into<String>,
        components: CapexComponents,
        opex_per_kw_year: f64,
        learning_rate: f64,
        initial_production_volume: f64,
    ) -> Self {
        let technology = technology.into();
        info!(
            technology = %technology,
            capex_usd_per_kw = components.total(),
            learning_rate,
            "cost ledger initialized"
        );
        Self {
            technology,
            components,
            opex_per_kw_year,
            learning_rate,
            current_production_volume: initial_production_volume,
            initial_production_volume,
            initial_components: components,
        }
    }

    /// Returns a copy of this ledger for another technology, reset to its
    /// initial snapshot.
    pub fn clone_for(&self, technology: impl Into<String>) -> Self {
        Self {
            technology: technology.into(),
            components: self.initial_components,
            current_production_volume: self.initial_production_volume,
            ..self.clone()
        }
    }

    pub fn technology(&self) -> &str {
        &self.technology
    }

    pub fn components(&self) -> &CapexComponents {
        &self.components
    }

    /// Total capex in USD/kW, the sum of the four components.
    pub fn capex_per_kw(&self) -> f64 {
        self.components.total()
    }

    pub fn opex_per_kw_year(&self) -> f64 {
        self.opex_per_kw_year
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn current_production_volume(&self) -> f64 {
        self.current_production_volume
    }

    pub fn initial_production_volume(&self) -> f64 {
        self.initial_production_volume
    }

    pub fn update_cost_component(&mut self, component: CostComponent, value: f64) {
        *self.components.get_mut(component) = value;
        debug!(
            technology = %self.technology,
            ?component,
            value,
            capex_usd_per_kw = self.capex_per_kw(),
            "cost component updated"
        );
    }

    pub fn update_opex_cost(&mut self, opex_per_kw_year: f64) {
        self.opex_per_kw_year = opex_per_kw_year;
    }

    /// Rescales every component from the initial snapshot for a new
    /// cumulative production volume.
    ///
    /// Each component becomes `initial × (volume / initial_volume)^b` with
    /// `b = ln(1 − learning_rate) / ln 2`. Volumes not strictly above the
    /// current one leave the ledger unchanged.
    ///
    /// Returns `true` if the costs changed.
    pub fn apply_learning_curve(&mut self, cumulative_production_volume: f64) -> bool {
        if cumulative_production_volume <= self.current_production_volume {
            warn!(
                technology = %self.technology,
                new = cumulative_production_volume,
                current = self.current_production_volume,
                "cumulative production not above current; no learning applied"
            );
            return false;
        }
        self.learn(cumulative_production_volume)
    }

    fn learn(&mut self, cumulative_production_volume: f64) -> bool {
        if self.initial_production_volume <= 0.0 {
            warn!(
                technology = %self.technology,
                "initial production volume is not positive; no learning applied"
            );
            return false;
        }
        let exponent = (1.0 - self.learning_rate).ln() / 2f64.ln();
        let factor = (cumulative_production_volume / self.initial_production_volume).powf(exponent);
        self.components = self.initial_components.scaled(factor);
        self.current_production_volume = cumulative_production_volume;
        info!(
            technology = %self.technology,
            volume = cumulative_production_volume,
            capex_usd_per_kw = self.capex_per_kw(),
            "learning curve applied"
        );
        true
    }

    /// LCOE from the ledger's own capex.
    ///
    /// `opex_override` replaces the ledger's operating cost when given.
    pub fn calculate_lcoe(
        &self,
        capacity_factor: f64,
        discount_rate: f64,
        lifetime_years: u32,
        opex_override: Option<f64>,
        fuel_cost_per_mwh: f64,
    ) -> LcoeResult {
        let opex = opex_override.unwrap_or(self.opex_per_kw_year);
        let capex = self.capex_per_kw();
        let inputs = LevelizedInputs {
            capex_usd_per_kw: capex,
            opex_per_kw_year: opex,
            fuel_cost_per_mwh,
            capacity_factor,
            discount_rate,
            lifetime_years,
        };
        match levelized_cost(&self.technology, None, &inputs) {
            Ok(cost) => LcoeResult {
                technology: self.technology.clone(),
                year: None,
                lcoe_usd_per_mwh: cost.lcoe_usd_per_mwh,
                capex_usd_per_kw: Some(capex),
                opex_per_kw_year: Some(opex),
                efficiency: None,
                annual_generation_mwh_per_kw: cost.annual_generation_mwh_per_kw,
                crf: cost.crf,
                annualized_capex_per_kw: cost.annualized_capex_per_kw,
                is_commercially_available: None,
                error: None,
            },
            Err(e) => {
                warn!(technology = %self.technology, error = %e, "LCOE undefined");
                LcoeResult {
                    capex_usd_per_kw: Some(capex),
                    opex_per_kw_year: Some(opex),
                    ..LcoeResult::failed(&self.technology, None, e)
                }
            }
        }
    }

    /// LCOE using capex and efficiency evolved by the technology registry.
    ///
    /// Operating cost still comes from this ledger. Technologies that are
    /// not yet commercially available are priced anyway, with a warning.
    pub fn calculate_lcoe_for_evolving_tech(
        &self,
        technologies: &dyn TechnologyLookup,
        technology: &str,
        year: i32,
        capacity_factor: f64,
        discount_rate: f64,
        lifetime_years: u32,
    ) -> LcoeResult {
        let params = match technologies.technology_params(technology, year) {
            Ok(p) => p,
            Err(e) => {
                warn!(technology, year, error = %e, "cannot fetch technology parameters");
                return LcoeResult::failed(technology, Some(year), e);
            }
        };

        if !params.is_commercially_available {
            warn!(
                technology,
                year,
                commercial_scale_year = params.commercial_scale_year,
                "technology not commercially available; LCOE is speculative"
            );
        }

        let inputs = LevelizedInputs {
            capex_usd_per_kw: params.capex_usd_per_kw,
            opex_per_kw_year: self.opex_per_kw_year,
            fuel_cost_per_mwh: 0.0,
            capacity_factor,
            discount_rate,
            lifetime_years,
        };

        let base = LcoeResult {
            technology: technology.to_string(),
            year: Some(year),
            lcoe_usd_per_mwh: f64::INFINITY,
            capex_usd_per_kw: Some(params.capex_usd_per_kw),
            opex_per_kw_year: Some(self.opex_per_kw_year),
            efficiency: Some(params.efficiency),
            annual_generation_mwh_per_kw: 0.0,
            crf: 0.0,
            annualized_capex_per_kw: 0.0,
            is_commercially_available: Some(params.is_commercially_available),
            error: None,
        };

        match levelized_cost(technology, Some(year), &inputs) {
            Ok(cost) => {
                debug!(
                    technology,
                    year,
                    lcoe_usd_per_mwh = cost.lcoe_usd_per_mwh,
                    capex_usd_per_kw = params.capex_usd_per_kw,
                    efficiency = params.efficiency,
                    "evolving LCOE"
                );
                LcoeResult {
                    lcoe_usd_per_mwh: cost.lcoe_usd_per_mwh,
                    annual_generation_mwh_per_kw: cost.annual_generation_mwh_per_kw,
                    crf: cost.crf,
                    annualized_capex_per_kw: cost.annualized_capex_per_kw,
                    ..base
                }
            }
            Err(e) => {
                warn!(technology, year, error = %e, "LCOE undefined");
                LcoeResult {
                    error: Some(e),
                    ..base
                }
            }
        }
    }

    /// Applies a multiplicative surcharge to the module component based on
    /// material shortfall and supplier concentration.
    ///
    /// Without a collaborator nothing changes. The returned adjustment is
    /// what was applied.
    pub fn adjust_costs_based_on_supply_chain(
        &mut self,
        supply_chain: Option<&dyn SupplyChainCollaborator>,
        watch: &SupplyChainWatch,
    ) -> SupplyChainAdjustment {
        let Some(supply_chain) = supply_chain else {
            debug!(technology = %self.technology, "no supply-chain model; no adjustment");
            return SupplyChainAdjustment::default();
        };

        let mut adjustment = SupplyChainAdjustment::default();

        match supply_chain.global_capacity(&watch.material_item) {
            Some(global) if global > 0.0 => {
                let required = global * watch.required_fraction_of_global;
                adjustment.material_pct =
                    match supply_chain.get_material_availability(&watch.material_item, required) {
                        MaterialAvailability::Shortfall { shortfall } => {
                            let pct = if required > 0.0 {
                                shortfall / required
                            } else {
                                1.0
                            };
                            if pct > 0.5 {
                                MATERIAL_SHORTFALL_HIGH_IMPACT
                            } else if pct > 0.2 {
                                MATERIAL_SHORTFALL_MEDIUM_IMPACT
                            } else {
                                MATERIAL_SHORTFALL_LOW_IMPACT
                            }
                        }
                        MaterialAvailability::Available { surplus }
                            if surplus / global < TIGHT_SURPLUS_SHARE =>
                        {
                            MATERIAL_TIGHT_SURPLUS_IMPACT
                        }
                        MaterialAvailability::Available { .. } => 0.0,
                    };
            }
            _ => warn!(
                material = %watch.material_item,
                "global capacity missing or zero; material risk not assessed"
            ),
        }

        match supply_chain.get_concentration_risk(&watch.module_item, CapacityUnit::GwPerYear) {
            Ok(risk) => {
                adjustment.concentration_pct = match risk.level {
                    ConcentrationLevel::High => CONCENTRATION_HIGH_IMPACT,
                    ConcentrationLevel::Moderate => CONCENTRATION_MODERATE_IMPACT,
                    _ => 0.0,
                };
            }
            Err(e) => warn!(
                item = %watch.module_item,
                error = %e,
                "concentration risk not assessed"
            ),
        }

        let total = adjustment.total();
        if total > 0.0 {
            let before = self.components.module_usd_per_kw;
            self.update_cost_component(CostComponent::Module, before * (1.0 + total));
            info!(
                technology = %self.technology,
                material_pct = adjustment.material_pct,
                concentration_pct = adjustment.concentration_pct,
                from = before,
                to = self.components.module_usd_per_kw,
                "supply-chain adjustment applied"
            );
        }
        adjustment
    }

    /// Yearly update: learning on a strictly larger volume, then the
    /// supply-chain adjustment when a collaborator is given.
    pub fn update_for_year(
        &mut self,
        year: i32,
        cumulative_production_volume: Option<f64>,
        supply_chain: Option<&dyn SupplyChainCollaborator>,
        watch: &SupplyChainWatch,
    ) {
        match cumulative_production_volume {
            Some(v) if v > self.current_production_volume => {
                self.learn(v);
            }
            _ => debug!(
                technology = %self.technology,
                year,
                current = self.current_production_volume,
                "no new production volume"
            ),
        }
        if supply_chain.is_some() {
            self.adjust_costs_based_on_supply_chain(supply_chain, watch);
        }
    }
}

/// One cost ledger per technology, falling back to a reference ledger.
#[derive(Debug, Clone)]
pub struct CostBook {
    reference: CostLedger,
    ledgers: IndexMap<String, CostLedger>,
    apply_supply_chain: bool,
    watch: SupplyChainWatch,
}

impl CostBook {
    pub fn new(reference: CostLedger) -> Self {
        Self {
            reference,
            ledgers: IndexMap::new(),
            apply_supply_chain: false,
            watch: SupplyChainWatch::default(),
        }
    }

    pub fn with_supply_chain(mut self, enabled: bool, watch: SupplyChainWatch) -> Self {
        self.apply_supply_chain = enabled;
        self.watch = watch;
        self
    }

    /// Registers a technology-specific ledger.
    pub fn add_ledger(&mut self, ledger: CostLedger) {
        self.ledgers.insert(ledger.technology().to_string(), ledger);
    }

    /// Gives every listed technology its own ledger, cloning the reference
    /// ledger for those without one.
    pub fn ensure_ledgers(&mut self, technologies: &[String]) {
        for tech in technologies {
            if !self.ledgers.contains_key(tech) {
                let ledger = self.reference.clone_for(tech.as_str());
                self.ledgers.insert(tech.clone(), ledger);
            }
        }
    }

    /// The ledger for `technology`, or the reference ledger.
    pub fn ledger(&self, technology: &str) -> &CostLedger {
        self.ledgers.get(technology).unwrap_or(&self.reference)
    }

    pub fn ledger_mut(&mut self, technology: &str) -> Option<&mut CostLedger> {
        self.ledgers.get_mut(technology)
    }

    pub fn reference(&self) -> &CostLedger {
        &self.reference
    }

    /// Advances every technology ledger by one year.
    ///
    /// `built_mw` is cumulative capacity built during the run per technology.
    /// A ledger's learning volume is its initial volume plus that figure in GW.
    pub fn update_for_year(
        &mut self,
        year: i32,
        built_mw: &IndexMap<String, f64>,
        supply_chain: Option<&dyn SupplyChainCollaborator>,
    ) {
        let supply_chain = if self.apply_supply_chain {
            supply_chain
        } else {
            None
        };
        for (tech, ledger) in &mut self.ledgers {
            let built_gw = built_mw.get(tech).copied().unwrap_or(0.0) / 1000.0;
            let volume = ledger.initial_production_volume() + built_gw;
            ledger.update_for_year(year, Some(volume), supply_chain, &self.watch);
        }
    }

    /// Current capex per technology ledger.
    pub fn capex_snapshot(&self) -> IndexMap<String, f64> {
        self.ledgers
            .iter()
            .map(|(tech, ledger)| (tech.clone(), ledger.capex_per_kw()))
            .collect()
    }
}

impl CostLookup for CostBook {
    fn evolving_lcoe(
        &self,
        technologies: &dyn TechnologyLookup,
        technology: &str,
        year: i32,
        capacity_factor: f64,
        discount_rate: f64,
        lifetime_years: u32,
    ) -> LcoeResult {
        self.ledger(technology).calculate_lcoe_for_evolving_tech(
            technologies,
            technology,
            year,
            capacity_factor,
            discount_rate,
            lifetime_years,
        )
    }
}
