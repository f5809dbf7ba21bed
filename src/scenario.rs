//! Builds a simulation engine from a scenario configuration.

use tracing::{info, warn};

use crate::carbon::CarbonSchemes;
use crate::config::{CostConfig, ScenarioConfig};
use crate::cost::{CostBook, CostLedger};
use crate::error::EngineError;
use crate::grid::GridLedger;
use crate::investment::InvestmentEvaluator;
use crate::market::MarketSimulator;
use crate::policy::PolicyBook;
use crate::sim::engine::{SimulationEngine, SimulationEngineBuilder};
use crate::sim::types::SimulationPeriod;
use crate::supply_chain::SupplyChainModel;
use crate::tech::TechnologyEvolutionModel;

/// Builds the technology registry from `[[technologies]]`.
pub fn technology_model(cfg: &ScenarioConfig) -> TechnologyEvolutionModel {
    let mut model = TechnologyEvolutionModel::new();
    for t in &cfg.technologies {
        model.add_technology(t.to_technology());
    }
    model
}

/// Builds the cost book: the reference ledger plus one ledger per override.
pub fn cost_book(costs: &CostConfig) -> CostBook {
    let reference = CostLedger::new(
        costs.reference_technology.clone(),
        costs.components,
        costs.opex_per_kw_year,
        costs.learning_rate,
        costs.initial_production_volume_gw,
    );
    let mut book = CostBook::new(reference)
        .with_supply_chain(costs.apply_supply_chain, costs.supply_chain_watch.clone());
    for (tech, o) in &costs.overrides {
        book.add_ledger(CostLedger::new(
            tech.clone(),
            o.components.unwrap_or(costs.components),
            o.opex_per_kw_year.unwrap_or(costs.opex_per_kw_year),
            o.learning_rate.unwrap_or(costs.learning_rate),
            o.initial_production_volume_gw
                .unwrap_or(costs.initial_production_volume_gw),
        ));
    }
    book
}

/// Builds the supply-chain model, optionally seeded with the default dataset.
pub fn supply_chain_model(cfg: &ScenarioConfig) -> SupplyChainModel {
    let sc = &cfg.supply_chain;
    let mut model = if sc.use_default_data {
        SupplyChainModel::with_default_data()
    } else {
        SupplyChainModel::default()
    };
    for (name, item) in &sc.items {
        model.add_supply_item(name.clone(), item.clone());
    }
    model
}

/// Assembles every collaborator into an engine builder.
///
/// Returned unbuilt so callers can attach a report sink.
pub fn engine_builder(cfg: &ScenarioConfig) -> SimulationEngineBuilder {
    let s = &cfg.simulation;
    let technologies = technology_model(cfg);
    let grid = GridLedger::from_specs(&cfg.grid, &technologies, s.start_year);

    for region in &s.regions {
        if grid.region(region).is_none() {
            warn!(region = %region, "region has no grid data; dispatch will be empty");
        }
    }

    let evaluator = InvestmentEvaluator::new(
        Box::new(CarbonSchemes::new(cfg.carbon.clone())),
        cfg.investment.clone(),
    );

    info!(
        regions = s.regions.len(),
        technologies = s.technologies.len(),
        policies = cfg.policies.len(),
        "scenario assembled"
    );

    SimulationEngineBuilder::new(SimulationPeriod::new(s.start_year, s.end_year))
        .regions(s.regions.clone())
        .technologies(s.technologies.clone())
        .technology_model(technologies)
        .costs(cost_book(&cfg.costs))
        .grid(grid)
        .market(MarketSimulator::new(cfg.market.clone()))
        .evaluator(evaluator)
        .policy(Box::new(PolicyBook::new(cfg.policies.clone())))
        .supply_chain(Box::new(supply_chain_model(cfg)))
        .expansions(cfg.supply_chain.expansions.clone())
}

/// Builds a ready-to-run engine.
///
/// # Errors
///
/// Propagates [`EngineError`] from engine construction.
pub fn build_engine(cfg: &ScenarioConfig) -> Result<SimulationEngine, EngineError> {
    engine_builder(cfg).build()
}
