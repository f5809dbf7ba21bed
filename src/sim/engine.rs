//! Simulation engine that drives the yearly deployment loop.

use std::fmt;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::cost::CostBook;
use crate::error::EngineError;
use crate::grid::GridLedger;
use crate::investment::{EvaluationContext, InvestmentEvaluator};
use crate::lookup::{PolicyCollaborator, ReportSink, SupplyChainCollaborator, TechnologyLookup};
use crate::market::MarketSimulator;
use crate::supply_chain::ScheduledExpansion;
use crate::tech::{TechnologyCategory, TechnologyEvolutionModel};

use super::types::{PolicySignals, SimulationPeriod, SimulationYearRecord};

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Configured,
    UpdatingModels { year: i32 },
    DecidingInvestments { year: i32 },
    SimulatingDispatch { year: i32 },
    UpdatingState { year: i32 },
    RecordingResults { year: i32 },
    Finalizing,
    Done,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Configured => f.write_str("configured"),
            EngineState::UpdatingModels { year } => write!(f, "updating models ({year})"),
            EngineState::DecidingInvestments { year } => write!(f, "deciding investments ({year})"),
            EngineState::SimulatingDispatch { year } => write!(f, "simulating dispatch ({year})"),
            EngineState::UpdatingState { year } => write!(f, "updating state ({year})"),
            EngineState::RecordingResults { year } => write!(f, "recording results ({year})"),
            EngineState::Finalizing => f.write_str("finalizing"),
            EngineState::Done => f.write_str("done"),
        }
    }
}

/// Assembles a [`SimulationEngine`], checking every required role.
#[derive(Default)]
pub struct SimulationEngineBuilder {
    period: Option<SimulationPeriod>,
    regions: Vec<String>,
    technologies: Vec<String>,
    technology_model: Option<TechnologyEvolutionModel>,
    costs: Option<CostBook>,
    grid: Option<GridLedger>,
    market: Option<MarketSimulator>,
    evaluator: Option<InvestmentEvaluator>,
    policy: Option<Box<dyn PolicyCollaborator>>,
    supply_chain: Option<Box<dyn SupplyChainCollaborator>>,
    expansions: Vec<ScheduledExpansion>,
    report: Option<Box<dyn ReportSink>>,
}

impl SimulationEngineBuilder {
    pub fn new(period: SimulationPeriod) -> Self {
        Self {
            period: Some(period),
            ..Self::default()
        }
    }

    pub fn regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }

    pub fn technologies(mut self, technologies: Vec<String>) -> Self {
        self.technologies = technologies;
        self
    }

    pub fn technology_model(mut self, model: TechnologyEvolutionModel) -> Self {
        self.technology_model = Some(model);
        self
    }

    pub fn costs(mut self, costs: CostBook) -> Self {
        self.costs = Some(costs);
        self
    }

    pub fn grid(mut self, grid: GridLedger) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn market(mut self, market: MarketSimulator) -> Self {
        self.market = Some(market);
        self
    }

    pub fn evaluator(mut self, evaluator: InvestmentEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn policy(mut self, policy: Box<dyn PolicyCollaborator>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn supply_chain(mut self, supply_chain: Box<dyn SupplyChainCollaborator>) -> Self {
        self.supply_chain = Some(supply_chain);
        self
    }

    /// Capacity expansions applied during model updates of their year.
    pub fn expansions(mut self, expansions: Vec<ScheduledExpansion>) -> Self {
        self.expansions = expansions;
        self
    }

    /// Optional sink that receives the records once the run finishes.
    pub fn report_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.report = Some(sink);
        self
    }

    /// Validates the assembly and returns a configured engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingCollaborator`] naming the first absent
    /// role, then checks for empty region or technology lists and an
    /// inverted period.
    pub fn build(self) -> Result<SimulationEngine, EngineError> {
        let period = self.period.ok_or(EngineError::MissingCollaborator("period"))?;
        let technology_model = self
            .technology_model
            .ok_or(EngineError::MissingCollaborator("technology_evolution"))?;
        let mut costs = self.costs.ok_or(EngineError::MissingCollaborator("cost"))?;
        let grid = self.grid.ok_or(EngineError::MissingCollaborator("grid"))?;
        let market = self.market.ok_or(EngineError::MissingCollaborator("market"))?;
        let evaluator = self
            .evaluator
            .ok_or(EngineError::MissingCollaborator("investment_decision"))?;
        let policy = self.policy.ok_or(EngineError::MissingCollaborator("policy"))?;
        let supply_chain = self
            .supply_chain
            .ok_or(EngineError::MissingCollaborator("supply_chain"))?;

        if self.regions.is_empty() {
            return Err(EngineError::NoRegions);
        }
        if self.technologies.is_empty() {
            return Err(EngineError::NoTechnologies);
        }
        if period.is_inverted() {
            return Err(EngineError::InvertedPeriod {
                start: period.start_year,
                end: period.end_year,
            });
        }

        costs.ensure_ledgers(&self.technologies);

        info!(
            start_year = period.start_year,
            end_year = period.end_year,
            regions = self.regions.len(),
            technologies = self.technologies.len(),
            "simulation engine configured"
        );

        Ok(SimulationEngine {
            period,
            regions: self.regions,
            technologies: self.technologies,
            technology_model,
            costs,
            grid,
            market,
            evaluator,
            policy,
            supply_chain,
            expansions: self.expansions,
            report: self.report,
            state: EngineState::Configured,
            built_mw: IndexMap::new(),
        })
    }
}

/// Simulation engine owning every model for the duration of a run.
///
/// Years run strictly in order because each year's learning volume and
/// grid capacity depend on the previous year's investments.
pub struct SimulationEngine {
    period: SimulationPeriod,
    regions: Vec<String>,
    technologies: Vec<String>,
    technology_model: TechnologyEvolutionModel,
    costs: CostBook,
    grid: GridLedger,
    market: MarketSimulator,
    evaluator: InvestmentEvaluator,
    policy: Box<dyn PolicyCollaborator>,
    supply_chain: Box<dyn SupplyChainCollaborator>,
    expansions: Vec<ScheduledExpansion>,
    report: Option<Box<dyn ReportSink>>,
    state: EngineState,
    /// Cumulative MW built during the run, per technology.
    built_mw: IndexMap<String, f64>,
}

impl SimulationEngine {
    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn period(&self) -> SimulationPeriod {
        self.period
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn technologies(&self) -> &[String] {
        &self.technologies
    }

    pub fn grid(&self) -> &GridLedger {
        &self.grid
    }

    pub fn costs(&self) -> &CostBook {
        &self.costs
    }

    /// Cumulative MW built per technology so far.
    pub fn built_mw(&self) -> &IndexMap<String, f64> {
        &self.built_mw
    }

    fn transition(&mut self, next: EngineState) {
        debug!(from = %self.state, to = %next, "engine state change");
        self.state = next;
    }

    /// Runs every year of the period and returns the year records in order.
    ///
    /// The report sink, if any, receives the full sequence once the last
    /// year is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyRun`] on a second call and
    /// [`EngineError::Report`] if the sink fails.
    pub fn run(&mut self) -> Result<Vec<SimulationYearRecord>, EngineError> {
        if self.state != EngineState::Configured {
            return Err(EngineError::AlreadyRun);
        }

        let mut records = Vec::with_capacity(self.period.len());
        for year in self.period.years() {
            info!(year, "simulating year");
            records.push(self.step_year(year));
        }

        self.transition(EngineState::Finalizing);
        if let Some(sink) = self.report.as_mut() {
            sink.consume(&records)?;
        }
        self.transition(EngineState::Done);
        info!(years = records.len(), "simulation complete");
        Ok(records)
    }

    /// Executes one year: update, decide, dispatch, add capacity, record.
    fn step_year(&mut self, year: i32) -> SimulationYearRecord {
        // 1. Update models
        self.transition(EngineState::UpdatingModels { year });
        for exp in self.expansions.iter().filter(|e| e.year == year) {
            self.supply_chain
                .model_capacity_expansion(&exp.item, &exp.region, exp.additional, year);
        }
        self.technology_model.update_for_year(year);
        self.costs
            .update_for_year(year, &self.built_mw, Some(self.supply_chain.as_ref()));
        self.grid.update_for_year(year, &self.regions);
        let capex_usd_per_kw = self.costs.capex_snapshot();

        // 2. Decide investments
        self.transition(EngineState::DecidingInvestments { year });
        let ctx = EvaluationContext {
            technologies: &self.technology_model,
            costs: &self.costs,
            market: &self.market,
            grid: &self.grid,
        };
        let investments =
            self.evaluator
                .decide_investments(&ctx, year, &self.regions, &self.technologies);

        // 3. Dispatch against pre-addition capacity
        self.transition(EngineState::SimulatingDispatch { year });
        let market_outcomes = self.market.simulate_dispatch_for_year(
            year,
            &self.regions,
            &self.grid,
            &self.technology_model,
        );

        // 4. Add new capacity
        self.transition(EngineState::UpdatingState { year });
        self.grid
            .add_new_capacity(year, &investments, &self.technology_model);
        for by_tech in investments.values() {
            for (tech, &mw) in by_tech {
                *self.built_mw.entry(tech.clone()).or_insert(0.0) += mw;
            }
        }

        // 5. Record
        self.transition(EngineState::RecordingResults { year });
        let policy_signals = self.policy_signals(year);
        let record = SimulationYearRecord {
            year,
            investments,
            market_outcomes,
            capex_usd_per_kw,
            policy_signals,
        };
        info!(
            year,
            new_capacity_mw = record.total_new_capacity_mw(),
            dispatched_mwh = record.total_dispatched_mwh(),
            unmet_mwh = record.total_unmet_mwh(),
            "year recorded"
        );
        record
    }

    /// Carbon price and photovoltaic capex factor per region.
    fn policy_signals(&self, year: i32) -> IndexMap<String, PolicySignals> {
        let pv = self
            .technologies
            .iter()
            .find(|t| self.technology_model.category(t) == Some(TechnologyCategory::Photovoltaic))
            .map(String::as_str);
        self.regions
            .iter()
            .map(|region| {
                let signals = PolicySignals {
                    carbon_price_usd_per_ton: self.policy.get_carbon_price(region, year),
                    capex_factor: self.policy.effective_capex_factor(region, year, pv),
                };
                (region.clone(), signals)
            })
            .collect()
    }
}
