//! Project appraisal and the yearly greedy investment decision.
//!
//! A project is scored from its evolving LCOE against the regional energy
//! price, plus optional ancillary and carbon-credit revenue. The decision
//! rule builds one reference-sized project per (region, technology) pair
//! whenever its NPV is positive. There is no budget, no build-rate limit,
//! and no competition between technologies.

use std::fmt;

use indexmap::IndexMap;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cost::{HOURS_PER_YEAR, LcoeResult};
use crate::error::ModelError;
use crate::lookup::{CarbonPricing, CostLookup, GridLookup, MarketLookup, TechnologyLookup};
use crate::sim::types::InvestmentPlan;
use crate::tech::TechnologyCategory;

/// Emissions avoided per MWh of generation, in t CO2.
pub const TONS_CO2_AVOIDED_PER_MWH: f64 = 0.5;

/// Standard project evaluated for every (region, technology) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReferenceProject {
    /// Default 50 MW.
    pub capacity_mw: f64,
    /// Default 0.20.
    pub capacity_factor: f64,
    /// Default 0.05.
    pub discount_rate: f64,
    /// Default 25 years.
    pub lifetime_years: u32,
    /// Default `mid_peak`.
    pub time_of_day: String,
    pub ancillary_services: Vec<String>,
    pub carbon_scheme: Option<String>,
    /// Skip photovoltaic builds that would breach the grid's solar ceiling.
    pub respect_penetration_ceiling: bool,
}

impl Default for ReferenceProject {
    fn default() -> Self {
        Self {
            capacity_mw: 50.0,
            capacity_factor: 0.20,
            discount_rate: 0.05,
            lifetime_years: 25,
            time_of_day: "mid_peak".to_string(),
            ancillary_services: Vec::new(),
            carbon_scheme: None,
            respect_penetration_ceiling: false,
        }
    }
}

/// Inputs describing one candidate project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRequest {
    pub technology: String,
    pub year: i32,
    pub region: String,
    pub capacity_mw: f64,
    pub capacity_factor: f64,
    pub discount_rate: f64,
    pub lifetime_years: u32,
    pub time_of_day: String,
    pub ancillary_services: Vec<String>,
    pub carbon_scheme: Option<String>,
}

impl ProjectRequest {
    /// The reference project for a technology in a region and year.
    pub fn reference(project: &ReferenceProject, technology: &str, year: i32, region: &str) -> Self {
        Self {
            technology: technology.to_string(),
            year,
            region: region.to_string(),
            capacity_mw: project.capacity_mw,
            capacity_factor: project.capacity_factor,
            discount_rate: project.discount_rate,
            lifetime_years: project.lifetime_years,
            time_of_day: project.time_of_day.clone(),
            ancillary_services: project.ancillary_services.clone(),
            carbon_scheme: project.carbon_scheme.clone(),
        }
    }
}

/// Why a payback period could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaybackUnavailable {
    ZeroInvestment,
    NonPositiveCashFlow,
}

/// Simple payback period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payback {
    Years(f64),
    NotApplicable(PaybackUnavailable),
}

impl fmt::Display for Payback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payback::Years(y) => write!(f, "{y:.2} years"),
            Payback::NotApplicable(PaybackUnavailable::ZeroInvestment) => {
                f.write_str("N/A (initial investment is zero)")
            }
            Payback::NotApplicable(PaybackUnavailable::NonPositiveCashFlow) => {
                f.write_str("N/A (negative or zero cash flow)")
            }
        }
    }
}

/// Simple payback, checked in order: an empty project pays back
/// immediately, then zero investment, then non-positive cash flow.
pub fn simple_payback(capacity_mw: f64, initial_investment: f64, annual_cash_flow: f64) -> Payback {
    if capacity_mw == 0.0 && initial_investment == 0.0 {
        Payback::Years(0.0)
    } else if initial_investment == 0.0 {
        Payback::NotApplicable(PaybackUnavailable::ZeroInvestment)
    } else if annual_cash_flow <= 0.0 {
        Payback::NotApplicable(PaybackUnavailable::NonPositiveCashFlow)
    } else {
        Payback::Years(initial_investment / annual_cash_flow)
    }
}

/// Net present value of a constant annual cash flow.
///
/// `−investment + Σ_{t=1..n} cash_flow / (1 + r)^t`. With a zero lifetime
/// the NPV is 0 if both investment and cash flow are zero, otherwise
/// `−investment`.
pub fn npv(initial_investment: f64, annual_cash_flow: f64, discount_rate: f64, lifetime_years: u32) -> f64 {
    if lifetime_years == 0 {
        return if initial_investment == 0.0 && annual_cash_flow == 0.0 {
            0.0
        } else {
            -initial_investment
        };
    }
    let mut value = -initial_investment;
    let mut discount = 1.0;
    for _ in 0..lifetime_years {
        discount *= 1.0 + discount_rate;
        value += annual_cash_flow / discount;
    }
    value
}

/// Financial metrics of an evaluated project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectFinancials {
    pub market_price_usd_per_mwh: f64,
    pub profit_margin_usd_per_mwh: f64,
    pub annual_generation_mwh: f64,
    pub projected_annual_profit_usd: f64,
    pub ancillary_revenue_usd_per_year: f64,
    pub carbon_credit_revenue_usd_per_year: f64,
    pub initial_investment_usd: f64,
    pub annual_net_cash_flow_usd: f64,
    pub simple_payback: Payback,
    pub npv_usd: f64,
    /// Profit margin per MWh.
    pub attractiveness_score: f64,
}

/// Evaluation of one project: the request, its LCOE, and either the
/// financial metrics or the reason they could not be computed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectEvaluation {
    pub request: ProjectRequest,
    pub lcoe: LcoeResult,
    pub outcome: Result<ProjectFinancials, ModelError>,
}

/// Lookups a project evaluation reads.
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub technologies: &'a dyn TechnologyLookup,
    pub costs: &'a dyn CostLookup,
    pub market: &'a dyn MarketLookup,
    pub grid: &'a dyn GridLookup,
}

/// Scores projects and decides yearly capacity additions.
pub struct InvestmentEvaluator {
    carbon: Box<dyn CarbonPricing>,
    reference: ReferenceProject,
}

impl fmt::Debug for InvestmentEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvestmentEvaluator")
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

impl InvestmentEvaluator {
    pub fn new(carbon: Box<dyn CarbonPricing>, reference: ReferenceProject) -> Self {
        Self { carbon, reference }
    }

    pub fn reference_project(&self) -> &ReferenceProject {
        &self.reference
    }

    /// Appraises one project.
    ///
    /// An LCOE error ends the evaluation early with that error as the
    /// outcome. A non-finite NPV is reported as [`ModelError::NonFinite`].
    pub fn evaluate_project_attractiveness(
        &self,
        ctx: &EvaluationContext<'_>,
        request: &ProjectRequest,
    ) -> ProjectEvaluation {
        let lcoe = ctx.costs.evolving_lcoe(
            ctx.technologies,
            &request.technology,
            request.year,
            request.capacity_factor,
            request.discount_rate,
            request.lifetime_years,
        );
        if let Some(e) = lcoe.error.clone() {
            return ProjectEvaluation {
                request: request.clone(),
                lcoe,
                outcome: Err(e),
            };
        }
        let outcome = self.financials(ctx, request, &lcoe);
        ProjectEvaluation {
            request: request.clone(),
            lcoe,
            outcome,
        }
    }

    fn financials(
        &self,
        ctx: &EvaluationContext<'_>,
        request: &ProjectRequest,
        lcoe: &LcoeResult,
    ) -> Result<ProjectFinancials, ModelError> {
        let region = request.region.as_str();
        let market_price = ctx.market.energy_price(region, &request.time_of_day);
        let margin = market_price - lcoe.lcoe_usd_per_mwh;
        let generation = request.capacity_mw * request.capacity_factor * HOURS_PER_YEAR;
        let energy_profit = margin * generation;

        let ancillary: f64 = if request.capacity_mw > 0.0 {
            request
                .ancillary_services
                .iter()
                .map(|s| ctx.market.ancillary_revenue(request.capacity_mw, s, region))
                .sum()
        } else {
            0.0
        };

        let carbon = match &request.carbon_scheme {
            Some(scheme) if request.capacity_mw > 0.0 && request.capacity_factor > 0.0 => {
                let avoided_tons = generation * TONS_CO2_AVOIDED_PER_MWH;
                self.carbon.get_carbon_cost(avoided_tons, scheme)
            }
            _ => 0.0,
        };

        let investment = lcoe.capex_usd_per_kw.unwrap_or(0.0) * request.capacity_mw * 1000.0;
        let cash_flow = energy_profit + ancillary + carbon;
        let payback = simple_payback(request.capacity_mw, investment, cash_flow);
        let npv_usd = npv(investment, cash_flow, request.discount_rate, request.lifetime_years);

        if !npv_usd.is_finite() {
            return Err(ModelError::NonFinite {
                metric: "NPV",
                technology: request.technology.clone(),
                region: request.region.clone(),
                year: request.year,
            });
        }

        debug!(
            technology = %request.technology,
            region,
            year = request.year,
            lcoe = lcoe.lcoe_usd_per_mwh,
            market_price,
            npv_usd,
            payback = %payback,
            "project evaluated"
        );

        Ok(ProjectFinancials {
            market_price_usd_per_mwh: market_price,
            profit_margin_usd_per_mwh: margin,
            annual_generation_mwh: generation,
            projected_annual_profit_usd: energy_profit,
            ancillary_revenue_usd_per_year: ancillary,
            carbon_credit_revenue_usd_per_year: carbon,
            initial_investment_usd: investment,
            annual_net_cash_flow_usd: cash_flow,
            simple_payback: payback,
            npv_usd,
            attractiveness_score: margin,
        })
    }

    /// Decides new capacity for every (region, technology) pair in `year`.
    ///
    /// Every region gets an entry in the plan, possibly empty.
    pub fn decide_investments(
        &self,
        ctx: &EvaluationContext<'_>,
        year: i32,
        regions: &[String],
        technologies: &[String],
    ) -> InvestmentPlan {
        #[cfg(feature = "parallel")]
        let iter = regions.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = regions.iter();

        let per_region: Vec<IndexMap<String, f64>> = iter
            .map(|region| self.decide_region(ctx, year, region, technologies))
            .collect();

        regions.iter().cloned().zip(per_region).collect()
    }

    fn decide_region(
        &self,
        ctx: &EvaluationContext<'_>,
        year: i32,
        region: &str,
        technologies: &[String],
    ) -> IndexMap<String, f64> {
        let mut built = IndexMap::new();
        let mut pending_solar_mw = 0.0;

        for tech in technologies {
            let params = match ctx.technologies.technology_params(tech, year) {
                Ok(p) => p,
                Err(e) => {
                    warn!(technology = %tech, region, year, error = %e, "skipping evaluation");
                    continue;
                }
            };

            let request = ProjectRequest::reference(&self.reference, tech, year, region);
            let evaluation = self.evaluate_project_attractiveness(ctx, &request);
            let financials = match evaluation.outcome {
                Ok(f) => f,
                Err(e) => {
                    error!(technology = %tech, region, year, error = %e, "evaluation failed");
                    continue;
                }
            };

            if financials.npv_usd <= 0.0 {
                info!(
                    technology = %tech,
                    region,
                    year,
                    npv_usd = financials.npv_usd,
                    score = financials.attractiveness_score,
                    "NO INVEST"
                );
                continue;
            }

            let is_solar = params.category == TechnologyCategory::Photovoltaic;
            if self.reference.respect_penetration_ceiling
                && is_solar
                && !ctx
                    .grid
                    .check_grid_constraints(region, pending_solar_mw + request.capacity_mw)
            {
                info!(technology = %tech, region, year, "NO INVEST: solar penetration ceiling");
                continue;
            }

            info!(
                technology = %tech,
                region,
                year,
                npv_usd = financials.npv_usd,
                capacity_mw = request.capacity_mw,
                "INVEST"
            );
            if is_solar {
                pending_solar_mw += request.capacity_mw;
            }
            *built.entry(tech.clone()).or_insert(0.0) += request.capacity_mw;
        }
        built
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carbon::{CarbonScheme, CarbonSchemeKind, CarbonSchemes};
    use crate::grid::{GridLedger, GridRegion};
    use crate::market::{AncillaryService, MarketDesign, MarketSimulator};
    use crate::tech::{Technology, TechnologyEvolutionModel};
    use float_cmp::approx_eq;
    use rstest::rstest;

    /// Cost lookup returning a fixed LCOE and capex for known technologies.
    struct FixedCost {
        lcoe: f64,
        capex: f64,
    }

    impl CostLookup for FixedCost {
        fn evolving_lcoe(
            &self,
            technologies: &dyn TechnologyLookup,
            technology: &str,
            year: i32,
            _capacity_factor: f64,
            _discount_rate: f64,
            _lifetime_years: u32,
        ) -> LcoeResult {
            let error = technologies.technology_params(technology, year).err();
            LcoeResult {
                technology: technology.to_string(),
                year: Some(year),
                lcoe_usd_per_mwh: if error.is_some() { f64::INFINITY } else { self.lcoe },
                capex_usd_per_kw: Some(self.capex),
                opex_per_kw_year: Some(0.0),
                efficiency: None,
                annual_generation_mwh_per_kw: 1.752,
                crf: 0.0,
                annualized_capex_per_kw: 0.0,
                is_commercially_available: Some(true),
                error,
            }
        }
    }

    fn techs() -> TechnologyEvolutionModel {
        let mut model = TechnologyEvolutionModel::new();
        model.add_technology(Technology::new(
            "TOPCon_PV",
            TechnologyCategory::Photovoltaic,
            0.22,
            0.26,
            2020,
            2020,
            0.004,
            1000.0,
            0.02,
        ));
        model.add_technology(Technology::new(
            "Bifacial_PV",
            TechnologyCategory::Photovoltaic,
            0.21,
            0.25,
            2020,
            2020,
            0.004,
            1000.0,
            0.02,
        ));
        model
    }

    fn market(price: f64) -> MarketSimulator {
        let mut services = IndexMap::new();
        services.insert(
            "frequency_response".to_string(),
            AncillaryService {
                price_usd_per_mw_year: 6000.0,
                availability_factor: 0.5,
                notes: None,
            },
        );
        let mut designs = IndexMap::new();
        designs.insert(
            "USA".to_string(),
            MarketDesign {
                base_energy_price_usd_per_mwh: price,
                ancillary_services: services,
                ..MarketDesign::default()
            },
        );
        MarketSimulator::new(designs)
    }

    fn carbon() -> Box<dyn CarbonPricing> {
        let mut schemes = IndexMap::new();
        schemes.insert(
            "US_ETS".to_string(),
            CarbonScheme {
                kind: CarbonSchemeKind::CapAndTrade,
                price_per_ton_co2: 20.0,
                reference_carbon_price_per_ton_co2: None,
            },
        );
        Box::new(CarbonSchemes::new(schemes))
    }

    fn grid() -> GridLedger {
        let mut g = GridLedger::new();
        g.insert_region("USA", GridRegion::new(200.0, 150.0));
        g
    }

    fn request(tech: &str) -> ProjectRequest {
        ProjectRequest::reference(&ReferenceProject::default(), tech, 2030, "USA")
    }

    #[test]
    fn reference_project_financials() {
        let t = techs();
        let c = FixedCost { lcoe: 30.0, capex: 100.0 };
        let m = market(40.0);
        let g = grid();
        let ctx = EvaluationContext { technologies: &t, costs: &c, market: &m, grid: &g };
        let evaluator = InvestmentEvaluator::new(carbon(), ReferenceProject::default());

        let eval = evaluator.evaluate_project_attractiveness(&ctx, &request("TOPCon_PV"));
        let f = match eval.outcome {
            Ok(f) => f,
            Err(e) => panic!("unexpected error: {e}"),
        };

        assert!(approx_eq!(f64, f.annual_generation_mwh, 87_600.0, epsilon = 1e-6));
        assert!(approx_eq!(f64, f.projected_annual_profit_usd, 876_000.0, epsilon = 1e-6));
        assert_eq!(f.initial_investment_usd, 5_000_000.0);
        assert_eq!(f.attractiveness_score, f.profit_margin_usd_per_mwh);

        let annuity = (1.0 - 1.05_f64.powi(-25)) / 0.05;
        let expected_npv = -5_000_000.0 + 876_000.0 * annuity;
        assert!(approx_eq!(f64, f.npv_usd, expected_npv, epsilon = 1e-3));
        assert!(matches!(f.simple_payback, Payback::Years(y) if approx_eq!(f64, y, 5_000_000.0 / 876_000.0, epsilon = 1e-9)));
    }

    #[test]
    fn ancillary_and_carbon_revenue_add_to_cash_flow() {
        let t = techs();
        let c = FixedCost { lcoe: 30.0, capex: 100.0 };
        let m = market(40.0);
        let g = grid();
        let ctx = EvaluationContext { technologies: &t, costs: &c, market: &m, grid: &g };
        let evaluator = InvestmentEvaluator::new(carbon(), ReferenceProject::default());

        let mut req = request("TOPCon_PV");
        req.ancillary_services = vec!["frequency_response".into(), "black_start".into()];
        req.carbon_scheme = Some("US_ETS".into());
        let f = evaluator
            .evaluate_project_attractiveness(&ctx, &req)
            .outcome
            .ok();

        let f = f.as_ref();
        assert_eq!(f.map(|f| f.ancillary_revenue_usd_per_year), Some(150_000.0));
        let carbon = f.map(|f| f.carbon_credit_revenue_usd_per_year).unwrap_or_default();
        assert!(approx_eq!(f64, carbon, 87_600.0 * 0.5 * 20.0, epsilon = 1e-6));
        let cash = f.map(|f| f.annual_net_cash_flow_usd).unwrap_or_default();
        assert!(approx_eq!(f64, cash, 876_000.0 + 150_000.0 + 876_000.0, epsilon = 1e-6));
    }

    #[test]
    fn zero_capacity_factor_earns_no_carbon_revenue() {
        let t = techs();
        let c = FixedCost { lcoe: 30.0, capex: 100.0 };
        let m = market(40.0);
        let g = grid();
        let ctx = EvaluationContext { technologies: &t, costs: &c, market: &m, grid: &g };
        let evaluator = InvestmentEvaluator::new(carbon(), ReferenceProject::default());

        let mut req = request("TOPCon_PV");
        req.capacity_factor = 0.0;
        req.carbon_scheme = Some("US_ETS".into());
        let f = evaluator.evaluate_project_attractiveness(&ctx, &req).outcome.ok();
        assert_eq!(f.map(|f| f.carbon_credit_revenue_usd_per_year), Some(0.0));
    }

    #[test]
    fn lcoe_error_short_circuits() {
        let t = techs();
        let c = FixedCost { lcoe: 30.0, capex: 100.0 };
        let m = market(40.0);
        let g = grid();
        let ctx = EvaluationContext { technologies: &t, costs: &c, market: &m, grid: &g };
        let evaluator = InvestmentEvaluator::new(carbon(), ReferenceProject::default());

        let eval = evaluator.evaluate_project_attractiveness(&ctx, &request("Ghost"));
        assert_eq!(eval.outcome, Err(ModelError::UnknownTechnology("Ghost".into())));
        assert_eq!(eval.lcoe.lcoe_usd_per_mwh, f64::INFINITY);
    }

    #[test]
    fn payback_sentinels() {
        assert_eq!(simple_payback(0.0, 0.0, 0.0), Payback::Years(0.0));
        assert_eq!(
            simple_payback(50.0, 0.0, 10.0),
            Payback::NotApplicable(PaybackUnavailable::ZeroInvestment)
        );
        assert_eq!(
            simple_payback(50.0, 100.0, 0.0),
            Payback::NotApplicable(PaybackUnavailable::NonPositiveCashFlow)
        );
        assert_eq!(simple_payback(50.0, 100.0, 25.0), Payback::Years(4.0));
        assert_eq!(
            simple_payback(50.0, 0.0, 0.0).to_string(),
            "N/A (initial investment is zero)"
        );
        assert_eq!(
            simple_payback(50.0, 100.0, -1.0).to_string(),
            "N/A (negative or zero cash flow)"
        );
    }

    #[test]
    fn npv_edge_cases() {
        assert_eq!(npv(0.0, 0.0, 0.05, 0), 0.0);
        assert_eq!(npv(100.0, 50.0, 0.05, 0), -100.0);
        assert_eq!(npv(100.0, 50.0, 0.0, 4), 100.0);
        assert!(approx_eq!(f64, npv(0.0, 105.0, 0.05, 1), 100.0, epsilon = 1e-9));
    }

    #[rstest]
    #[case(0.05, 25)]
    #[case(0.0, 10)]
    #[case(0.12, 1)]
    #[case(-0.02, 20)]
    fn npv_strictly_increases_with_cash_flow(#[case] rate: f64, #[case] lifetime: u32) {
        let values: Vec<f64> = [-500_000.0, -1.0, 0.0, 1.0, 250_000.0, 2_000_000.0]
            .into_iter()
            .map(|cf| npv(1_000_000.0, cf, rate, lifetime))
            .collect();
        for pair in values.windows(2) {
            assert!(pair[1] > pair[0], "rate {rate}, lifetime {lifetime}: {values:?}");
        }
    }

    #[test]
    fn invests_full_capacity_only_with_positive_npv() {
        let t = techs();
        let g = grid();
        let evaluator = InvestmentEvaluator::new(carbon(), ReferenceProject::default());
        let regions = vec!["USA".to_string()];
        let technologies = vec!["TOPCon_PV".to_string(), "Ghost".to_string()];

        let c = FixedCost { lcoe: 30.0, capex: 100.0 };
        let m = market(40.0);
        let ctx = EvaluationContext { technologies: &t, costs: &c, market: &m, grid: &g };
        let plan = evaluator.decide_investments(&ctx, 2030, &regions, &technologies);
        assert_eq!(plan.get("USA").and_then(|r| r.get("TOPCon_PV")), Some(&50.0));
        assert!(plan.get("USA").is_some_and(|r| !r.contains_key("Ghost")));

        let cheap = market(20.0);
        let ctx = EvaluationContext { technologies: &t, costs: &c, market: &cheap, grid: &g };
        let plan = evaluator.decide_investments(&ctx, 2030, &regions, &technologies);
        assert_eq!(plan.get("USA").map(IndexMap::len), Some(0));
    }

    #[test]
    fn penetration_ceiling_is_optional() {
        let t = techs();
        let g = grid();
        let c = FixedCost { lcoe: 30.0, capex: 100.0 };
        let m = market(40.0);
        let ctx = EvaluationContext { technologies: &t, costs: &c, market: &m, grid: &g };
        let regions = vec!["USA".to_string()];
        let technologies = vec!["TOPCon_PV".to_string(), "Bifacial_PV".to_string()];

        let free = InvestmentEvaluator::new(carbon(), ReferenceProject::default());
        let plan = free.decide_investments(&ctx, 2030, &regions, &technologies);
        assert_eq!(plan.get("USA").map(IndexMap::len), Some(2));

        // Ceiling is 100 MW, so only one 60 MW build fits.
        let bounded = InvestmentEvaluator::new(
            carbon(),
            ReferenceProject {
                capacity_mw: 60.0,
                respect_penetration_ceiling: true,
                ..ReferenceProject::default()
            },
        );
        let plan = bounded.decide_investments(&ctx, 2030, &regions, &technologies);
        assert_eq!(plan.get("USA").map(IndexMap::len), Some(1));
    }
}
