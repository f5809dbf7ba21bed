//! Policy book: tax credits, capex grants, carbon prices, production credits,
//! and renewable portfolio standards.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::lookup::PolicyCollaborator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Investment tax credit, a fraction of capex.
    Itc,
    /// Upfront grant, a fraction of capex.
    GrantCapexPercentage,
    /// Carbon price in USD/t CO2.
    CarbonPrice,
    /// Production tax credit per unit of energy.
    Ptc,
    /// Renewable portfolio standard; `value` is the target share.
    Rps,
}

/// A single policy instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PolicyKind,
    pub value: f64,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub applicable_regions: Vec<String>,
    #[serde(default)]
    pub technology_scope: Option<Vec<String>>,
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default)]
    pub end_year: Option<i32>,
    #[serde(default)]
    pub target_year: Option<i32>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl Policy {
    fn matches_region(&self, region: Option<&str>) -> bool {
        match (region, self.region.as_deref()) {
            (None, _) | (_, None) => true,
            (Some(q), Some(r)) => q == r || self.applicable_regions.iter().any(|a| a == q),
        }
    }

    fn active_in(&self, year: i32) -> bool {
        self.start_year.is_none_or(|s| s <= year) && self.end_year.is_none_or(|e| year <= e)
    }

    fn covers_technology(&self, technology: Option<&str>) -> bool {
        match (technology, &self.technology_scope) {
            (None, _) | (_, None) => true,
            (Some(t), Some(scope)) => scope.iter().any(|s| s == t),
        }
    }
}

/// An active renewable portfolio standard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpsTarget {
    pub policy_id: String,
    pub target_percentage: f64,
    pub target_year: Option<i32>,
    pub eligible_technologies: Option<Vec<String>>,
}

/// Ordered collection of policies.
#[derive(Debug, Clone, Default)]
pub struct PolicyBook {
    policies: Vec<Policy>,
}

impl PolicyBook {
    pub fn new(policies: Vec<Policy>) -> Self {
        info!(policies = policies.len(), "policy book initialized");
        Self { policies }
    }

    pub fn add_policy(&mut self, policy: Policy) {
        info!(policy = %policy.id, "policy added");
        self.policies.push(policy);
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Policies in force, in insertion order.
    ///
    /// `None` filters match anything. A policy without a region applies
    /// everywhere; one with `applicable_regions` also applies to those.
    pub fn active_policies(
        &self,
        region: Option<&str>,
        year: i32,
        kind: Option<PolicyKind>,
        technology: Option<&str>,
    ) -> impl Iterator<Item = &Policy> {
        self.policies.iter().filter(move |p| {
            p.matches_region(region)
                && p.active_in(year)
                && kind.is_none_or(|k| p.kind == k)
                && p.covers_technology(technology)
        })
    }

    /// `1 − min(1, Σ ITC + Σ capex grants)` for the region, year and technology.
    pub fn effective_capex_factor(&self, region: &str, year: i32, technology: Option<&str>) -> f64 {
        let reduction: f64 = [PolicyKind::Itc, PolicyKind::GrantCapexPercentage]
            .into_iter()
            .flat_map(|kind| self.active_policies(Some(region), year, Some(kind), technology))
            .map(|p| p.value)
            .sum();
        let factor = 1.0 - reduction.min(1.0);
        debug!(region, year, technology, factor, "effective capex factor");
        factor
    }

    /// First active carbon price, or 0.
    pub fn carbon_price(&self, region: &str, year: i32) -> f64 {
        self.active_policies(Some(region), year, Some(PolicyKind::CarbonPrice), None)
            .next()
            .map_or(0.0, |p| p.value)
    }

    /// First active production tax credit, or 0.
    pub fn ptc_value(&self, region: &str, year: i32, technology: Option<&str>) -> f64 {
        self.active_policies(Some(region), year, Some(PolicyKind::Ptc), technology)
            .next()
            .map_or(0.0, |p| p.value)
    }

    /// First active RPS whose target year has not passed.
    pub fn rps_target(&self, region: &str, year: i32, technology: Option<&str>) -> Option<RpsTarget> {
        self.active_policies(Some(region), year, Some(PolicyKind::Rps), technology)
            .find(|p| p.target_year.is_none_or(|t| year <= t))
            .map(|p| RpsTarget {
                policy_id: p.id.clone(),
                target_percentage: p.value,
                target_year: p.target_year,
                eligible_technologies: p.technology_scope.clone(),
            })
    }
}

impl PolicyCollaborator for PolicyBook {
    fn get_carbon_price(&self, region: &str, year: i32) -> f64 {
        self.carbon_price(region, year)
    }

    fn effective_capex_factor(&self, region: &str, year: i32, technology: Option<&str>) -> f64 {
        PolicyBook::effective_capex_factor(self, region, year, technology)
    }
}
