//! Technology registry with year-by-year efficiency and capital-cost evolution.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ModelError, ParseCategoryError};
use crate::lookup::TechnologyLookup;

/// Year at which every technology's target efficiency is anchored.
pub const EFFICIENCY_ANCHOR_YEAR: i32 = 2035;

/// Broad technology class supplied at registration.
///
/// Grid bookkeeping counts only `Photovoltaic` capacity toward the solar
/// penetration ceiling, and dispatch gives `Storage` a lower effective
/// capacity factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnologyCategory {
    Photovoltaic,
    Storage,
    Other,
}

impl fmt::Display for TechnologyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TechnologyCategory::Photovoltaic => "photovoltaic",
            TechnologyCategory::Storage => "storage",
            TechnologyCategory::Other => "other",
        };
        f.write_str(s)
    }
}

impl FromStr for TechnologyCategory {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "photovoltaic" | "pv" => Ok(TechnologyCategory::Photovoltaic),
            "storage" => Ok(TechnologyCategory::Storage),
            "other" => Ok(TechnologyCategory::Other),
            _ => Err(ParseCategoryError(s.to_string())),
        }
    }
}

/// A generation or storage technology and its evolution anchors.
///
/// Immutable after construction. The linear efficiency improvement rate is
/// derived once in [`Technology::new`].
#[derive(Debug, Clone)]
pub struct Technology {
    pub name: String,
    pub category: TechnologyCategory,
    /// Efficiency at `start_year`.
    pub base_efficiency: f64,
    /// Efficiency reached at [`EFFICIENCY_ANCHOR_YEAR`].
    pub projected_efficiency_2035: f64,
    pub start_year: i32,
    /// First year the technology is commercially available.
    pub commercial_scale_year: i32,
    pub degradation_rate_annual: f64,
    pub base_capex_usd_per_kw: f64,
    /// Fractional capex reduction per year after `start_year`.
    pub annual_capex_reduction_rate: f64,
    annual_efficiency_improvement: f64,
}

impl Technology {
    /// Creates a technology and derives its annual efficiency improvement.
    ///
    /// The improvement rate is `(target - base) / (2035 - start_year)`, or zero
    /// when the start year is not before 2035 or the target does not exceed
    /// the base efficiency.
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        category: TechnologyCategory,
        base_efficiency: f64,
        projected_efficiency_2035: f64,
        start_year: i32,
        commercial_scale_year: i32,
        degradation_rate_annual: f64,
        base_capex_usd_per_kw: f64,
        annual_capex_reduction_rate: f64,
    ) -> Self {
        let annual_efficiency_improvement = if start_year >= EFFICIENCY_ANCHOR_YEAR
            || projected_efficiency_2035 <= base_efficiency
        {
            0.0
        } else {
            (projected_efficiency_2035 - base_efficiency)
                / f64::from(EFFICIENCY_ANCHOR_YEAR - start_year)
        };

        Self {
            name: name.into(),
            category,
            base_efficiency,
            projected_efficiency_2035,
            start_year,
            commercial_scale_year,
            degradation_rate_annual,
            base_capex_usd_per_kw,
            annual_capex_reduction_rate,
            annual_efficiency_improvement,
        }
    }

    /// Linear efficiency gain per year between `start_year` and 2035.
    pub fn annual_efficiency_improvement(&self) -> f64 {
        self.annual_efficiency_improvement
    }

    /// Computes this technology's parameters for `year`.
    pub fn params_for_year(&self, year: i32) -> TechParams {
        let efficiency = if year < self.start_year {
            self.base_efficiency
        } else if year >= EFFICIENCY_ANCHOR_YEAR {
            self.projected_efficiency_2035
        } else {
            let years_since_start = f64::from(year - self.start_year);
            (self.base_efficiency + self.annual_efficiency_improvement * years_since_start)
                .min(self.projected_efficiency_2035)
        };

        let years_of_reduction = (year - self.start_year).max(0);
        let capex = (self.base_capex_usd_per_kw
            * (1.0 - self.annual_capex_reduction_rate).powi(years_of_reduction))
        .max(0.0);

        TechParams {
            name: self.name.clone(),
            year,
            category: self.category,
            efficiency,
            degradation_rate_annual: self.degradation_rate_annual,
            capex_usd_per_kw: capex,
            is_commercially_available: year >= self.commercial_scale_year,
            commercial_scale_year: self.commercial_scale_year,
        }
    }
}

/// Technology parameters evaluated for a single year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechParams {
    pub name: String,
    pub year: i32,
    pub category: TechnologyCategory,
    pub efficiency: f64,
    pub degradation_rate_annual: f64,
    pub capex_usd_per_kw: f64,
    pub is_commercially_available: bool,
    pub commercial_scale_year: i32,
}

/// Registry of technologies keyed by name, in registration order.
#[derive(Debug, Clone, Default)]
pub struct TechnologyEvolutionModel {
    technologies: IndexMap<String, Technology>,
}

impl TechnologyEvolutionModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a technology, replacing any entry with the same name.
    pub fn add_technology(&mut self, tech: Technology) {
        info!(technology = %tech.name, category = %tech.category, "registered technology");
        self.technologies.insert(tech.name.clone(), tech);
    }

    /// Returns parameters for `name` in `year`, or a not-found error.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownTechnology`] when `name` is not registered.
    pub fn get_technology_details(&self, name: &str, year: i32) -> Result<TechParams, ModelError> {
        self.technologies
            .get(name)
            .map(|t| t.params_for_year(year))
            .ok_or_else(|| ModelError::UnknownTechnology(name.to_string()))
    }

    /// Lists technology names in registration order.
    ///
    /// With `Some(year)`, only technologies commercially available by that
    /// year are returned.
    pub fn list_technologies(&self, year: Option<i32>) -> Vec<String> {
        self.technologies
            .values()
            .filter(|t| year.is_none_or(|y| y >= t.commercial_scale_year))
            .map(|t| t.name.clone())
            .collect()
    }

    /// Returns the registered technology with this name.
    pub fn get(&self, name: &str) -> Option<&Technology> {
        self.technologies.get(name)
    }

    pub fn len(&self) -> usize {
        self.technologies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.technologies.is_empty()
    }

    /// Per-year hook. Technology parameters are pure functions of the year,
    /// so nothing is mutated.
    pub fn update_for_year(&self, year: i32) {
        debug!(year, count = self.technologies.len(), "technology registry ready");
    }
}

impl TechnologyLookup for TechnologyEvolutionModel {
    fn technology_params(&self, name: &str, year: i32) -> Result<TechParams, ModelError> {
        self.get_technology_details(name, year)
    }

    fn category(&self, name: &str) -> Option<TechnologyCategory> {
        self.technologies.get(name).map(|t| t.category)
    }
}
