//! Upstream manufacturing capacity, material availability, and supplier
//! concentration (HHI).

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SupplyChainError;
use crate::lookup::SupplyChainCollaborator;

/// HHI below this is unconcentrated.
pub const HHI_UNCONCENTRATED_BELOW: f64 = 1500.0;
/// HHI above this is highly concentrated.
pub const HHI_HIGH_ABOVE: f64 = 2500.0;

/// Unit in which an item's capacity is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityUnit {
    TonsPerYear,
    GwPerYear,
}

impl CapacityUnit {
    pub fn label(self) -> &'static str {
        match self {
            CapacityUnit::TonsPerYear => "tons_per_year",
            CapacityUnit::GwPerYear => "gw_per_year",
        }
    }
}

/// A material or component with capacity by producing region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupplyItem {
    pub unit: CapacityUnit,
    pub regional_capacity: IndexMap<String, f64>,
    #[serde(default)]
    pub criticality_score: Option<f64>,
}

impl SupplyItem {
    pub fn new(unit: CapacityUnit, regional_capacity: &[(&str, f64)]) -> Self {
        Self {
            unit,
            regional_capacity: regional_capacity
                .iter()
                .map(|(r, c)| ((*r).to_string(), *c))
                .collect(),
            criticality_score: None,
        }
    }

    /// Global capacity, always the sum of regional capacity.
    pub fn global_capacity(&self) -> f64 {
        self.regional_capacity.values().sum()
    }
}

/// Result of a material availability check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialAvailability {
    Available { surplus: f64 },
    Shortfall { shortfall: f64 },
}

impl MaterialAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, MaterialAvailability::Available { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConcentrationLevel {
    Unconcentrated,
    Moderate,
    High,
    NoCapacity,
}

impl fmt::Display for ConcentrationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConcentrationLevel::Unconcentrated => "Unconcentrated (Competitive)",
            ConcentrationLevel::Moderate => "Moderately concentrated",
            ConcentrationLevel::High => "Highly concentrated",
            ConcentrationLevel::NoCapacity => "No capacity",
        };
        f.write_str(s)
    }
}

/// Market concentration of an item's producing regions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcentrationRisk {
    pub item: String,
    pub hhi: f64,
    pub level: ConcentrationLevel,
    pub regional_shares_pct: IndexMap<String, f64>,
}

/// Herfindahl-Hirschman Index of percentage shares (0-100).
///
/// Returns 0 for an empty list or shares that sum to zero.
pub fn calculate_hhi(shares_pct: &[f64]) -> f64 {
    if shares_pct.is_empty() || shares_pct.iter().sum::<f64>() == 0.0 {
        return 0.0;
    }
    shares_pct.iter().map(|s| s * s).sum()
}

/// Supply items keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SupplyChainModel {
    items: IndexMap<String, SupplyItem>,
}

impl SupplyChainModel {
    pub fn new(items: IndexMap<String, SupplyItem>) -> Self {
        info!(items = items.len(), "supply-chain model initialized");
        Self { items }
    }

    /// Builds a fresh copy of the default dataset: polysilicon, solar
    /// modules, and lithium carbonate.
    pub fn with_default_data() -> Self {
        let mut items = IndexMap::new();
        items.insert(
            "polysilicon".to_string(),
            SupplyItem {
                criticality_score: Some(0.8),
                ..SupplyItem::new(
                    CapacityUnit::TonsPerYear,
                    &[
                        ("China", 3_700_000.0),
                        ("USA", 150_000.0),
                        ("Germany", 100_000.0),
                        ("Rest", 50_000.0),
                    ],
                )
            },
        );
        items.insert(
            "solar_modules".to_string(),
            SupplyItem::new(
                CapacityUnit::GwPerYear,
                &[
                    ("China", 750.0),
                    ("Vietnam", 50.0),
                    ("India", 40.0),
                    ("USA", 30.0),
                    ("EU", 50.0),
                    ("ROW", 80.0),
                ],
            ),
        );
        items.insert(
            "lithium_carbonate".to_string(),
            SupplyItem::new(
                CapacityUnit::TonsPerYear,
                &[
                    ("Australia", 250_000.0),
                    ("Chile", 200_000.0),
                    ("China", 1_100_000.0),
                    ("Argentina", 100_000.0),
                    ("Rest", 50_000.0),
                ],
            ),
        );
        Self::new(items)
    }

    /// Adds or replaces an item.
    pub fn add_supply_item(&mut self, name: impl Into<String>, item: SupplyItem) {
        let name = name.into();
        info!(item = %name, "supply item added");
        self.items.insert(name, item);
    }

    pub fn item(&self, name: &str) -> Option<&SupplyItem> {
        self.items.get(name)
    }

    /// Compares `required` against global capacity.
    ///
    /// An unknown material is a shortfall of the full requirement.
    pub fn get_material_availability(&self, material: &str, required: f64) -> MaterialAvailability {
        let Some(item) = self.items.get(material) else {
            warn!(material, "no capacity data for material");
            return MaterialAvailability::Shortfall {
                shortfall: required,
            };
        };
        let global = item.global_capacity();
        if global >= required {
            MaterialAvailability::Available {
                surplus: global - required,
            }
        } else {
            MaterialAvailability::Shortfall {
                shortfall: required - global,
            }
        }
    }

    /// HHI-based concentration of an item's regional capacity.
    ///
    /// # Errors
    ///
    /// Returns [`SupplyChainError::UnknownItem`] for an untracked item and
    /// [`SupplyChainError::UnitMismatch`] if it is tracked in another unit.
    pub fn get_concentration_risk(
        &self,
        item_name: &str,
        unit: CapacityUnit,
    ) -> Result<ConcentrationRisk, SupplyChainError> {
        let item = self
            .items
            .get(item_name)
            .ok_or_else(|| SupplyChainError::UnknownItem(item_name.to_string()))?;
        if item.unit != unit {
            return Err(SupplyChainError::UnitMismatch {
                item: item_name.to_string(),
                requested: unit.label(),
                actual: item.unit.label(),
            });
        }

        let total = item.global_capacity();
        if total == 0.0 {
            return Ok(ConcentrationRisk {
                item: item_name.to_string(),
                hhi: 0.0,
                level: ConcentrationLevel::NoCapacity,
                regional_shares_pct: IndexMap::new(),
            });
        }

        let regional_shares_pct: IndexMap<String, f64> = item
            .regional_capacity
            .iter()
            .map(|(region, cap)| (region.clone(), cap / total * 100.0))
            .collect();
        let shares: Vec<f64> = regional_shares_pct.values().copied().collect();
        let hhi = calculate_hhi(&shares);

        let level = if hhi < HHI_UNCONCENTRATED_BELOW {
            ConcentrationLevel::Unconcentrated
        } else if hhi <= HHI_HIGH_ABOVE {
            ConcentrationLevel::Moderate
        } else {
            ConcentrationLevel::High
        };

        Ok(ConcentrationRisk {
            item: item_name.to_string(),
            hhi,
            level,
            regional_shares_pct,
        })
    }

    /// Adds `additional` capacity to `region` for an existing item.
    pub fn model_capacity_expansion(&mut self, item_name: &str, region: &str, additional: f64, year: i32) {
        let Some(item) = self.items.get_mut(item_name) else {
            warn!(item = item_name, "unknown supply item; cannot expand capacity");
            return;
        };
        *item.regional_capacity.entry(region.to_string()).or_insert(0.0) += additional;
        info!(
            item = item_name,
            region,
            additional,
            year,
            global = item.global_capacity(),
            "supply capacity expanded"
        );
    }
}

/// A capacity expansion applied at the start of its year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduledExpansion {
    pub item: String,
    pub region: String,
    pub additional: f64,
    pub year: i32,
}

impl SupplyChainCollaborator for SupplyChainModel {
    fn global_capacity(&self, item: &str) -> Option<f64> {
        self.items.get(item).map(SupplyItem::global_capacity)
    }

    fn get_material_availability(&self, material: &str, required: f64) -> MaterialAvailability {
        SupplyChainModel::get_material_availability(self, material, required)
    }

    fn get_concentration_risk(
        &self,
        item: &str,
        unit: CapacityUnit,
    ) -> Result<ConcentrationRisk, SupplyChainError> {
        SupplyChainModel::get_concentration_risk(self, item, unit)
    }

    fn model_capacity_expansion(&mut self, item: &str, region: &str, additional: f64, year: i32) {
        SupplyChainModel::model_capacity_expansion(self, item, region, additional, year);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_data_global_is_regional_sum() {
        let model = SupplyChainModel::with_default_data();
        assert_eq!(model.global_capacity("polysilicon"), Some(4_000_000.0));
        assert_eq!(model.global_capacity("solar_modules"), Some(1000.0));
        assert_eq!(model.global_capacity("lithium_carbonate"), Some(1_700_000.0));
    }

    #[test]
    fn default_data_is_a_fresh_copy() {
        let mut first = SupplyChainModel::with_default_data();
        first.model_capacity_expansion("polysilicon", "USA", 100_000.0, 2028);
        let second = SupplyChainModel::with_default_data();
        assert_eq!(second.global_capacity("polysilicon"), Some(4_000_000.0));
        assert_eq!(first.global_capacity("polysilicon"), Some(4_100_000.0));
    }

    #[test]
    fn availability_reports_surplus_and_shortfall() {
        let model = SupplyChainModel::with_default_data();
        assert_eq!(
            model.get_material_availability("polysilicon", 1_000_000.0),
            MaterialAvailability::Available { surplus: 3_000_000.0 }
        );
        assert_eq!(
            model.get_material_availability("lithium_carbonate", 2_000_000.0),
            MaterialAvailability::Shortfall { shortfall: 300_000.0 }
        );
        assert_eq!(
            model.get_material_availability("gallium", 10.0),
            MaterialAvailability::Shortfall { shortfall: 10.0 }
        );
    }

    #[test]
    fn hhi_edge_cases() {
        assert_eq!(calculate_hhi(&[]), 0.0);
        assert_eq!(calculate_hhi(&[0.0, 0.0]), 0.0);
        assert_eq!(calculate_hhi(&[100.0]), 10_000.0);
        assert_eq!(calculate_hhi(&[50.0, 50.0]), 5000.0);
    }

    #[test]
    fn concentration_levels() {
        let model = SupplyChainModel::with_default_data();
        let modules = model.get_concentration_risk("solar_modules", CapacityUnit::GwPerYear);
        assert_eq!(modules.as_ref().map(|r| r.level), Ok(ConcentrationLevel::High));

        let mut model = SupplyChainModel::new(IndexMap::new());
        model.add_supply_item(
            "even",
            SupplyItem::new(
                CapacityUnit::GwPerYear,
                &[("A", 1.0), ("B", 1.0), ("C", 1.0), ("D", 1.0), ("E", 1.0), ("F", 1.0), ("G", 1.0)],
            ),
        );
        model.add_supply_item(
            "pair",
            SupplyItem::new(
                CapacityUnit::GwPerYear,
                &[("A", 1.0), ("B", 1.0), ("C", 1.0), ("D", 1.0), ("E", 1.0)],
            ),
        );
        model.add_supply_item("empty", SupplyItem::new(CapacityUnit::GwPerYear, &[("A", 0.0)]));

        let level = |name: &str| {
            model
                .get_concentration_risk(name, CapacityUnit::GwPerYear)
                .map(|r| r.level)
        };
        assert_eq!(level("even"), Ok(ConcentrationLevel::Unconcentrated));
        assert_eq!(level("pair"), Ok(ConcentrationLevel::Moderate));
        assert_eq!(level("empty"), Ok(ConcentrationLevel::NoCapacity));
    }

    #[test]
    fn concentration_errors() {
        let model = SupplyChainModel::with_default_data();
        assert_eq!(
            model.get_concentration_risk("cobalt", CapacityUnit::TonsPerYear),
            Err(SupplyChainError::UnknownItem("cobalt".to_string()))
        );
        assert!(matches!(
            model.get_concentration_risk("polysilicon", CapacityUnit::GwPerYear),
            Err(SupplyChainError::UnitMismatch { .. })
        ));
    }

    #[test]
    fn expansion_of_unknown_item_is_ignored() {
        let mut model = SupplyChainModel::with_default_data();
        model.model_capacity_expansion("cobalt", "DRC", 10.0, 2030);
        assert_eq!(model.global_capacity("cobalt"), None);
    }

    #[test]
    fn expansion_adds_new_region() {
        let mut model = SupplyChainModel::with_default_data();
        model.model_capacity_expansion("solar_modules", "Mexico", 20.0, 2027);
        assert_eq!(model.global_capacity("solar_modules"), Some(1020.0));
        assert_eq!(
            model.item("solar_modules").and_then(|i| i.regional_capacity.get("Mexico").copied()),
            Some(20.0)
        );
    }
}
