//! Carbon pricing schemes: taxes, trading systems, and border adjustments.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::lookup::CarbonPricing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarbonSchemeKind {
    CapAndTrade,
    Tax,
    Cbam,
}

/// A named carbon pricing scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarbonScheme {
    pub kind: CarbonSchemeKind,
    #[serde(default)]
    pub price_per_ton_co2: f64,
    /// Internal price a border adjustment levels imports up to.
    #[serde(default)]
    pub reference_carbon_price_per_ton_co2: Option<f64>,
}

/// Carbon schemes keyed by name.
#[derive(Debug, Clone, Default)]
pub struct CarbonSchemes {
    schemes: IndexMap<String, CarbonScheme>,
}

impl CarbonSchemes {
    pub fn new(schemes: IndexMap<String, CarbonScheme>) -> Self {
        info!(schemes = schemes.len(), "carbon pricing initialized");
        Self { schemes }
    }

    pub fn scheme(&self, name: &str) -> Option<&CarbonScheme> {
        self.schemes.get(name)
    }

    /// Border adjustment on goods entering `import_region`.
    ///
    /// Uses scheme `CBAM_<import_region>` and charges the gap between its
    /// reference price and the exporter's price, never negative. Returns 0
    /// when the region has no border scheme.
    pub fn apply_cbam(
        &self,
        embodied_tons_co2: f64,
        import_region: &str,
        export_region_price_per_ton: f64,
    ) -> f64 {
        let Some(scheme) = self.schemes.get(&format!("CBAM_{import_region}")) else {
            debug!(import_region, "no border adjustment scheme");
            return 0.0;
        };
        let reference = scheme.reference_carbon_price_per_ton_co2.unwrap_or(0.0);
        embodied_tons_co2 * (reference - export_region_price_per_ton).max(0.0)
    }
}

impl CarbonPricing for CarbonSchemes {
    /// Unknown schemes cost nothing.
    fn get_carbon_cost(&self, emissions_tons_co2: f64, scheme: &str) -> f64 {
        match self.schemes.get(scheme) {
            Some(s) => emissions_tons_co2 * s.price_per_ton_co2,
            None => {
                warn!(scheme, "carbon pricing scheme not found; assuming zero cost");
                0.0
            }
        }
    }
}
