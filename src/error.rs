//! Error types shared across the simulation models.
//!
//! Two families live here. [`ModelError`] is recoverable: it is carried
//! inside result values (an LCOE breakdown, a project evaluation) so the
//! yearly loop can skip one item and keep going. [`EngineError`] is fatal
//! and stops a run before any year is simulated, or fails it at hand-off
//! when the results cannot be reported.

use thiserror::Error;

/// Recoverable modelling failure attached to a result value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// The technology registry has no entry with this name.
    #[error("technology '{0}' not found")]
    UnknownTechnology(String),

    /// Lifetime is zero (or negative) while capital cost is positive.
    #[error("lifetime is {lifetime} years; LCOE is infinite for {technology}{} with positive capex", in_year(.year))]
    ZeroLifetime {
        technology: String,
        year: Option<i32>,
        lifetime: u32,
    },

    /// The capital recovery factor cannot be evaluated.
    #[error("CRF is undefined for {technology}{} (discount rate {discount_rate}, lifetime {lifetime})", in_year(.year))]
    DegenerateCrf {
        technology: String,
        year: Option<i32>,
        discount_rate: f64,
        lifetime: u32,
    },

    /// Costs are positive but the asset produces no energy.
    #[error("annual generation is zero for {technology}{}; LCOE is infinite", in_year(.year))]
    ZeroGeneration {
        technology: String,
        year: Option<i32>,
    },

    /// A financial metric came out NaN or infinite.
    #[error("non-finite {metric} for {technology} in {region} ({year})")]
    NonFinite {
        metric: &'static str,
        technology: String,
        region: String,
        year: i32,
    },
}

/// `" in <year>"` for year-bound LCOE results, empty for the flat LCOE.
fn in_year(year: &Option<i32>) -> String {
    year.map(|y| format!(" in {y}")).unwrap_or_default()
}

/// Fatal engine failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required model collaborator was never supplied.
    #[error("missing essential model in configuration: {0}")]
    MissingCollaborator(&'static str),

    /// The region list is empty.
    #[error("no regions specified in configuration")]
    NoRegions,

    /// The technology list is empty.
    #[error("no technologies specified in configuration")]
    NoTechnologies,

    /// The simulation period is inverted.
    #[error("start year {start} is after end year {end}")]
    InvertedPeriod { start: i32, end: i32 },

    /// `run` was called on an engine that already finished.
    #[error("simulation has already run")]
    AlreadyRun,

    /// The reporting collaborator rejected the finished records.
    #[error("reporting failed: {0}")]
    Report(#[from] ExportError),
}

/// Supply-chain data lookup failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SupplyChainError {
    /// No item with this name is tracked.
    #[error("supply item '{0}' not found")]
    UnknownItem(String),

    /// The item's capacity is tracked in a different unit.
    #[error("supply item '{item}' is tracked in {actual}, not {requested}")]
    UnitMismatch {
        item: String,
        requested: &'static str,
        actual: &'static str,
    },
}

/// A technology category name that is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown technology category '{0}'")]
pub struct ParseCategoryError(pub String);

/// Failure writing simulation results.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("json export failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
