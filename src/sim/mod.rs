/// Yearly simulation loop and its builder.
pub mod engine;
pub mod kpi;
pub mod types;
