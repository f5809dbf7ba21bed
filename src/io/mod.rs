/// CSV and JSON export of year records.
pub mod export;
