//! Shared primitive types used across every pipeline.

/// A column label in a price table, e.g. "BTC" or "SPY".
pub type AssetId = String;

/// The canonical run identifier.
pub type RunId = String;

/// One row of the daily index.
pub type Date = chrono::NaiveDate;
