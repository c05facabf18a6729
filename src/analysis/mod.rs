//! Analysis over resolved windows.
//!
//! Growth metrics, daily series and the per-group aggregation. Nothing in
//! here talks to a source directly; everything goes through the adapters.

pub mod aggregator;
pub mod growth;
pub mod series;

pub use aggregator::{aggregate_working_groups, GroupAggregation};
pub use growth::{count_growth, growth};
pub use series::{build_daily_series, daily_counts, day_bounds};
