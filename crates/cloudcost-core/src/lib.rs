//! Core types, traits, and engine for cloudcost
//!
//! This crate provides the domain types, error handling, period resolution,
//! the paginated sequence adapter, the billing backend trait and the
//! multi-period aggregation engine used by all other cloudcost crates.

pub mod aggregation;
pub mod aggregation_types;
pub mod backend;
pub mod error;
pub mod extra_data;
pub mod identity;
pub mod pagination;
pub mod period;
pub mod types;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use aggregation::{AggregateRequest, Aggregator, PeriodMismatch, fail_on_period_mismatch};
pub use aggregation_types::{CostDiff, Item, PivotResult, ResultGroup, ResultPeriod};
pub use backend::{BillingBackend, CostQuery, RecordStream};
pub use error::{CloudCostError, Result};
pub use types::{DateInterval, Filter, GroupDimension, ItemKey, PeriodGroup, RawRecord};
