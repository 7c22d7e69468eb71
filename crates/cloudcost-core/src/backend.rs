//! Billing backend trait
//!
//! This module defines the `BillingBackend` trait every cost source implements.
//! The aggregation engine only talks to backends through it: it asks for the
//! declared dimensions, issues one query per period group and consumes the
//! returned record stream.

use crate::error::{CloudCostError, Result};
use crate::extra_data::{ExtraDataScope, ExtraDatum, ExtraOutput, ExtraSection};
use crate::types::{DateInterval, Filter, Granularity, GroupDimension, Parameters, RawRecord};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// Lazy stream of cost records; ends after the first error
pub type RecordStream<'a> = Pin<Box<dyn Stream<Item = Result<RawRecord>> + Send + 'a>>;

/// One backend query: a date range, a bucket granularity, group-by dimensions and filters
#[derive(Debug, Clone, PartialEq)]
pub struct CostQuery {
    pub interval: DateInterval,
    pub granularity: Granularity,
    pub groups: Vec<GroupDimension>,
    pub filters: Vec<Filter>,
}

impl CostQuery {
    pub fn new(interval: DateInterval, granularity: Granularity) -> Self {
        Self {
            interval,
            granularity,
            groups: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn with_groups(mut self, groups: Vec<GroupDimension>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    /// Value of the first filter on `id`
    pub fn filter_value(&self, id: &str) -> Option<&str> {
        self.filters
            .iter()
            .find(|f| f.id == id)
            .map(|f| f.value.as_str())
    }
}

/// Source of daily cost records
///
/// Implementations must return a stream that does no work until polled,
/// stops after yielding an error, and makes no further calls once dropped.
#[async_trait]
pub trait BillingBackend: Send + Sync {
    /// Short name used in messages
    fn name(&self) -> &str;

    /// Days after which the backend's data is considered settled
    fn days_delay(&self) -> u32 {
        1
    }

    /// Maximum number of group-by dimensions per query, `None` when unbounded
    fn max_group_by(&self) -> Option<usize> {
        None
    }

    /// Dimensions the backend can group and filter on
    fn parameters(&self) -> &Parameters;

    /// Human readable title of a dimension value, the value itself by default
    fn parameter_title(&self, _id: &str, value: &str) -> String {
        value.to_string()
    }

    /// Stream the records of one query
    ///
    /// Extra-data producers for the query are started through `extra`.
    fn query(&self, query: CostQuery, extra: &mut ExtraDataScope) -> RecordStream<'_>;

    /// Turn the merged extra data of a whole aggregation into report output
    ///
    /// Called once per aggregation. The default gives one section per
    /// non-empty datum, titled by its kind.
    async fn finalize_extra_output(&self, collected: Vec<ExtraDatum>) -> Option<ExtraOutput> {
        let sections: Vec<ExtraSection> = collected
            .into_iter()
            .filter(|datum| !datum.is_empty())
            .map(|datum| ExtraSection {
                title: datum.kind.clone(),
                datum,
            })
            .collect();
        (!sections.is_empty()).then_some(ExtraOutput { sections })
    }
}

/// Check a group selection against a backend's declared dimensions
pub fn validate_groups(backend: &dyn BillingBackend, groups: &[GroupDimension]) -> Result<()> {
    if groups.is_empty() {
        return Err(CloudCostError::NoGroups);
    }
    match backend.max_group_by() {
        Some(max) if groups.len() > max => {
            return Err(CloudCostError::TooManyGroups {
                backend: backend.name().to_string(),
                max,
                requested: groups.len(),
            });
        }
        _ => {}
    }
    for group in groups {
        match backend.parameters().find_by_id(&group.id) {
            Some(parameter) if parameter.is_group => {
                if parameter.data_required && group.data.as_deref().is_none_or(str::is_empty) {
                    return Err(CloudCostError::InvalidGroup(group.to_string()));
                }
            }
            _ => return Err(CloudCostError::InvalidGroup(group.to_string())),
        }
    }
    Ok(())
}
