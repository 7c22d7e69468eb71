//! Multi-period cost aggregation
//!
//! The [`Aggregator`] queries a [`BillingBackend`] once per period group and
//! pivots the returned records into one row per distinct key sequence and one
//! column per period.
//!
//! Columns are laid out across all period groups in request order. A group
//! holding a single interval is queried at interval granularity and every
//! record lands in its column. A group holding several intervals is queried
//! day by day over its span and each record lands in every interval that
//! contains its date. Records matching no interval, or more than one, are
//! reported to the period mismatch hook.
//!
//! # Examples
//!
//! ```no_run
//! use cloudcost_core::aggregation::{AggregateRequest, Aggregator, fail_on_period_mismatch};
//! use cloudcost_core::backend::BillingBackend;
//! use cloudcost_core::period::PeriodSelection;
//! use cloudcost_core::types::GroupDimension;
//! use chrono::NaiveDate;
//!
//! # async fn example(backend: &dyn BillingBackend) -> cloudcost_core::Result<()> {
//! let anchor = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
//! let (period_groups, _) = PeriodSelection::new("d14").resolve(anchor)?;
//! let request = AggregateRequest::new(period_groups, vec![GroupDimension::new("SERVICE")]);
//!
//! let aggregator = Aggregator::new().with_period_mismatch_hook(fail_on_period_mismatch);
//! let result = aggregator.aggregate(backend, &request).await?;
//! println!("{} rows, total {:.2}", result.items.len(), result.total_value);
//! # Ok(())
//! # }
//! ```

use crate::aggregation_types::{Item, PivotResult, ResultGroup, ResultPeriod};
use crate::backend::{BillingBackend, CostQuery, validate_groups};
use crate::error::{CloudCostError, Result};
use crate::extra_data::{DEFAULT_QUEUE_CAPACITY, ExtraDataMerger, ExtraDataScope};
use crate::identity::{DefaultKeysHasher, KeysHasher, RowId};
use crate::types::{Filter, Granularity, GroupDimension, ItemKey, PeriodGroup, RawRecord};
use futures::stream::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Everything one aggregation needs besides the backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateRequest {
    /// Period groups, in column order
    pub period_groups: Vec<PeriodGroup>,
    /// Group-by dimensions, in key order
    pub groups: Vec<GroupDimension>,
    pub filters: Vec<Filter>,
}

impl AggregateRequest {
    pub fn new(period_groups: Vec<PeriodGroup>, groups: Vec<GroupDimension>) -> Self {
        Self {
            period_groups,
            groups,
            filters: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    /// Number of period columns the result will have
    pub fn period_count(&self) -> usize {
        self.period_groups.iter().map(PeriodGroup::len).sum()
    }
}

/// Record of a multi-interval group that did not land in exactly one interval
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodMismatch {
    pub record: RawRecord,
    /// Number of intervals containing the record date
    pub match_count: usize,
    /// Position of the period group in the request
    pub group_index: usize,
}

impl PeriodMismatch {
    pub fn into_error(self) -> CloudCostError {
        CloudCostError::PeriodMismatch {
            date: self.record.date,
            keys: self.record.key_ids(),
            match_count: self.match_count,
        }
    }
}

/// Mismatch hook that aborts the aggregation on the first mismatch
pub fn fail_on_period_mismatch(mismatch: &PeriodMismatch) -> Result<()> {
    Err(mismatch.clone().into_error())
}

type KeyFilter = Arc<dyn Fn(&[ItemKey]) -> bool + Send + Sync>;
type MismatchHook = Arc<dyn Fn(&PeriodMismatch) -> Result<()> + Send + Sync>;

/// Pivot table under construction
struct PivotBuilder {
    rows: HashMap<RowId, usize>,
    items: Vec<Item>,
    periods: Vec<ResultPeriod>,
    total_value: f64,
}

impl PivotBuilder {
    fn new(periods: Vec<ResultPeriod>) -> Self {
        Self {
            rows: HashMap::new(),
            items: Vec::new(),
            periods,
            total_value: 0.0,
        }
    }

    /// Row index for `keys`, creating the row on first sighting
    fn row(&mut self, hasher: &dyn KeysHasher, keys: &[ItemKey]) -> usize {
        let id = hasher.hash_keys(keys);
        if let Some(&index) = self.rows.get(&id) {
            return index;
        }
        let index = self.items.len();
        self.items
            .push(Item::new(keys.iter().cloned().collect(), self.periods.len()));
        self.rows.insert(id, index);
        index
    }

    fn add(&mut self, row: usize, column: usize, value: f64) {
        self.items[row].values[column] += value;
        self.periods[column].total_value += value;
    }
}

/// Multi-period aggregation engine
pub struct Aggregator {
    hasher: Arc<dyn KeysHasher>,
    key_filter: Option<KeyFilter>,
    on_period_mismatch: Option<MismatchHook>,
    extra_data: bool,
    extra_data_capacity: usize,
    show_progress: bool,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    /// Aggregator hashing rows with [`DefaultKeysHasher`] and collecting extra data
    pub fn new() -> Self {
        Self {
            hasher: Arc::new(DefaultKeysHasher),
            key_filter: None,
            on_period_mismatch: None,
            extra_data: true,
            extra_data_capacity: DEFAULT_QUEUE_CAPACITY,
            show_progress: false,
        }
    }

    /// Use a different row identity
    pub fn with_hasher(mut self, hasher: impl KeysHasher + 'static) -> Self {
        self.hasher = Arc::new(hasher);
        self
    }

    /// Drop records whose keys do not satisfy `filter` before they reach any total
    pub fn with_key_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&[ItemKey]) -> bool + Send + Sync + 'static,
    {
        self.key_filter = Some(Arc::new(filter));
        self
    }

    /// Called for every record of a multi-interval group not matching exactly one
    /// interval; an error aborts the aggregation
    pub fn with_period_mismatch_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&PeriodMismatch) -> Result<()> + Send + Sync + 'static,
    {
        self.on_period_mismatch = Some(Arc::new(hook));
        self
    }

    /// Enable or disable extra-data collection
    pub fn with_extra_data(mut self, enabled: bool) -> Self {
        self.extra_data = enabled;
        self
    }

    /// Queue capacity of each extra-data producer
    pub fn with_extra_data_capacity(mut self, capacity: usize) -> Self {
        self.extra_data_capacity = capacity;
        self
    }

    /// Enable or disable progress bars
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Run every period group of `request` against `backend` and pivot the results
    ///
    /// Fails before any backend call when the request has no periods, no groups,
    /// or groups the backend cannot group on. A backend failure aborts the whole
    /// aggregation and is wrapped with the index and span of its period group.
    pub async fn aggregate(
        &self,
        backend: &dyn BillingBackend,
        request: &AggregateRequest,
    ) -> Result<PivotResult> {
        if request.period_count() == 0 {
            return Err(CloudCostError::NoPeriods);
        }
        validate_groups(backend, &request.groups)?;

        let groups = request
            .groups
            .iter()
            .map(|group| {
                backend
                    .parameters()
                    .find_by_id(&group.id)
                    .map(|parameter| ResultGroup {
                        parameter: parameter.clone(),
                        data: group.data.clone(),
                    })
                    .ok_or_else(|| CloudCostError::InvalidGroup(group.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let periods: Vec<ResultPeriod> = request
            .period_groups
            .iter()
            .flat_map(|group| group.intervals.iter())
            .map(|interval| ResultPeriod {
                interval: interval.clone(),
                total_value: 0.0,
            })
            .collect();
        let periods_same_duration = periods
            .windows(2)
            .all(|pair| pair[0].interval.days() == pair[1].interval.days());

        debug!(
            "Aggregating {} period group(s), {} column(s) from {}",
            request.period_groups.len(),
            periods.len(),
            backend.name()
        );

        let progress = if self.show_progress {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg} [{elapsed_precise}] {pos} records processed")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message(format!("Querying {}", backend.name()));
            Some(pb)
        } else {
            None
        };

        let mut scope = if self.extra_data {
            ExtraDataScope::new(self.extra_data_capacity)
        } else {
            ExtraDataScope::disabled()
        };
        let mut merger = ExtraDataMerger::new();
        let mut pivot = PivotBuilder::new(periods);
        let mut record_count = 0u64;
        let mut offset = 0;

        for (index, group) in request.period_groups.iter().enumerate() {
            let Some(span) = group.span() else {
                debug!("Skipping empty period group {index}");
                continue;
            };
            let granularity = if group.is_single() {
                Granularity::Interval
            } else {
                Granularity::Daily
            };
            let label = span.to_string();
            debug!("Querying period group {index} ({label}) at {granularity} granularity");

            let query = CostQuery::new(span, granularity)
                .with_groups(request.groups.clone())
                .with_filters(request.filters.clone());
            let mut records = backend.query(query, &mut scope);

            while let Some(record) = records.next().await {
                let record = record.map_err(|e| CloudCostError::PeriodGroup {
                    index,
                    span: label.clone(),
                    source: Box::new(e),
                })?;
                record_count += 1;
                self.accumulate(&mut pivot, record, group, index, offset)?;

                if let Some(ref pb) = progress {
                    pb.set_position(record_count);
                }
            }
            drop(records);

            merger.extend(scope.collect().await);
            offset += group.len();
        }

        let extra_output = if self.extra_data {
            backend.finalize_extra_output(merger.finish()).await
        } else {
            None
        };

        if let Some(pb) = progress {
            pb.finish_with_message(format!(
                "Aggregated {} records into {} rows",
                record_count,
                pivot.items.len()
            ));
        }
        info!(
            "Aggregated {} records into {} rows over {} periods",
            record_count,
            pivot.items.len(),
            pivot.periods.len()
        );

        Ok(PivotResult {
            items: pivot.items,
            total_value: pivot.total_value,
            groups,
            periods_same_duration,
            periods: pivot.periods,
            extra_output,
        })
    }

    /// Attribute one record of period group `group_index`, whose first column is `offset`
    fn accumulate(
        &self,
        pivot: &mut PivotBuilder,
        record: RawRecord,
        group: &PeriodGroup,
        group_index: usize,
        offset: usize,
    ) -> Result<()> {
        let accepted = self.key_filter.as_ref().is_none_or(|filter| filter(&record.keys));
        if !accepted {
            trace!("Record for [{}] rejected by key filter", record.key_ids());
            return Ok(());
        }

        pivot.total_value += record.value;
        let row = pivot.row(self.hasher.as_ref(), &record.keys);

        if group.is_single() {
            pivot.add(row, offset, record.value);
            return Ok(());
        }

        let mut match_count = 0;
        for (i, interval) in group.intervals.iter().enumerate() {
            if interval.contains(record.date) {
                pivot.add(row, offset + i, record.value);
                match_count += 1;
            }
        }
        if match_count == 1 {
            return Ok(());
        }

        let mismatch = PeriodMismatch {
            record,
            match_count,
            group_index,
        };
        match &self.on_period_mismatch {
            Some(hook) => hook(&mismatch),
            None => {
                warn!(
                    "Record dated {} for [{}] matched {} periods in group {}",
                    mismatch.record.date,
                    mismatch.record.key_ids(),
                    mismatch.match_count,
                    mismatch.group_index
                );
                Ok(())
            }
        }
    }
}
