//! Shared test utilities for unit tests
//!
//! This module provides a scripted billing backend for unit tests within the crate.
//!
//! Note: Integration tests (in tests/) cannot access this module because it's
//! marked with #[cfg(test)]. Integration tests have their own copy in
//! tests/common/mod.rs.

use crate::backend::{BillingBackend, CostQuery, RecordStream};
use crate::error::CloudCostError;
use crate::extra_data::{ExtraDataScope, ExtraEntry};
use crate::types::{Granularity, ItemKey, Parameters, RawRecord};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Record keyed by plain ids
pub fn record(y: i32, m: u32, d: u32, ids: &[&str], value: f64) -> RawRecord {
    RawRecord::new(
        date(y, m, d),
        ids.iter().map(|id| ItemKey::from_id(*id)),
        value,
    )
}

/// Backend serving a fixed list of daily records
///
/// Each query yields the records dated within its interval, in list order.
/// At interval granularity they are reported on the interval start.
pub struct MockBackend {
    parameters: Parameters,
    max_group_by: Option<usize>,
    records: Vec<RawRecord>,
    fail_query: Option<(usize, usize)>,
    tags: Vec<ExtraEntry>,
    pub queries: Arc<Mutex<Vec<CostQuery>>>,
    pub yielded: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new(parameters: Parameters) -> Self {
        Self {
            parameters,
            max_group_by: None,
            records: Vec::new(),
            fail_query: None,
            tags: Vec::new(),
            queries: Arc::default(),
            yielded: Arc::default(),
        }
    }

    pub fn with_max_group_by(mut self, max: usize) -> Self {
        self.max_group_by = Some(max);
        self
    }

    pub fn with_records(mut self, records: Vec<RawRecord>) -> Self {
        self.records = records;
        self
    }

    /// Make query number `query` (0-based) fail after yielding `after` records
    pub fn failing(mut self, query: usize, after: usize) -> Self {
        self.fail_query = Some((query, after));
        self
    }

    /// Tag entries reported through a `TAG` producer on every query
    pub fn with_tags(mut self, tags: Vec<ExtraEntry>) -> Self {
        self.tags = tags;
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl BillingBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn max_group_by(&self) -> Option<usize> {
        self.max_group_by
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn query(&self, query: CostQuery, extra: &mut ExtraDataScope) -> RecordStream<'_> {
        let index = {
            let mut queries = self.queries.lock().unwrap();
            queries.push(query.clone());
            queries.len() - 1
        };
        if !self.tags.is_empty() {
            let tags: Vec<_> = self.tags.iter().cloned().map(Ok).collect();
            extra.spawn("TAG", futures::stream::iter(tags));
        }

        let fail_after = match self.fail_query {
            Some((query, after)) if query == index => Some(after),
            _ => None,
        };
        let yielded = self.yielded.clone();
        Box::pin(async_stream::stream! {
            let mut sent = 0;
            for record in self.records.iter().filter(|r| query.interval.contains(r.date)) {
                if fail_after == Some(sent) {
                    yield Err(CloudCostError::backend("mock query", "scripted failure"));
                    return;
                }
                let mut record = record.clone();
                if query.granularity == Granularity::Interval {
                    record.date = query.interval.start;
                }
                yielded.fetch_add(1, Ordering::SeqCst);
                sent += 1;
                yield Ok(record);
            }
            if fail_after == Some(sent) {
                yield Err(CloudCostError::backend("mock query", "scripted failure"));
            }
        })
    }
}
