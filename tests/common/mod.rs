//! Common test utilities for cloudcost integration tests
//!
//! A copy of the scripted backend from `cloudcost-core`'s unit test utilities,
//! which are not visible outside that crate, plus ledger fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use cloudcost_core::backend::{BillingBackend, CostQuery, RecordStream};
use cloudcost_core::error::CloudCostError;
use cloudcost_core::extra_data::{ExtraDataScope, ExtraEntry};
use cloudcost_core::types::{DimensionParameter, Granularity, ItemKey, Parameters, RawRecord};
use cloudcost_provider_ledger::{Ledger, LineItem};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn record(y: i32, m: u32, d: u32, ids: &[&str], value: f64) -> RawRecord {
    RawRecord::new(
        date(y, m, d),
        ids.iter().map(|id| ItemKey::from_id(*id)),
        value,
    )
}

/// Service and account dimensions, service first by default
pub fn parameters() -> Parameters {
    Parameters::new(vec![
        DimensionParameter::group("SERVICE", "Service").with_default_priority(1),
        DimensionParameter::group("LINKED_ACCOUNT", "Account"),
        DimensionParameter::group("TAG", "Tag").with_data(true),
    ])
}

/// Backend serving a fixed list of daily records
pub struct MockBackend {
    parameters: Parameters,
    records: Vec<RawRecord>,
    fail_query: Option<(usize, usize)>,
    tags: Vec<ExtraEntry>,
    pub queries: Arc<Mutex<Vec<CostQuery>>>,
    pub yielded: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            parameters: parameters(),
            records,
            fail_query: None,
            tags: Vec::new(),
            queries: Arc::default(),
            yielded: Arc::default(),
        }
    }

    /// Make query number `query` (0-based) fail after yielding `after` records
    pub fn failing(mut self, query: usize, after: usize) -> Self {
        self.fail_query = Some((query, after));
        self
    }

    pub fn with_tags(mut self, tags: Vec<ExtraEntry>) -> Self {
        self.tags = tags;
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<CostQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl BillingBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
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

/// Ledger with 28 days of EC2 in two accounts and S3 starting on day 15
pub fn sample_ledger() -> Ledger {
    let mut ledger = Ledger::default();
    ledger.accounts.insert("111".into(), "Production".into());
    ledger.accounts.insert("222".into(), "Staging".into());

    for day in 1..=28 {
        ledger.line_items.push(
            LineItem::new(date(2024, 2, day), 10.0)
                .with_dimension("LINKED_ACCOUNT", "111")
                .with_dimension("SERVICE", "Amazon EC2")
                .with_dimension("REGION", "us-east-1")
                .with_tag("env", "prod"),
        );
        ledger.line_items.push(
            LineItem::new(date(2024, 2, day), 4.0)
                .with_dimension("LINKED_ACCOUNT", "222")
                .with_dimension("SERVICE", "Amazon EC2")
                .with_dimension("REGION", "eu-west-1")
                .with_tag("env", "dev"),
        );
        if day >= 15 {
            ledger.line_items.push(
                LineItem::new(date(2024, 2, day), 1.0)
                    .with_dimension("LINKED_ACCOUNT", "111")
                    .with_dimension("SERVICE", "Amazon S3")
                    .with_dimension("REGION", "us-east-1")
                    .with_tag("env", "prod")
                    .with_tag("team", "storage"),
            );
        }
    }
    ledger
}

/// Write a ledger to a temporary JSON file
pub fn ledger_file(ledger: &Ledger) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string(ledger).unwrap().as_bytes())
        .unwrap();
    file
}
