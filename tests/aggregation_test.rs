//! Integration tests for the aggregation engine through its public API

mod common;

use cloudcost_core::aggregation::{AggregateRequest, Aggregator, PeriodMismatch, fail_on_period_mismatch};
use cloudcost_core::backend::{BillingBackend, CostQuery};
use cloudcost_core::extra_data::{ExtraDataScope, ExtraEntry};
use cloudcost_core::period::generate_repeats;
use cloudcost_core::types::{DateInterval, Granularity, GroupDimension, PeriodGroup};
use cloudcost_core::CloudCostError;
use cloudcost_provider_ledger::LedgerBackend;
use common::{MockBackend, date, record, sample_ledger};
use futures::StreamExt;
use std::sync::{Arc, Mutex};

fn interval(start: (u32, u32), end: (u32, u32)) -> DateInterval {
    DateInterval::new(date(2024, start.0, start.1), date(2024, end.0, end.1)).unwrap()
}

fn by_service(period_groups: Vec<PeriodGroup>) -> AggregateRequest {
    AggregateRequest::new(period_groups, vec![GroupDimension::new("SERVICE")])
}

#[tokio::test]
async fn test_this_and_previous_window() {
    // "This" 3-day window first, the previous one second
    let this = interval((1, 4), (1, 6));
    let previous = interval((1, 1), (1, 3));
    let backend = MockBackend::new(vec![
        record(2024, 1, 1, &["EC2"], 7.0),
        record(2024, 1, 4, &["EC2"], 10.0),
        record(2024, 1, 4, &["S3"], 5.0),
        record(2024, 1, 5, &["EC2"], 12.0),
    ]);

    let result = Aggregator::new()
        .aggregate(
            &backend,
            &by_service(vec![
                PeriodGroup::single(this.clone()),
                PeriodGroup::single(previous.clone()),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(result.items.len(), 2);
    assert_eq!(result.items[0].keys[0].id, "EC2");
    assert_eq!(result.items[0].values, vec![22.0, 7.0]);
    assert_eq!(result.items[1].keys[0].id, "S3");
    assert_eq!(result.items[1].values, vec![5.0, 0.0]);
    assert_eq!(result.periods[0].total_value, 27.0);
    assert_eq!(result.periods[1].total_value, 7.0);
    assert_eq!(result.total_value, 34.0);
    assert!(result.periods_same_duration);

    let queries = backend.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].interval, this);
    assert_eq!(queries[0].granularity, Granularity::Interval);
    assert_eq!(queries[1].interval, previous);
}

#[tokio::test]
async fn test_column_sums_match_totals() {
    let repeats = generate_repeats(&interval((1, 8), (1, 14)), 3).unwrap();
    // Only the days the repeats cover, Dec 25 to Jan 14
    let records: Vec<_> = (1..=14)
        .flat_map(|day| {
            [
                record(2024, 1, day, &["EC2", "111"], day as f64),
                record(2024, 1, day, &["S3", "222"], 0.5),
            ]
        })
        .collect();
    let backend = MockBackend::new(records);

    let request = AggregateRequest::new(
        vec![PeriodGroup::new(repeats)],
        vec![
            GroupDimension::new("SERVICE"),
            GroupDimension::new("LINKED_ACCOUNT"),
        ],
    );
    let result = Aggregator::new().aggregate(&backend, &request).await.unwrap();

    assert_eq!(backend.query_count(), 1);
    assert_eq!(backend.queries()[0].granularity, Granularity::Daily);
    for (column, period) in result.periods.iter().enumerate() {
        let sum: f64 = result.items.iter().map(|item| item.values[column]).sum();
        assert!((sum - period.total_value).abs() < 1e-9);
    }
    let columns: f64 = result.periods.iter().map(|p| p.total_value).sum();
    assert!((columns - result.total_value).abs() < 1e-9);
    // 1 + 2 + ... + 14 plus 14 halves
    assert_eq!(result.total_value, 105.0 + 7.0);
}

#[tokio::test]
async fn test_overlap_calls_hook_once() {
    let first = interval((1, 1), (1, 5));
    let second = interval((1, 5), (1, 9));
    let backend = MockBackend::new(vec![record(2024, 1, 5, &["EC2"], 3.0)]);

    let mismatches: Arc<Mutex<Vec<PeriodMismatch>>> = Arc::default();
    let seen = mismatches.clone();
    let aggregator = Aggregator::new().with_period_mismatch_hook(move |mismatch| {
        seen.lock().unwrap().push(mismatch.clone());
        Ok(())
    });

    let result = aggregator
        .aggregate(&backend, &by_service(vec![PeriodGroup::new(vec![first, second])]))
        .await
        .unwrap();

    let mismatches = mismatches.lock().unwrap();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].match_count, 2);
    assert_eq!(mismatches[0].group_index, 0);
    assert_eq!(result.items[0].values, vec![3.0, 3.0]);
    assert_eq!(result.total_value, 3.0);
}

#[tokio::test]
async fn test_strict_periods_abort() {
    let group = PeriodGroup::new(vec![interval((1, 1), (1, 2)), interval((1, 4), (1, 5))]);
    // Jan 3 falls between the two intervals of the group
    let backend = MockBackend::new(vec![
        record(2024, 1, 1, &["EC2"], 1.0),
        record(2024, 1, 3, &["EC2"], 1.0),
    ]);

    let err = Aggregator::new()
        .with_period_mismatch_hook(fail_on_period_mismatch)
        .aggregate(&backend, &by_service(vec![group]))
        .await
        .unwrap_err();
    match err {
        CloudCostError::PeriodMismatch {
            date: mismatch_date,
            match_count,
            ..
        } => {
            assert_eq!(mismatch_date, date(2024, 1, 3));
            assert_eq!(match_count, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_backend_failure_stops_later_groups() {
    let backend = MockBackend::new(vec![
        record(2024, 1, 1, &["EC2"], 1.0),
        record(2024, 1, 2, &["EC2"], 1.0),
        record(2024, 1, 8, &["EC2"], 1.0),
    ])
    .failing(0, 1);

    let err = Aggregator::new()
        .aggregate(
            &backend,
            &by_service(vec![
                PeriodGroup::single(interval((1, 1), (1, 3))),
                PeriodGroup::single(interval((1, 7), (1, 9))),
            ]),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CloudCostError::PeriodGroup { index: 0, .. }));
    assert!(err.to_string().contains("Jan 1-Jan 3"));
    assert_eq!(backend.query_count(), 1);
}

#[tokio::test]
async fn test_invalid_groups_issue_no_queries() {
    let backend = MockBackend::new(vec![record(2024, 1, 1, &["EC2"], 1.0)]);
    let periods = vec![PeriodGroup::single(interval((1, 1), (1, 3)))];

    let unknown = AggregateRequest::new(periods.clone(), vec![GroupDimension::new("COLOR")]);
    let err = Aggregator::new().aggregate(&backend, &unknown).await.unwrap_err();
    assert!(matches!(err, CloudCostError::InvalidGroup(_)));

    let missing_data = AggregateRequest::new(periods.clone(), vec![GroupDimension::new("TAG")]);
    let err = Aggregator::new()
        .aggregate(&backend, &missing_data)
        .await
        .unwrap_err();
    assert!(err.is_configuration());

    let no_periods = AggregateRequest::new(Vec::new(), vec![GroupDimension::new("SERVICE")]);
    let err = Aggregator::new().aggregate(&backend, &no_periods).await.unwrap_err();
    assert!(matches!(err, CloudCostError::NoPeriods));

    assert_eq!(backend.query_count(), 0);
}

#[tokio::test]
async fn test_aggregation_is_idempotent() {
    let backend = MockBackend::new(vec![
        record(2024, 1, 1, &["EC2"], 1.25),
        record(2024, 1, 2, &["S3"], 2.5),
        record(2024, 1, 9, &["EC2"], 4.0),
    ])
    .with_tags(vec![ExtraEntry::new("env", ["prod"])]);
    let request = by_service(vec![
        PeriodGroup::single(interval((1, 1), (1, 7))),
        PeriodGroup::single(interval((1, 8), (1, 14))),
    ]);

    let aggregator = Aggregator::new();
    let first = aggregator.aggregate(&backend, &request).await.unwrap();
    let second = aggregator.aggregate(&backend, &request).await.unwrap();

    assert_eq!(first.items, second.items);
    assert_eq!(first.periods, second.periods);
    assert_eq!(first.total_value, second.total_value);
    assert_eq!(first.extra_output, second.extra_output);
    let extra = first.extra_output.unwrap();
    assert_eq!(extra.sections[0].datum.entries["env"].len(), 1);
}

#[tokio::test]
async fn test_ledger_stream_stops_early() {
    let backend = LedgerBackend::from_ledger(sample_ledger()).with_page_size(1);
    let query = CostQuery::new(interval((2, 1), (2, 28)), Granularity::Daily)
        .with_groups(vec![GroupDimension::new("SERVICE")]);

    let mut scope = ExtraDataScope::disabled();
    let records: Vec<_> = backend.query(query, &mut scope).take(2).collect().await;

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(Result::is_ok));
    // One page per record, no page fetched past what was consumed
    assert_eq!(backend.api().calls(), 2);
}

#[tokio::test]
async fn test_ledger_repeat_report() {
    let backend = LedgerBackend::from_ledger(sample_ledger()).with_page_size(7);
    let request = AggregateRequest::new(
        vec![PeriodGroup::new(generate_repeats(&interval((2, 15), (2, 28)), 2).unwrap())],
        vec![
            GroupDimension::new("SERVICE"),
            GroupDimension::new("LINKED_ACCOUNT"),
        ],
    );

    let result = Aggregator::new().aggregate(&backend, &request).await.unwrap();

    let row = |service: &str, account: &str| {
        result
            .items
            .iter()
            .find(|item| item.keys[0].id == service && item.keys[1].id == account)
            .map(|item| item.values.clone())
    };
    assert_eq!(row("Amazon EC2", "111"), Some(vec![140.0, 140.0]));
    assert_eq!(row("Amazon EC2", "222"), Some(vec![56.0, 56.0]));
    assert_eq!(row("Amazon S3", "111"), Some(vec![0.0, 14.0]));
    assert_eq!(result.total_value, 280.0 + 112.0 + 14.0);

    // Account ids are displayed with their names
    let staging = result
        .items
        .iter()
        .find(|item| item.keys[1].id == "222")
        .unwrap();
    assert_eq!(staging.keys[1].display, "Staging");
}
