//! Report assembly
//!
//! Turns parsed [`ReportArgs`] into an [`AggregateRequest`] and an [`Aggregator`],
//! runs it against a backend and applies the row view options (search,
//! minimum cost, ordering) to the pivot.

use crate::cli::{ReportArgs, SortOrder};
use chrono::NaiveDate;
use cloudcost_core::aggregation::{AggregateRequest, Aggregator, fail_on_period_mismatch};
use cloudcost_core::aggregation_types::PivotResult;
use cloudcost_core::backend::BillingBackend;
use cloudcost_core::error::{CloudCostError, Result};
use cloudcost_core::period::default_anchor;
use cloudcost_core::types::GroupDimension;
use tracing::{debug, info};

/// A computed report and the description of its periods
#[derive(Debug, Clone)]
pub struct Report {
    pub description: String,
    pub result: PivotResult,
}

/// Group dimensions of the report, the backend's default group when none were given
pub fn report_groups(
    backend: &dyn BillingBackend,
    args: &ReportArgs,
) -> Result<Vec<GroupDimension>> {
    if !args.group.is_empty() {
        return Ok(args.group.clone());
    }
    let parameters = backend.parameters();
    let default = parameters.default_group().ok_or(CloudCostError::NoGroups)?;
    debug!("No group given, using default group {}", default.id);
    Ok(vec![GroupDimension::new(default.id.clone())])
}

/// Build the aggregation request for `args`, anchoring relative periods on `today`
pub fn build_request(
    backend: &dyn BillingBackend,
    args: &ReportArgs,
    today: NaiveDate,
) -> Result<(AggregateRequest, String)> {
    args.validate()?;
    let anchor = match args.anchor {
        Some(anchor) => anchor,
        None => default_anchor(today, backend.days_delay(), args.skip_days)?,
    };
    let (period_groups, description) = args.period_selection()?.resolve(anchor)?;
    let groups = report_groups(backend, args)?;

    let request = AggregateRequest::new(period_groups, groups).with_filters(args.filter.clone());
    Ok((request, description))
}

/// Aggregator configured from `args`
pub fn build_aggregator(args: &ReportArgs, show_progress: bool) -> Aggregator {
    let aggregator = Aggregator::new()
        .with_extra_data(!args.no_extra)
        .with_progress(show_progress);
    if args.strict_periods {
        aggregator.with_period_mismatch_hook(fail_on_period_mismatch)
    } else {
        aggregator
    }
}

/// Filter and order the rows of a pivot
pub fn apply_view(result: &mut PivotResult, args: &ReportArgs) {
    if let Some(search) = args.search.as_deref().filter(|s| !s.is_empty()) {
        result.retain_search(search);
    }
    if let Some(min_cost) = args.min_cost {
        result.items.retain(|item| item.total() >= min_cost);
    }

    let last = result.periods.len().saturating_sub(1);
    match args.sort {
        SortOrder::Last => result.sort_by_period_desc(last),
        SortOrder::Total => result.sort_by_total_desc(),
        SortOrder::Diff => result.sort_by_diff_desc(last, false),
        SortOrder::DiffPct => result.sort_by_diff_desc(last, true),
    }
}

/// Run a full report against `backend`
pub async fn run_report(
    backend: &dyn BillingBackend,
    args: &ReportArgs,
    today: NaiveDate,
    show_progress: bool,
) -> Result<Report> {
    let (request, description) = build_request(backend, args, today)?;
    info!(
        "Running report over {} period(s) ({description}) on backend {}",
        request.period_count(),
        backend.name()
    );

    let mut result = build_aggregator(args, show_progress)
        .aggregate(backend, &request)
        .await?;
    apply_view(&mut result, args);
    Ok(Report {
        description,
        result,
    })
}
