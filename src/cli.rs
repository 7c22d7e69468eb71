//! CLI interface for cloudcost
//!
//! ```bash
//! # Last 14 days by service, compared with the 14 days before
//! cloudcost --ledger costs.json report --group SERVICE --compare d14 --diff
//!
//! # Four consecutive weeks by account and tag, as JSON
//! cloudcost report --period d7 --repeat 4 --group LINKED_ACCOUNT --group 'TAG|env' --json
//!
//! # Dimensions available for --group and --filter
//! cloudcost parameters
//! ```

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use cloudcost_core::period::{Comparison, DEFAULT_PERIOD, PeriodSelection};
use cloudcost_core::types::{Filter, GroupDimension};
use cloudcost_core::{CloudCostError, Result};
use std::path::PathBuf;

/// Pivoted multi-period cloud cost reports
#[derive(Parser, Debug, Clone)]
#[command(name = "cloudcost")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Show informational output (default is quiet mode with only warnings and errors)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Ledger file with the cost line items
    #[arg(long, env = "CLOUDCOST_LEDGER", global = true)]
    pub ledger: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Pivot costs by dimension over one or more periods
    Report(ReportArgs),
    /// List the dimensions the backend can group and filter by
    Parameters,
}

/// Row ordering of a report
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Most expensive in the last period first
    #[default]
    Last,
    /// Most expensive over all periods first
    Total,
    /// Largest change of the last period first
    Diff,
    /// Largest relative change of the last period first
    DiffPct,
}

/// Arguments for the report command
#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Period: d<days>, m<months>, M<yyyymm> or T<yyyy-mm-dd>[|<yyyy-mm-dd>]
    #[arg(long, short = 'p', default_value = DEFAULT_PERIOD)]
    pub period: String,

    /// Period to compare with, anchored on the day before the main period (repeatable)
    #[arg(long, short = 'c', conflicts_with = "repeat")]
    pub compare: Vec<String>,

    /// Repeat the period this many times backward
    #[arg(long, short = 'r')]
    pub repeat: Option<usize>,

    /// Extra days to skip back from today before anchoring relative periods
    #[arg(long, default_value_t = 0)]
    pub skip_days: i64,

    /// Anchor relative periods on this date instead of today minus the skipped days
    #[arg(long)]
    pub anchor: Option<NaiveDate>,

    /// Dimension to group by, `ID` or `ID|data` (repeatable)
    #[arg(long, short = 'g')]
    pub group: Vec<GroupDimension>,

    /// Dimension filter, `ID=value` (repeatable)
    #[arg(long, short = 'f')]
    pub filter: Vec<Filter>,

    /// Fail when a record of a repeated period does not fall in exactly one interval
    #[arg(long)]
    pub strict_periods: bool,

    /// Skip supplementary output such as tag listings
    #[arg(long)]
    pub no_extra: bool,

    /// Page size used against the billing API
    #[arg(long, default_value_t = 100)]
    pub page_size: usize,

    /// Row ordering
    #[arg(long, value_enum, default_value_t = SortOrder::Last)]
    pub sort: SortOrder,

    /// Show the change against the previous period
    #[arg(long)]
    pub diff: bool,

    /// Only rows whose keys contain this text (case insensitive)
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Hide rows whose total is below this amount
    #[arg(long)]
    pub min_cost: Option<f64>,
}

impl ReportArgs {
    /// Period selection described by `--period`, `--compare` and `--repeat`
    pub fn period_selection(&self) -> Result<PeriodSelection> {
        let comparison = match self.repeat {
            Some(0) => {
                return Err(CloudCostError::InvalidArgument(
                    "--repeat must be positive".to_string(),
                ));
            }
            Some(count) => Comparison::Repeat(count),
            None => Comparison::parse(&self.compare)?,
        };
        Ok(PeriodSelection::new(self.period.clone()).with_comparison(comparison))
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(CloudCostError::InvalidArgument(
                "--page-size must be positive".to_string(),
            ));
        }
        if self.skip_days < 0 {
            return Err(CloudCostError::InvalidArgument(
                "--skip-days cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(args: &[&str]) -> ReportArgs {
        let cli = Cli::parse_from(std::iter::once("cloudcost").chain(args.iter().copied()));
        match cli.command {
            Command::Report(args) => args,
            other => panic!("expected report command, got {other:?}"),
        }
    }

    #[test]
    fn test_report_defaults() {
        let args = report(&["report"]);
        assert_eq!(args.period, "d14");
        assert!(args.compare.is_empty());
        assert!(args.group.is_empty());
        assert_eq!(args.page_size, 100);
        assert_eq!(args.sort, SortOrder::Last);
        assert_eq!(
            args.period_selection().unwrap().comparison,
            Comparison::None
        );
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_report_groups_and_filters() {
        let args = report(&[
            "report",
            "--group",
            "SERVICE",
            "-g",
            "TAG|env",
            "--filter",
            "LINKED_ACCOUNT=111",
            "--sort",
            "diff-pct",
        ]);
        assert_eq!(args.group[0], GroupDimension::new("SERVICE"));
        assert_eq!(args.group[1], GroupDimension::with_data("TAG", "env"));
        assert_eq!(args.filter, vec![Filter::new("LINKED_ACCOUNT", "111")]);
        assert_eq!(args.sort, SortOrder::DiffPct);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let result = Cli::try_parse_from(["cloudcost", "report", "--filter", "SERVICE"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_comparisons() {
        let args = report(&["report", "--period", "d7", "--repeat", "4"]);
        assert_eq!(
            args.period_selection().unwrap().comparison,
            Comparison::Repeat(4)
        );

        let args = report(&["report", "--compare", "R3"]);
        assert_eq!(
            args.period_selection().unwrap().comparison,
            Comparison::Repeat(3)
        );

        let args = report(&["report", "-c", "d14", "-c", "M202401"]);
        assert_eq!(
            args.period_selection().unwrap().comparison,
            Comparison::Periods(vec!["d14".to_string(), "M202401".to_string()])
        );

        assert!(Cli::try_parse_from(["cloudcost", "report", "--repeat", "2", "--compare", "d7"]).is_err());
        assert!(report(&["report", "--repeat", "0"]).period_selection().is_err());
    }

    #[test]
    fn test_validate() {
        assert!(report(&["report", "--page-size", "0"]).validate().is_err());
        assert!(report(&["report", "--skip-days=-1"]).validate().is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["cloudcost", "parameters", "--json", "--ledger", "costs.json"]);
        assert!(cli.json);
        assert_eq!(cli.ledger, Some(PathBuf::from("costs.json")));
        assert!(matches!(cli.command, Command::Parameters));

        let args = report(&["report", "--anchor", "2024-01-31"]);
        assert_eq!(args.anchor, NaiveDate::from_ymd_opt(2024, 1, 31));
    }
}
