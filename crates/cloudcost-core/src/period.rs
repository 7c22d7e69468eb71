//! Period resolution
//!
//! Turns period specifications into concrete inclusive date intervals and
//! builds the period groups of a report.
//!
//! Supported specifications:
//! - `d14` - the last 14 days ending at the anchor date
//! - `m3` - from the anchor minus 3 months (plus one day) to the anchor
//! - `M202402` - the calendar month February 2024
//! - `T2024-02-01` or `T2024-02-01|2024-02-15` - an explicit day or range
//!
//! # Examples
//!
//! ```
//! use cloudcost_core::period::{generate_repeats, resolve_period};
//! use chrono::NaiveDate;
//!
//! let anchor = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
//! let (interval, description) = resolve_period("d7", anchor).unwrap();
//! assert_eq!(interval.start, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
//! assert_eq!(description, "7 days");
//!
//! let repeats = generate_repeats(&interval, 3).unwrap();
//! assert_eq!(repeats.last(), Some(&interval));
//! ```

use crate::error::{CloudCostError, Result};
use crate::types::{DATA_SEPARATOR, DateInterval, PeriodGroup};
use chrono::{Datelike, Days, Months, NaiveDate};
use tracing::debug;

/// Days to step back from today: billing data is usually only settled two days later
pub const DEFAULT_SKIP_DAYS: i64 = 2;

/// Period used when none is given
pub const DEFAULT_PERIOD: &str = "d14";

fn invalid(spec: &str, reason: impl Into<String>) -> CloudCostError {
    CloudCostError::InvalidPeriod {
        spec: spec.to_string(),
        reason: reason.into(),
    }
}

fn parse_count(spec: &str, digits: &str, what: &str) -> Result<u32> {
    let count: u32 = digits
        .parse()
        .map_err(|e| invalid(spec, format!("invalid {what} count: {e}")))?;
    if count == 0 {
        return Err(invalid(spec, format!("{what} count must be positive")));
    }
    Ok(count)
}

fn parse_day(spec: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| invalid(spec, format!("invalid date '{value}': {e}")))
}

/// Last day of the month `date` belongs to
pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// Resolve a period specification against an anchor date
///
/// Returns the interval and a human readable description of it.
pub fn resolve_period(spec: &str, anchor: NaiveDate) -> Result<(DateInterval, String)> {
    let spec = spec.trim();
    let mut chars = spec.chars();
    let Some(kind) = chars.next() else {
        return Err(invalid(spec, "empty period"));
    };
    let rest = chars.as_str();

    match kind {
        'd' => {
            let days = parse_count(spec, rest, "days")?;
            let start = anchor
                .checked_sub_days(Days::new(u64::from(days) - 1))
                .ok_or_else(|| invalid(spec, "day count out of range"))?;
            Ok((DateInterval::new(start, anchor)?, format!("{days} days")))
        }
        'm' => {
            let months = parse_count(spec, rest, "months")?;
            let start = anchor
                .checked_sub_months(Months::new(months))
                .and_then(|d| d.succ_opt())
                .ok_or_else(|| invalid(spec, "month offset out of range"))?;
            Ok((DateInterval::new(start, anchor)?, format!("{months} months")))
        }
        'M' => {
            if rest.len() != 6 || !rest.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid(spec, "expected MYYYYMM"));
            }
            let year: i32 = rest[..4]
                .parse()
                .map_err(|e| invalid(spec, format!("invalid year: {e}")))?;
            let month: u32 = rest[4..]
                .parse()
                .map_err(|e| invalid(spec, format!("invalid month: {e}")))?;
            let start = NaiveDate::from_ymd_opt(year, month, 1)
                .ok_or_else(|| invalid(spec, "invalid month value"))?;
            let description = format!("{}/{year}", start.format("%b"));
            Ok((DateInterval::new(start, end_of_month(start))?, description))
        }
        'T' => {
            let (start, end) = match rest.split_once(DATA_SEPARATOR) {
                Some((start, end)) => (parse_day(spec, start)?, parse_day(spec, end)?),
                None => {
                    let day = parse_day(spec, rest)?;
                    (day, day)
                }
            };
            let interval = DateInterval::new(start, end)?;
            let description = if start == end {
                start.format("%d/%b/%Y").to_string()
            } else {
                format!(
                    "{} to {}",
                    start.format("%d/%b/%Y"),
                    end.format("%d/%b/%Y")
                )
            };
            Ok((interval, description))
        }
        _ => Err(invalid(spec, "unknown period kind")),
    }
}

/// Generate `count` consecutive intervals of the same length, oldest first
///
/// Each interval is shifted back by the length of `interval`; the last
/// generated interval equals `interval`. Fails when the oldest repeat would
/// start before the earliest representable date.
pub fn generate_repeats(interval: &DateInterval, count: usize) -> Result<Vec<DateInterval>> {
    let days = interval.days();
    let out_of_range = || {
        CloudCostError::InvalidArgument(format!(
            "cannot repeat {interval} {count} times: date out of range"
        ))
    };
    (0..count)
        .rev()
        .map(|i| {
            i64::try_from(i)
                .ok()
                .and_then(|i| days.checked_mul(i))
                .and_then(|offset| interval.shifted(-offset))
                .ok_or_else(out_of_range)
        })
        .collect()
}

/// Anchor date for relative periods
///
/// Steps back from `today` by the larger of [`DEFAULT_SKIP_DAYS`] and the
/// backend's `days_delay`, then by the extra skip days.
pub fn default_anchor(
    today: NaiveDate,
    days_delay: u32,
    extra_skip_days: i64,
) -> Result<NaiveDate> {
    let skip = DEFAULT_SKIP_DAYS.max(i64::from(days_delay));
    skip.checked_add(extra_skip_days)
        .and_then(|days| u64::try_from(days).ok())
        .and_then(|days| today.checked_sub_days(Days::new(days)))
        .ok_or_else(|| {
            CloudCostError::InvalidArgument(format!(
                "skip days {extra_skip_days} moves the anchor out of range"
            ))
        })
}

/// How the primary period is compared
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// Only the primary period
    None,
    /// The primary period repeated this many times backward, in one group
    Repeat(usize),
    /// Additional period specs, each anchored on the day before the primary start
    Periods(Vec<String>),
}

impl Comparison {
    /// Parse a comparison value: `R<n>` repeats, anything else is a period spec
    pub fn parse(values: &[String]) -> Result<Self> {
        match values {
            [] => Ok(Self::None),
            [single] if single.starts_with('R') => {
                let count: usize = single[1..].parse().map_err(|e| {
                    invalid(single, format!("could not parse repeat value: {e}"))
                })?;
                if count == 0 {
                    return Err(invalid(single, "repeat count must be positive"));
                }
                Ok(Self::Repeat(count))
            }
            values => Ok(Self::Periods(values.to_vec())),
        }
    }
}

/// Report period selection
///
/// # Examples
///
/// ```
/// use cloudcost_core::period::{Comparison, PeriodSelection};
/// use chrono::NaiveDate;
///
/// let anchor = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
/// let selection = PeriodSelection::new("d7").with_comparison(Comparison::Repeat(4));
/// let (groups, description) = selection.resolve(anchor).unwrap();
/// assert_eq!(groups.len(), 1);
/// assert_eq!(groups[0].len(), 4);
/// assert_eq!(description, "7 days (repeat 4)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodSelection {
    pub primary: String,
    pub comparison: Comparison,
}

impl Default for PeriodSelection {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD)
    }
}

impl PeriodSelection {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            comparison: Comparison::None,
        }
    }

    pub fn with_comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// Resolve into period groups (in column order) and a description
    pub fn resolve(&self, anchor: NaiveDate) -> Result<(Vec<PeriodGroup>, String)> {
        let (primary, description) = resolve_period(&self.primary, anchor)?;

        let resolved = match &self.comparison {
            Comparison::None => (vec![PeriodGroup::single(primary)], description),
            Comparison::Repeat(count) => (
                vec![PeriodGroup::new(generate_repeats(&primary, *count)?)],
                format!("{description} (repeat {count})"),
            ),
            Comparison::Periods(specs) => {
                let comparison_anchor = primary
                    .start
                    .pred_opt()
                    .ok_or_else(|| invalid(&self.primary, "no day before period start"))?;
                let mut groups = vec![PeriodGroup::single(primary)];
                for spec in specs {
                    let (interval, _) = resolve_period(spec, comparison_anchor)?;
                    groups.insert(0, PeriodGroup::single(interval));
                }
                (groups, description)
            }
        };

        debug!(
            "Resolved period '{}' into {} group(s): {}",
            self.primary,
            resolved.0.len(),
            resolved.1
        );
        Ok(resolved)
    }
}
