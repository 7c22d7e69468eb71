//! Core domain types for cloudcost
//!
//! This module contains the fundamental types shared by the period resolver,
//! the billing backends and the aggregation engine: date intervals and period
//! groups, dimension parameters, group/filter selections and raw cost records.

use crate::error::{CloudCostError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Separator between a dimension id and its free-form data, as in `TAG|env`.
pub const DATA_SEPARATOR: &str = "|";

/// Inclusive date interval
///
/// Both `start` and `end` belong to the interval.
///
/// # Examples
/// ```
/// use cloudcost_core::types::DateInterval;
/// use chrono::NaiveDate;
///
/// let interval = DateInterval::new(
///     NaiveDate::from_ymd_opt(2024, 2, 15).unwrap(),
///     NaiveDate::from_ymd_opt(2024, 2, 20).unwrap(),
/// ).unwrap();
///
/// assert_eq!(interval.days(), 6);
/// assert_eq!(interval.to_string(), "Feb 15-Feb 20");
/// assert_eq!(interval.filter_value(), "T2024-02-15|2024-02-20");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateInterval {
    /// First day of the interval
    pub start: NaiveDate,
    /// Last day of the interval
    pub end: NaiveDate,
}

impl DateInterval {
    /// Create a new interval, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(CloudCostError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Single-day interval
    pub fn single_day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Number of days covered, both ends included
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Whether `date` lies within the interval (inclusive on both ends)
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Same interval moved by `days` (negative moves backward)
    ///
    /// Returns `None` when either bound leaves the supported date range.
    pub fn shifted(&self, days: i64) -> Option<Self> {
        let offset = chrono::Duration::try_days(days)?;
        Some(Self {
            start: self.start.checked_add_signed(offset)?,
            end: self.end.checked_add_signed(offset)?,
        })
    }

    /// Label with the interval length appended when requested
    pub fn label_with_duration(&self, show_duration: bool) -> String {
        if show_duration {
            format!("{} ({} days)", self, self.days())
        } else {
            self.to_string()
        }
    }

    /// Representation usable as a period filter value (`T2024-02-15|2024-02-20`)
    pub fn filter_value(&self) -> String {
        let start = format!("T{}", self.start.format("%Y-%m-%d"));
        if self.start == self.end {
            return start;
        }
        format!(
            "{start}{DATA_SEPARATOR}{}",
            self.end.format("%Y-%m-%d")
        )
    }
}

impl fmt::Display for DateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", format_short_date(self.start))
        } else {
            write!(
                f,
                "{}-{}",
                format_short_date(self.start),
                format_short_date(self.end)
            )
        }
    }
}

/// Format a date like "Feb 15"
pub fn format_short_date(date: NaiveDate) -> String {
    format!("{} {}", date.format("%b"), date.day())
}

/// Intervals queried together against the backend in one logical request
///
/// A group with a single interval is queried at interval granularity. A group
/// with several intervals ("repeat" mode) is queried day by day over its span
/// so each day can be routed to the interval that contains it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodGroup {
    /// Intervals in column order
    pub intervals: Vec<DateInterval>,
}

impl PeriodGroup {
    /// Create a group from its intervals
    pub fn new(intervals: Vec<DateInterval>) -> Self {
        Self { intervals }
    }

    /// Group holding a single interval
    pub fn single(interval: DateInterval) -> Self {
        Self {
            intervals: vec![interval],
        }
    }

    /// Covering span: earliest start to latest end, `None` when empty
    pub fn span(&self) -> Option<DateInterval> {
        let start = self.intervals.iter().map(|i| i.start).min()?;
        let end = self.intervals.iter().map(|i| i.end).max()?;
        Some(DateInterval { start, end })
    }

    /// Whether the group holds exactly one interval
    pub fn is_single(&self) -> bool {
        self.intervals.len() == 1
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

/// One dimension of a cost record, like `id = "i-0abc", display = "web-1"`
///
/// Only `id` takes part in row identity; `display` is what gets shown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    /// Stable identifier of the dimension value
    pub id: String,
    /// Human readable value
    pub display: String,
}

impl ItemKey {
    /// Key whose display value differs from its id
    pub fn new(id: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display: display.into(),
        }
    }

    /// Key displayed as its own id
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display: id.clone(),
            id,
        }
    }
}

/// Ordered dimension keys of a record; most backends group by at most two dimensions
pub type ItemKeys = SmallVec<[ItemKey; 2]>;

/// One backend-reported cost line for one day (or one interval) and one key tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Day (or first day of the bucket) the cost belongs to
    pub date: NaiveDate,
    /// One key per requested group dimension, in request order
    pub keys: ItemKeys,
    /// Cost amount
    pub value: f64,
}

impl RawRecord {
    pub fn new(date: NaiveDate, keys: impl IntoIterator<Item = ItemKey>, value: f64) -> Self {
        Self {
            date,
            keys: keys.into_iter().collect(),
            value,
        }
    }

    /// Key ids joined for messages
    pub fn key_ids(&self) -> String {
        self.keys
            .iter()
            .map(|k| k.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Granularity the backend should report records at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    /// One bucket for the whole requested range
    #[default]
    Interval,
    /// One bucket per day
    Daily,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval => write!(f, "interval"),
            Self::Daily => write!(f, "daily"),
        }
    }
}

/// Filtering and/or grouping dimension offered by a backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionParameter {
    /// Identifier, like "SERVICE"
    pub id: String,
    /// Display name, like "Service"
    pub name: String,
    /// Shown in menus instead of `name` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_title: Option<String>,
    /// When > 0, priority for picking this group by default
    #[serde(default)]
    pub default_priority: u8,
    /// Whether the dimension can be grouped on
    #[serde(default)]
    pub is_group: bool,
    /// Whether grouped values should offer drill-down filtering
    #[serde(default)]
    pub is_group_filter: bool,
    /// Whether the dimension can be filtered on
    #[serde(default)]
    pub is_filter: bool,
    /// Whether the id may carry free-form data after [`DATA_SEPARATOR`]
    #[serde(default)]
    pub has_data: bool,
    /// Whether that data is mandatory
    #[serde(default)]
    pub data_required: bool,
}

impl DimensionParameter {
    /// Groupable and filterable dimension without data
    pub fn group(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_group: true,
            is_group_filter: true,
            is_filter: true,
            ..Default::default()
        }
    }

    /// Filter-only dimension
    pub fn filter(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_filter: true,
            ..Default::default()
        }
    }

    pub fn with_default_priority(mut self, priority: u8) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_menu_title(mut self, title: impl Into<String>) -> Self {
        self.menu_title = Some(title.into());
        self
    }

    /// Mark the dimension as carrying data, optionally mandatory
    pub fn with_data(mut self, required: bool) -> Self {
        self.has_data = true;
        self.data_required = required;
        self
    }
}

/// Dimension list declared by a backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(pub Vec<DimensionParameter>);

impl Parameters {
    pub fn new(parameters: Vec<DimensionParameter>) -> Self {
        Self(parameters)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DimensionParameter> {
        self.0.iter()
    }

    /// Find a parameter by id
    ///
    /// Ids of data-carrying parameters may arrive with their data attached
    /// (`TAG|env`); those match on the part before the separator.
    pub fn find_by_id(&self, id: &str) -> Option<&DimensionParameter> {
        self.0.iter().find(|p| {
            if p.id == id {
                return true;
            }
            p.has_data
                && id
                    .split_once(DATA_SEPARATOR)
                    .is_some_and(|(name, _)| name == p.id)
        })
    }

    /// Find a groupable parameter with the given default priority
    pub fn find_by_group_default_priority(&self, priority: u8) -> Option<&DimensionParameter> {
        self.0
            .iter()
            .find(|p| p.is_group && p.default_priority == priority)
    }

    /// Group to use when none was selected: priority 1, else the first groupable one
    pub fn default_group(&self) -> Option<&DimensionParameter> {
        self.find_by_group_default_priority(1)
            .or_else(|| self.0.iter().find(|p| p.is_group))
    }
}

/// Requested group-by dimension with its optional data (tag name and the like)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupDimension {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl GroupDimension {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: None,
        }
    }

    pub fn with_data(id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: Some(data.into()),
        }
    }
}

impl FromStr for GroupDimension {
    type Err = CloudCostError;

    /// Parse `ID` or `ID|data`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CloudCostError::InvalidArgument(
                "empty group dimension".to_string(),
            ));
        }
        match s.split_once(DATA_SEPARATOR) {
            Some((id, data)) if !data.is_empty() => Ok(Self::with_data(id, data)),
            Some((id, _)) => Ok(Self::new(id)),
            None => Ok(Self::new(s)),
        }
    }
}

impl fmt::Display for GroupDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            Some(data) => write!(f, "{}{DATA_SEPARATOR}{data}", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Dimension filter: only costs whose `id` dimension equals `value`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    pub id: String,
    pub value: String,
}

impl Filter {
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

impl FromStr for Filter {
    type Err = CloudCostError;

    /// Parse `ID=value`
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((id, value)) if !id.trim().is_empty() => Ok(Self::new(id.trim(), value)),
            _ => Err(CloudCostError::InvalidArgument(format!(
                "invalid filter '{s}', expected ID=value"
            ))),
        }
    }
}
