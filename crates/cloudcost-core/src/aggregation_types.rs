//! Aggregation data types for cloudcost
//!
//! Pure data structures produced by the aggregation engine: pivot rows,
//! resolved groups, period columns and the full pivot result.

use crate::extra_data::ExtraOutput;
use crate::types::{DateInterval, DimensionParameter, ItemKeys};
use serde::{Deserialize, Serialize};

/// Change of a cost between two consecutive period columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostDiff {
    /// `current - previous`
    pub value: f64,
    /// Change relative to `previous` in percent; `current` itself when `previous` is 0
    pub pct: f64,
}

impl CostDiff {
    pub fn between(current: f64, previous: f64) -> Self {
        let pct = if previous != 0.0 {
            (current - previous) / previous.abs() * 100.0
        } else {
            current
        };
        Self {
            value: current - previous,
            pct,
        }
    }

    /// Diff of column `index` against the column before it, zero for the first column
    fn of_column(values: &[f64], index: usize) -> Self {
        if index < 1 || index >= values.len() {
            return Self::default();
        }
        Self::between(values[index], values[index - 1])
    }
}

/// One pivot row: dimension keys and one value per period column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Keys as first seen for this row identity
    pub keys: ItemKeys,
    /// One value per period column, 0 where the row was never observed
    pub values: Vec<f64>,
}

impl Item {
    /// Create a row with `periods` zeroed columns
    pub fn new(keys: ItemKeys, periods: usize) -> Self {
        Self {
            keys,
            values: vec![0.0; periods],
        }
    }

    /// Whether any key display value contains `search`, ignoring case
    pub fn search(&self, search: &str) -> bool {
        let needle = search.to_lowercase();
        self.keys
            .iter()
            .any(|key| key.display.to_lowercase().contains(&needle))
    }

    /// Sum of the row over all columns
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Change of column `period` against the previous column
    pub fn diff(&self, period: usize) -> CostDiff {
        CostDiff::of_column(&self.values, period)
    }
}

/// Group dimension the result was computed with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultGroup {
    pub parameter: DimensionParameter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl ResultGroup {
    /// Column title, `Name[data]` when the group carries data
    pub fn title(&self, is_menu: bool) -> String {
        let name = match (&self.parameter.menu_title, is_menu) {
            (Some(title), true) => title.as_str(),
            _ => self.parameter.name.as_str(),
        };
        match &self.data {
            Some(data) if !data.is_empty() => format!("{name}[{data}]"),
            _ => name.to_string(),
        }
    }
}

impl std::fmt::Display for ResultGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title(false))
    }
}

/// Period column with its accumulated total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPeriod {
    pub interval: DateInterval,
    pub total_value: f64,
}

/// Full pivot report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotResult {
    /// One row per distinct key id sequence, in first-seen order
    pub items: Vec<Item>,
    /// Sum of every accepted record, counted once
    pub total_value: f64,
    /// Resolved group dimensions, in request order
    pub groups: Vec<ResultGroup>,
    /// Whether every period column spans the same number of days
    pub periods_same_duration: bool,
    /// Period columns, in request order
    pub periods: Vec<ResultPeriod>,
    /// Backend supplementary output, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_output: Option<ExtraOutput>,
}

impl PivotResult {
    /// Sort rows by the value of one column, largest first; ties keep their order
    pub fn sort_by_period_desc(&mut self, period: usize) {
        self.items.sort_by(|a, b| {
            let av = a.values.get(period).copied().unwrap_or_default();
            let bv = b.values.get(period).copied().unwrap_or_default();
            bv.total_cmp(&av)
        });
    }

    /// Sort rows by their total over all columns, largest first
    pub fn sort_by_total_desc(&mut self) {
        self.items.sort_by(|a, b| b.total().total_cmp(&a.total()));
    }

    /// Sort rows by the size of their change at column `period`, largest first
    pub fn sort_by_diff_desc(&mut self, period: usize, pct: bool) {
        let size = |item: &Item| {
            let diff = item.diff(period);
            if pct { diff.pct.abs() } else { diff.value.abs() }
        };
        self.items.sort_by(|a, b| size(b).total_cmp(&size(a)));
    }

    /// Change of the column total at `period` against the previous column
    pub fn period_diff(&self, period: usize) -> CostDiff {
        let totals: Vec<f64> = self.periods.iter().map(|p| p.total_value).collect();
        CostDiff::of_column(&totals, period)
    }

    /// Keep only the rows matching `search`, see [`Item::search`]
    pub fn retain_search(&mut self, search: &str) {
        self.items.retain(|item| item.search(search));
    }
}
