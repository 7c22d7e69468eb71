//! Output formatting for pivot reports
//!
//! Two formatters are provided:
//! - [`TableFormatter`] renders a terminal table with one column per group
//!   dimension and one per period, plus optional diff columns
//! - [`JsonFormatter`] emits the same report as pretty printed JSON
//!
//! ```no_run
//! use cloudcost_terminal::get_formatter;
//! # fn report(result: &cloudcost_core::PivotResult) {
//! let formatter = get_formatter(false, true);
//! println!("{}", formatter.format_pivot(result));
//! # }
//! ```

use cloudcost_core::aggregation_types::{CostDiff, PivotResult};
use cloudcost_core::extra_data::ExtraOutput;
use cloudcost_core::types::Parameters;
use colored::Colorize;
use prettytable::{Cell, Row, Table, format, row};
use serde_json::json;

/// Trait for report formatters
pub trait OutputFormatter {
    /// Format a pivot result
    fn format_pivot(&self, result: &PivotResult) -> String;

    /// Format the dimensions a backend can group and filter by
    fn format_parameters(&self, parameters: &Parameters) -> String;
}

/// Shown in place of an empty dimension value
const EMPTY_KEY: &str = "-";

/// Table formatter for human-readable output
pub struct TableFormatter {
    /// Add `Diff` and `Diff %` columns after every period but the first
    pub show_diff: bool,
    /// Whether to use colored output (respects NO_COLOR environment variable)
    colored_output: bool,
}

impl TableFormatter {
    pub fn new(show_diff: bool) -> Self {
        Self {
            show_diff,
            colored_output: std::env::var("NO_COLOR").is_err(),
        }
    }

    /// Force colors on or off regardless of the environment
    pub fn with_colors(mut self, colored_output: bool) -> Self {
        self.colored_output = colored_output;
        self
    }

    /// Format an amount as dollars with thousands separators, e.g. `$1,234.50`
    pub fn format_currency(amount: f64) -> String {
        let fixed = format!("{:.2}", amount.abs());
        let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

        let mut grouped = String::new();
        for (count, ch) in whole.chars().rev().enumerate() {
            if count > 0 && count % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        let grouped: String = grouped.chars().rev().collect();

        // -0.001 rounds to 0.00 and should not keep its sign
        let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
        format!("{sign}${grouped}.{cents}")
    }

    /// Format a percentage with an explicit sign, e.g. `+12.5%`
    pub fn format_percent(pct: f64) -> String {
        format!("{pct:+.1}%")
    }

    /// Right aligned money cell, red for growth and green for savings when colored
    fn diff_cells(&self, diff: CostDiff, bold: bool) -> [Cell; 2] {
        let color = match diff.value {
            v if !self.colored_output || v == 0.0 => "",
            v if v > 0.0 => "Fr",
            _ => "Fg",
        };
        let style = format!("r{}{color}", if bold { "b" } else { "" });
        [
            Cell::new(&Self::format_currency(diff.value)).style_spec(&style),
            Cell::new(&Self::format_percent(diff.pct)).style_spec(&style),
        ]
    }

    fn pivot_table(&self, result: &PivotResult) -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);

        let mut titles: Vec<Cell> = result
            .groups
            .iter()
            .map(|group| Cell::new(&group.title(false)).style_spec("b"))
            .collect();
        for (index, period) in result.periods.iter().enumerate() {
            let label = period
                .interval
                .label_with_duration(!result.periods_same_duration);
            titles.push(Cell::new(&label).style_spec("bc"));
            if self.show_diff && index > 0 {
                titles.push(Cell::new("Diff").style_spec("bc"));
                titles.push(Cell::new("Diff %").style_spec("bc"));
            }
        }
        let width = titles.len();
        table.set_titles(Row::new(titles));

        for item in &result.items {
            let mut cells: Vec<Cell> = item
                .keys
                .iter()
                .map(|key| match key.display.as_str() {
                    "" => Cell::new(EMPTY_KEY),
                    display => Cell::new(display),
                })
                .collect();
            for (index, value) in item.values.iter().enumerate() {
                cells.push(Cell::new(&Self::format_currency(*value)).style_spec("r"));
                if self.show_diff && index > 0 {
                    cells.extend(self.diff_cells(item.diff(index), false));
                }
            }
            table.add_row(Row::new(cells));
        }

        if !result.items.is_empty() {
            table.add_row(Row::new(vec![Cell::new(""); width]));
        }

        // Totals under the first key column, per period totals under their columns
        let mut totals = vec![Cell::new("TOTAL").style_spec("b")];
        totals.extend((1..result.groups.len()).map(|_| Cell::new("")));
        for (index, period) in result.periods.iter().enumerate() {
            totals.push(Cell::new(&Self::format_currency(period.total_value)).style_spec("rb"));
            if self.show_diff && index > 0 {
                totals.extend(self.diff_cells(result.period_diff(index), true));
            }
        }
        table.add_row(Row::new(totals));
        table
    }

    fn extra_tables(extra: &ExtraOutput) -> Vec<Table> {
        extra
            .sections
            .iter()
            .map(|section| {
                let mut table = Table::new();
                table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
                table.set_titles(row![b -> section.title, b -> "Values"]);
                for (name, values) in &section.datum.entries {
                    let values: Vec<&str> = values.iter().map(String::as_str).collect();
                    table.add_row(row![name, values.join(", ")]);
                }
                for error in &section.datum.errors {
                    table.add_row(row![Fr -> "error", error]);
                }
                table
            })
            .collect()
    }
}

impl OutputFormatter for TableFormatter {
    fn format_pivot(&self, result: &PivotResult) -> String {
        let mut output = self.pivot_table(result).to_string();

        if result.items.is_empty() {
            let message = "No costs found for the selected periods";
            output.push_str(&if self.colored_output {
                message.yellow().to_string()
            } else {
                message.to_string()
            });
            output.push('\n');
        }

        if let Some(extra) = result.extra_output.as_ref().filter(|e| !e.is_empty()) {
            for table in Self::extra_tables(extra) {
                output.push('\n');
                output.push_str(&table.to_string());
            }
        }
        output
    }

    fn format_parameters(&self, parameters: &Parameters) -> String {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        table.set_titles(row![
            b -> "ID",
            b -> "Name",
            b -> "Group",
            b -> "Filter",
            b -> "Default",
            b -> "Data"
        ]);

        let mark = |flag: bool| if flag { "yes" } else { "" };
        for parameter in parameters.iter() {
            let default = match parameter.default_priority {
                0 => String::new(),
                priority => priority.to_string(),
            };
            let data = match (parameter.has_data, parameter.data_required) {
                (true, true) => "required",
                (true, false) => "optional",
                _ => "",
            };
            table.add_row(row![
                b -> parameter.id,
                parameter.name,
                c -> mark(parameter.is_group),
                c -> mark(parameter.is_filter || parameter.is_group_filter),
                c -> default,
                data
            ]);
        }
        table.to_string()
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format_pivot(&self, result: &PivotResult) -> String {
        let output = json!({
            "groups": result.groups.iter().map(|g| g.title(false)).collect::<Vec<_>>(),
            "periods": result.periods.iter().enumerate().map(|(index, p)| json!({
                "label": p.interval.label_with_duration(!result.periods_same_duration),
                "start": p.interval.start.format("%Y-%m-%d").to_string(),
                "end": p.interval.end.format("%Y-%m-%d").to_string(),
                "total": p.total_value,
                "diff": result.period_diff(index),
            })).collect::<Vec<_>>(),
            "items": result.items.iter().map(|item| json!({
                "keys": item.keys.iter().map(|k| json!({
                    "id": k.id,
                    "display": k.display,
                })).collect::<Vec<_>>(),
                "values": item.values,
                "diffs": (0..item.values.len()).map(|i| item.diff(i)).collect::<Vec<_>>(),
                "total": item.total(),
            })).collect::<Vec<_>>(),
            "total": result.total_value,
            "periods_same_duration": result.periods_same_duration,
            "extra": result.extra_output.as_ref().map(|extra| extra.sections.iter().map(|s| json!({
                "title": s.title,
                "kind": s.datum.kind,
                "entries": s.datum.entries,
                "errors": s.datum.errors,
            })).collect::<Vec<_>>()),
        });

        serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_parameters(&self, parameters: &Parameters) -> String {
        serde_json::to_string_pretty(&parameters.0).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Get formatter based on output preference
pub fn get_formatter(json: bool, show_diff: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonFormatter)
    } else {
        Box::new(TableFormatter::new(show_diff))
    }
}
