//! Terminal output for cloudcost
//!
//! Table and JSON renderings of pivot reports and backend dimension lists.

pub mod output;

pub use output::{JsonFormatter, OutputFormatter, TableFormatter, get_formatter};
