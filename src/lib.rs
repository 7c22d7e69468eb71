//! cloudcost - pivoted multi-period cloud cost reports
//!
//! The binary glue around the cloudcost crates:
//! - [`cli`] parses the command line
//! - [`report`] turns report arguments into an aggregation and post-processes the pivot
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use cloudcost::cli::{Cli, Command};
//! use cloudcost::report::run_report;
//! use cloudcost_provider_ledger::LedgerBackend;
//!
//! # async fn example() -> cloudcost_core::Result<()> {
//! let cli = Cli::parse_from(["cloudcost", "report", "--period", "d7", "--repeat", "4"]);
//! let backend = LedgerBackend::open("costs.json").await?;
//! if let Command::Report(args) = &cli.command {
//!     let today = chrono::Utc::now().date_naive();
//!     let report = run_report(&backend, args, today, false).await?;
//!     println!("{} rows, {:.2} total", report.result.items.len(), report.result.total_value);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod report;

pub use cloudcost_core::{CloudCostError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
