//! Error types for cloudcost
//!
//! This module defines the error types used throughout the cloudcost crates.
//! All errors are derived from `thiserror` for convenient error handling
//! and automatic `From` implementations.
//!
//! # Example
//!
//! ```
//! use cloudcost_core::error::{CloudCostError, Result};
//!
//! fn require_groups(groups: &[&str]) -> Result<()> {
//!     if groups.is_empty() {
//!         return Err(CloudCostError::NoGroups);
//!     }
//!     Ok(())
//! }
//!
//! assert!(require_groups(&[]).is_err());
//! ```

use chrono::NaiveDate;
use thiserror::Error;

/// Boxed error used as the source of backend failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for cloudcost operations
#[derive(Error, Debug)]
pub enum CloudCostError {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// No period was requested
    #[error("at least one period is required")]
    NoPeriods,

    /// No group dimension was requested
    #[error("at least one group is required")]
    NoGroups,

    /// Group dimension unknown to the backend or not groupable
    #[error("invalid group '{0}'")]
    InvalidGroup(String),

    /// More group dimensions than the backend supports
    #[error("{backend} supports up to {max} groups, {requested} requested")]
    TooManyGroups {
        /// Backend name
        backend: String,
        /// Maximum number of group dimensions
        max: usize,
        /// Number of requested group dimensions
        requested: usize,
    },

    /// Malformed period specification
    #[error("could not parse period '{spec}': {reason}")]
    InvalidPeriod {
        /// The offending specification
        spec: String,
        /// What was wrong with it
        reason: String,
    },

    /// Interval whose start is after its end
    #[error("invalid interval: start {start} is after end {end}")]
    InvalidInterval {
        /// Interval start
        start: NaiveDate,
        /// Interval end
        end: NaiveDate,
    },

    /// Failure reported by a billing backend or while paging through its API
    #[error("{context}: {source}")]
    Backend {
        /// What was being done when the failure happened
        context: String,
        /// The underlying failure
        #[source]
        source: BoxError,
    },

    /// Failure while processing one period group
    #[error("period group {index} ({span}): {source}")]
    PeriodGroup {
        /// Position of the group in the request
        index: usize,
        /// Covering span of the group
        span: String,
        /// The underlying failure
        #[source]
        source: Box<CloudCostError>,
    },

    /// Record that did not land in exactly one period column
    #[error("record dated {date} for [{keys}] matched {match_count} periods")]
    PeriodMismatch {
        /// Record date
        date: NaiveDate,
        /// Key ids of the record, joined
        keys: String,
        /// Number of matched periods
        match_count: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CloudCostError {
    /// Wrap any error as a backend failure with context.
    pub fn backend(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Whether the error was detected before any backend call.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoPeriods
                | Self::NoGroups
                | Self::InvalidGroup(_)
                | Self::TooManyGroups { .. }
                | Self::InvalidPeriod { .. }
                | Self::InvalidInterval { .. }
                | Self::Config(_)
                | Self::InvalidArgument(_)
        )
    }
}

/// Convenience type alias for Results in cloudcost
pub type Result<T> = std::result::Result<T, CloudCostError>;
