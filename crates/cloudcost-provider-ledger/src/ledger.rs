//! Ledger file schema
//!
//! A ledger is a JSON document listing account names and daily cost line items:
//!
//! ```json
//! {
//!   "accounts": { "111111111111": "Production" },
//!   "line_items": [
//!     {
//!       "date": "2024-01-01",
//!       "cost": 12.5,
//!       "dimensions": { "LINKED_ACCOUNT": "111111111111", "SERVICE": "Amazon EC2" },
//!       "tags": { "env": "prod" }
//!     }
//!   ]
//! }
//! ```

use chrono::NaiveDate;
use cloudcost_core::error::{CloudCostError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Environment variable naming the default ledger file
pub const LEDGER_ENV: &str = "CLOUDCOST_LEDGER";

/// One day of cost for one combination of dimension values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub date: NaiveDate,
    pub cost: f64,
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl LineItem {
    pub fn new(date: NaiveDate, cost: f64) -> Self {
        Self {
            date,
            cost,
            dimensions: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_dimension(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(id.into(), value.into());
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    /// Value of a dimension, empty when the item does not carry it
    pub fn dimension(&self, id: &str) -> &str {
        self.dimensions.get(id).map(String::as_str).unwrap_or_default()
    }

    /// Value of a tag, empty when the item is untagged
    pub fn tag(&self, name: &str) -> &str {
        self.tags.get(name).map(String::as_str).unwrap_or_default()
    }
}

/// Parsed ledger document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    /// Account id to display name
    #[serde(default)]
    pub accounts: BTreeMap<String, String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

impl Ledger {
    /// Read and parse a ledger file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CloudCostError::Config(format!("cannot read ledger {}: {e}", path.display()))
        })?;
        let ledger: Ledger = serde_json::from_str(&content)?;
        debug!(
            "Loaded ledger {} with {} line items and {} accounts",
            path.display(),
            ledger.line_items.len(),
            ledger.accounts.len()
        );
        Ok(ledger)
    }

    /// Read the ledger named by [`LEDGER_ENV`]
    pub async fn from_env() -> Result<Self> {
        let path = std::env::var(LEDGER_ENV)
            .map_err(|_| CloudCostError::Config(format!("{LEDGER_ENV} is not set")))?;
        Self::load(path).await
    }
}
