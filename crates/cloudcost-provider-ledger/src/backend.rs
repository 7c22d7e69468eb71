//! Ledger billing backend
//!
//! Implements [`BillingBackend`] over a [`LedgerApi`]. Cost queries are paged
//! through the pagination adapter and turned into records lazily. When a query
//! carries a filter other than an account or tag filter, a `TAG` extra-data
//! producer lists the tags seen under those filters.
//!
//! # Examples
//!
//! ```no_run
//! use cloudcost_provider_ledger::LedgerBackend;
//! use cloudcost_core::aggregation::{AggregateRequest, Aggregator};
//! use cloudcost_core::types::{DateInterval, GroupDimension, PeriodGroup};
//! use chrono::NaiveDate;
//!
//! # async fn example() -> cloudcost_core::Result<()> {
//! let backend = LedgerBackend::open("ledger.json").await?.with_page_size(50);
//! let week = DateInterval::new(
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
//! )?;
//! let request = AggregateRequest::new(
//!     vec![PeriodGroup::single(week)],
//!     vec![GroupDimension::new("SERVICE")],
//! );
//! let result = Aggregator::new().aggregate(&backend, &request).await?;
//! # Ok(())
//! # }
//! ```

use crate::api::{
    CostGroup, CostPageRequest, DEFAULT_PAGE_SIZE, GroupDefinition, LedgerApi, TAG_KEY_SEPARATOR,
    TagPage, TagPageRequest,
};
use crate::ledger::Ledger;
use async_trait::async_trait;
use cloudcost_core::backend::{BillingBackend, CostQuery, RecordStream};
use cloudcost_core::error::{CloudCostError, Result};
use cloudcost_core::extra_data::{ExtraDataScope, ExtraDatum, ExtraEntry, ExtraOutput, ExtraSection};
use cloudcost_core::pagination::{ContinuationToken, paginate, paginate_items};
use cloudcost_core::types::{
    DATA_SEPARATOR, DimensionParameter, GroupDimension, ItemKey, ItemKeys, Parameters, RawRecord,
};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Extra-data kind listing tag names and values
pub const TAG_KIND: &str = "TAG";

const LINKED_ACCOUNT: &str = "LINKED_ACCOUNT";

/// Dimensions offered by the ledger
pub fn ledger_parameters() -> Parameters {
    Parameters::new(vec![
        DimensionParameter::group(LINKED_ACCOUNT, "Linked account").with_default_priority(1),
        DimensionParameter::group("SERVICE", "Service").with_default_priority(2),
        DimensionParameter::group("REGION", "Region"),
        DimensionParameter::group("USAGE_TYPE", "Usage type").with_default_priority(3),
        DimensionParameter::filter("USAGE_TYPE_GROUP", "Usage type group"),
        DimensionParameter::group("RESOURCE_ID", "Resource ID")
            .with_menu_title("Resource ID (only last 14 days)"),
        DimensionParameter::group("INSTANCE_TYPE", "Instance type"),
        DimensionParameter::group("INSTANCE_TYPE_FAMILY", "Instance type family"),
        DimensionParameter {
            is_group_filter: true,
            ..DimensionParameter::filter("PURCHASE_TYPE", "Purchase type")
        },
        DimensionParameter::group("OPERATION", "Operation"),
        DimensionParameter::group("PLATFORM", "Platform"),
        DimensionParameter::group("RECORD_TYPE", "Record type"),
        DimensionParameter::group("AZ", "AZ"),
        DimensionParameter::group("TAG", "Tag").with_data(true),
    ])
}

/// Billing backend reading a local ledger
pub struct LedgerBackend {
    api: Arc<LedgerApi>,
    parameters: Parameters,
    page_size: usize,
    days_delay: u32,
}

impl LedgerBackend {
    pub fn new(api: LedgerApi) -> Self {
        Self {
            api: Arc::new(api),
            parameters: ledger_parameters(),
            page_size: DEFAULT_PAGE_SIZE,
            days_delay: 1,
        }
    }

    pub fn from_ledger(ledger: Ledger) -> Self {
        Self::new(LedgerApi::new(Arc::new(ledger)))
    }

    /// Load the ledger file at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_ledger(Ledger::load(path).await?))
    }

    /// Load the ledger file named by `CLOUDCOST_LEDGER`
    pub async fn from_env() -> Result<Self> {
        Ok(Self::from_ledger(Ledger::from_env().await?))
    }

    /// Number of results per API page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Days until a ledger entry is considered settled
    pub fn with_days_delay(mut self, days_delay: u32) -> Self {
        self.days_delay = days_delay;
        self
    }

    pub fn api(&self) -> &LedgerApi {
        &self.api
    }

    fn group_definitions(&self, groups: &[GroupDimension]) -> Result<Vec<GroupDefinition>> {
        if groups.len() > 2 {
            return Err(CloudCostError::TooManyGroups {
                backend: self.name().to_string(),
                max: 2,
                requested: groups.len(),
            });
        }
        groups
            .iter()
            .map(|group| {
                let parameter = self
                    .parameters
                    .find_by_id(&group.id)
                    .filter(|p| p.is_group)
                    .ok_or_else(|| CloudCostError::InvalidGroup(group.to_string()))?;
                if parameter.id == "TAG" {
                    let name = group
                        .data
                        .clone()
                        .ok_or_else(|| CloudCostError::InvalidGroup(group.to_string()))?;
                    Ok(GroupDefinition::Tag(name))
                } else {
                    Ok(GroupDefinition::Dimension(parameter.id.clone()))
                }
            })
            .collect()
    }

    fn record(&self, groups: &[GroupDimension], group: CostGroup) -> RawRecord {
        let keys: ItemKeys = groups
            .iter()
            .zip(group.keys)
            .map(|(dimension, value)| match dimension.id.as_str() {
                LINKED_ACCOUNT => {
                    let title = self.parameter_title(LINKED_ACCOUNT, &value);
                    ItemKey::new(value, title)
                }
                "TAG" => match value.split_once(TAG_KEY_SEPARATOR) {
                    Some((name, tag_value)) => {
                        ItemKey::new(format!("{name}{DATA_SEPARATOR}{tag_value}"), tag_value)
                    }
                    None => ItemKey::from_id(value),
                },
                _ => ItemKey::from_id(value),
            })
            .collect();
        RawRecord {
            date: group.start,
            keys,
            value: group.amount,
        }
    }

    fn spawn_tag_producer(&self, query: &CostQuery, extra: &mut ExtraDataScope) {
        let api = self.api.clone();
        let request = TagPageRequest {
            interval: query.interval.clone(),
            filters: query.filters.clone(),
            page_size: self.page_size,
            next_token: None,
        };
        let entries = paginate_items(
            request,
            ContinuationToken::next_token(),
            move |request| {
                let api = api.clone();
                async move { api.get_tags(request).await }
            },
            |page: TagPage| {
                page.tags
                    .into_iter()
                    .map(|tag| ExtraEntry::new(tag.name, tag.values))
                    .collect::<Vec<_>>()
            },
        );
        extra.spawn(TAG_KIND, entries);
    }
}

#[async_trait]
impl BillingBackend for LedgerBackend {
    fn name(&self) -> &str {
        "ledger"
    }

    fn days_delay(&self) -> u32 {
        self.days_delay
    }

    fn max_group_by(&self) -> Option<usize> {
        Some(2)
    }

    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameter_title(&self, id: &str, value: &str) -> String {
        if id != LINKED_ACCOUNT {
            return value.to_string();
        }
        self.api
            .ledger()
            .accounts
            .get(value)
            .cloned()
            .unwrap_or_else(|| value.to_string())
    }

    fn query(&self, query: CostQuery, extra: &mut ExtraDataScope) -> RecordStream<'_> {
        let group_by = match self.group_definitions(&query.groups) {
            Ok(group_by) => group_by,
            Err(e) => return Box::pin(futures::stream::once(async move { Err::<RawRecord, _>(e) })),
        };

        let is_filter = query
            .filters
            .iter()
            .any(|f| f.id != LINKED_ACCOUNT && f.id != "TAG");
        if is_filter && extra.is_enabled() {
            debug!("Filtered query, listing tags for {}", query.interval);
            self.spawn_tag_producer(&query, extra);
        }

        let request = CostPageRequest {
            interval: query.interval.clone(),
            granularity: query.granularity,
            group_by,
            filters: query.filters.clone(),
            page_size: self.page_size,
            next_page_token: None,
        };
        let api = self.api.clone();
        let pages = paginate(request, ContinuationToken::next_page_token(), move |request| {
            let api = api.clone();
            async move { api.get_cost_and_usage(request).await }
        });

        Box::pin(async_stream::try_stream! {
            tokio::pin!(pages);
            while let Some(page) = pages.next().await {
                for group in page?.results {
                    yield self.record(&query.groups, group);
                }
            }
        })
    }

    async fn finalize_extra_output(&self, collected: Vec<ExtraDatum>) -> Option<ExtraOutput> {
        let sections: Vec<ExtraSection> = collected
            .into_iter()
            .filter(|datum| !datum.is_empty())
            .map(|datum| ExtraSection {
                title: match datum.kind.as_str() {
                    TAG_KIND => "Tags".to_string(),
                    kind => kind.to_string(),
                },
                datum,
            })
            .collect();
        (!sections.is_empty()).then_some(ExtraOutput { sections })
    }
}
