//! Paged billing API over a ledger
//!
//! Serves the ledger the way remote billing services do: results come back in
//! pages of at most `page_size` elements, each carrying a continuation token
//! for the next one. Cost pages use a `next_page_token` field, tag pages a
//! `next_token` field.

use crate::ledger::{Ledger, LineItem};
use chrono::NaiveDate;
use cloudcost_core::pagination::{NextPageToken, NextToken, SetNextPageToken, SetNextToken};
use cloudcost_core::types::{DATA_SEPARATOR, DateInterval, Filter, Granularity};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::trace;

/// Page size used when none is configured
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Separator between tag name and value in tag group keys
pub const TAG_KEY_SEPARATOR: char = '$';

/// Errors returned by the ledger API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("invalid page token '{0}'")]
    InvalidToken(String),

    #[error("invalid tag filter '{0}', expected name|value")]
    InvalidTagFilter(String),

    #[error("request limit exceeded after {0} calls")]
    LimitExceeded(usize),
}

/// How to group cost results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupDefinition {
    /// By the value of a dimension
    Dimension(String),
    /// By the value of a tag, reported as `name$value`
    Tag(String),
}

/// Request for grouped costs
#[derive(Debug, Clone)]
pub struct CostPageRequest {
    pub interval: DateInterval,
    pub granularity: Granularity,
    pub group_by: Vec<GroupDefinition>,
    pub filters: Vec<Filter>,
    pub page_size: usize,
    pub next_page_token: Option<String>,
}

/// Cost of one key combination for one bucket
#[derive(Debug, Clone, PartialEq)]
pub struct CostGroup {
    /// First day of the bucket
    pub start: NaiveDate,
    /// One key per group definition
    pub keys: Vec<String>,
    pub amount: f64,
}

#[derive(Debug, Clone)]
pub struct CostPage {
    pub results: Vec<CostGroup>,
    pub next_page_token: Option<String>,
}

impl SetNextPageToken for CostPageRequest {
    fn set_next_page_token(&mut self, token: Option<String>) {
        self.next_page_token = token;
    }
}

impl NextPageToken for CostPage {
    fn next_page_token(&self) -> Option<&str> {
        self.next_page_token.as_deref()
    }
}

/// Request for the tags seen under a set of filters
#[derive(Debug, Clone)]
pub struct TagPageRequest {
    pub interval: DateInterval,
    pub filters: Vec<Filter>,
    pub page_size: usize,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagValues {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TagPage {
    pub tags: Vec<TagValues>,
    pub next_token: Option<String>,
}

impl SetNextToken for TagPageRequest {
    fn set_next_token(&mut self, token: Option<String>) {
        self.next_token = token;
    }
}

impl NextToken for TagPage {
    fn next_token(&self) -> Option<&str> {
        self.next_token.as_deref()
    }
}

/// Billing API answering from an in-memory ledger
#[derive(Debug)]
pub struct LedgerApi {
    ledger: Arc<Ledger>,
    calls: AtomicUsize,
    call_limit: Option<usize>,
}

impl LedgerApi {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            calls: AtomicUsize::new(0),
            call_limit: None,
        }
    }

    /// Fail every call after the first `limit` ones, like a throttled service
    pub fn with_call_limit(mut self, limit: usize) -> Self {
        self.call_limit = Some(limit);
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Number of calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count_call(&self) -> Result<(), ApiError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.call_limit {
            Some(limit) if call > limit => Err(ApiError::LimitExceeded(limit)),
            _ => Ok(()),
        }
    }

    /// One page of costs grouped by the requested definitions
    pub async fn get_cost_and_usage(&self, request: CostPageRequest) -> Result<CostPage, ApiError> {
        self.count_call()?;
        let offset = parse_token(request.next_page_token.as_deref())?;

        let mut buckets: BTreeMap<(NaiveDate, Vec<String>), f64> = BTreeMap::new();
        for item in self.matching_items(&request.interval, &request.filters)? {
            let start = match request.granularity {
                Granularity::Interval => request.interval.start,
                Granularity::Daily => item.date,
            };
            let keys = request
                .group_by
                .iter()
                .map(|group| match group {
                    GroupDefinition::Dimension(id) => item.dimension(id).to_string(),
                    GroupDefinition::Tag(name) => {
                        format!("{name}{TAG_KEY_SEPARATOR}{}", item.tag(name))
                    }
                })
                .collect();
            *buckets.entry((start, keys)).or_default() += item.cost;
        }

        let total = buckets.len();
        let results: Vec<CostGroup> = buckets
            .into_iter()
            .skip(offset)
            .take(request.page_size.max(1))
            .map(|((start, keys), amount)| CostGroup {
                start,
                keys,
                amount,
            })
            .collect();
        let next_page_token = next_token(offset, results.len(), total);
        trace!(
            "Cost page at offset {offset}: {} of {total} groups",
            results.len()
        );

        Ok(CostPage {
            results,
            next_page_token,
        })
    }

    /// One page of tag names, each with the values seen under the filters
    pub async fn get_tags(&self, request: TagPageRequest) -> Result<TagPage, ApiError> {
        self.count_call()?;
        let offset = parse_token(request.next_token.as_deref())?;

        let mut tags: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for item in self.matching_items(&request.interval, &request.filters)? {
            for (name, value) in &item.tags {
                tags.entry(name.as_str()).or_default().insert(value.as_str());
            }
        }

        let total = tags.len();
        let page: Vec<TagValues> = tags
            .into_iter()
            .skip(offset)
            .take(request.page_size.max(1))
            .map(|(name, values)| TagValues {
                name: name.to_string(),
                values: values.into_iter().map(str::to_string).collect(),
            })
            .collect();
        let next_token = next_token(offset, page.len(), total);

        Ok(TagPage {
            tags: page,
            next_token,
        })
    }

    fn matching_items(
        &self,
        interval: &DateInterval,
        filters: &[Filter],
    ) -> Result<Vec<&LineItem>, ApiError> {
        let predicates = filters
            .iter()
            .map(FilterPredicate::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self
            .ledger
            .line_items
            .iter()
            .filter(|item| interval.contains(item.date))
            .filter(|item| predicates.iter().all(|p| p.matches(item)))
            .collect())
    }
}

enum FilterPredicate<'a> {
    Dimension { id: &'a str, value: &'a str },
    Tag { name: &'a str, value: &'a str },
}

impl<'a> FilterPredicate<'a> {
    fn parse(filter: &'a Filter) -> Result<Self, ApiError> {
        if filter.id != "TAG" {
            return Ok(Self::Dimension {
                id: &filter.id,
                value: &filter.value,
            });
        }
        match filter.value.split_once(DATA_SEPARATOR) {
            Some((name, value)) if !name.is_empty() => Ok(Self::Tag { name, value }),
            _ => Err(ApiError::InvalidTagFilter(filter.value.clone())),
        }
    }

    fn matches(&self, item: &LineItem) -> bool {
        match self {
            Self::Dimension { id, value } => item.dimension(id) == *value,
            Self::Tag { name, value } => item.tag(name) == *value,
        }
    }
}

fn parse_token(token: Option<&str>) -> Result<usize, ApiError> {
    match token {
        None => Ok(0),
        Some(token) => token
            .parse()
            .map_err(|_| ApiError::InvalidToken(token.to_string())),
    }
}

fn next_token(offset: usize, served: usize, total: usize) -> Option<String> {
    let next = offset + served;
    (served > 0 && next < total).then(|| next.to_string())
}
