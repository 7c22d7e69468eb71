//! Side-channel data collected alongside the main cost query
//!
//! A backend may start extra-data producers while answering a query, for
//! example to list the tag names and values seen under the active filters.
//! Producers run as tasks owned by an [`ExtraDataScope`] and report through
//! one bounded queue each. The aggregation engine drains every queue once the
//! period group's record stream is exhausted and folds the results into an
//! [`ExtraDataMerger`].
//!
//! Dropping the scope aborts every producer that is still running.

use crate::error::Result;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Queue capacity used by [`ExtraDataScope::default`]
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Named set of values reported by a producer, like a tag name and its values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraEntry {
    pub name: String,
    pub values: BTreeSet<String>,
}

impl ExtraEntry {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Everything collected for one kind of extra data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraDatum {
    pub kind: String,
    pub entries: BTreeMap<String, BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub errors: BTreeSet<String>,
}

impl ExtraDatum {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Add an entry, uniting its values with any already known under the same name
    pub fn insert(&mut self, entry: ExtraEntry) {
        self.entries
            .entry(entry.name)
            .or_default()
            .extend(entry.values);
    }

    /// Record a producer failure
    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.insert(error.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whether there is nothing to show
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.errors.is_empty()
    }

    /// Fold `other` into this datum
    ///
    /// Errors always join. Entries are united unless this datum already
    /// carries an error, in which case the data of `other` is ignored.
    pub fn merge(&mut self, other: ExtraDatum) {
        let had_errors = self.has_errors();
        self.errors.extend(other.errors);
        if had_errors {
            return;
        }
        for (name, values) in other.entries {
            self.entries.entry(name).or_default().extend(values);
        }
    }
}

/// Accumulates extra data across period groups, one datum per kind
#[derive(Debug, Default)]
pub struct ExtraDataMerger {
    accumulators: BTreeMap<String, ExtraDatum>,
}

impl ExtraDataMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, datum: ExtraDatum) {
        match self.accumulators.get_mut(&datum.kind) {
            Some(existing) => existing.merge(datum),
            None => {
                self.accumulators.insert(datum.kind.clone(), datum);
            }
        }
    }

    pub fn extend(&mut self, data: impl IntoIterator<Item = ExtraDatum>) {
        for datum in data {
            self.push(datum);
        }
    }

    /// Merged data, ordered by kind
    pub fn finish(self) -> Vec<ExtraDatum> {
        self.accumulators.into_values().collect()
    }
}

/// Supplementary report section built by a backend from merged extra data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraSection {
    pub title: String,
    pub datum: ExtraDatum,
}

/// Supplementary output attached to a pivot result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraOutput {
    pub sections: Vec<ExtraSection>,
}

impl ExtraOutput {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Owner of the extra-data producers started during one aggregation
///
/// # Examples
///
/// ```
/// use cloudcost_core::extra_data::{ExtraDataScope, ExtraEntry};
///
/// # tokio_test::block_on(async {
/// let mut scope = ExtraDataScope::default();
/// scope.spawn("TAG", futures::stream::iter(vec![
///     Ok(ExtraEntry::new("env", ["prod"])),
///     Ok(ExtraEntry::new("env", ["dev"])),
/// ]));
/// let data = scope.collect().await;
/// assert_eq!(data[0].entries["env"].len(), 2);
/// # });
/// ```
pub struct ExtraDataScope {
    tasks: JoinSet<()>,
    pending: Vec<(String, mpsc::Receiver<Result<ExtraEntry>>)>,
    capacity: usize,
    enabled: bool,
}

impl Default for ExtraDataScope {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl ExtraDataScope {
    /// Scope whose producers report through queues of `capacity` elements
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            pending: Vec::new(),
            capacity: capacity.max(1),
            enabled: true,
        }
    }

    /// Scope that ignores every producer
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether producers are accepted; backends may skip expensive setup otherwise
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of producers whose output has not been collected yet
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Start a producer of `kind`
    ///
    /// The producer runs until it is exhausted, yields an error, or the scope
    /// goes away. An error is forwarded as the last element of its queue.
    pub fn spawn<S>(&mut self, kind: impl Into<String>, producer: S)
    where
        S: Stream<Item = Result<ExtraEntry>> + Send + 'static,
    {
        let kind = kind.into();
        if !self.enabled {
            debug!("Extra data disabled, not starting {kind} producer");
            return;
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        let task_kind = kind.clone();
        self.tasks.spawn(async move {
            tokio::pin!(producer);
            while let Some(item) = producer.next().await {
                let terminal = item.is_err();
                if tx.send(item).await.is_err() {
                    debug!("{task_kind} consumer gone, stopping producer");
                    return;
                }
                if terminal {
                    return;
                }
            }
        });
        self.pending.push((kind, rx));
    }

    /// Wait for every started producer and return what each reported, in start order
    pub async fn collect(&mut self) -> Vec<ExtraDatum> {
        let pending = std::mem::take(&mut self.pending);
        let mut collected = Vec::with_capacity(pending.len());

        for (kind, rx) in pending {
            let mut datum = ExtraDatum::new(kind);
            let mut items = ReceiverStream::new(rx);
            while let Some(item) = items.next().await {
                match item {
                    Ok(entry) => datum.insert(entry),
                    Err(e) => {
                        warn!("Extra data producer for {} failed: {e}", datum.kind);
                        datum.push_error(e.to_string());
                        break;
                    }
                }
            }
            collected.push(datum);
        }

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Err(e) if e.is_panic() => warn!("Extra data producer panicked: {e}"),
                _ => {}
            }
        }
        collected
    }

    /// Abort every running producer and discard uncollected output
    pub fn cancel(&mut self) {
        self.tasks.abort_all();
        self.pending.clear();
    }
}
