//! Batched secondary tag lookup.
//!
//! Identifiers are split into batches of at most `tag_batch_size`. Each batch
//! drives its own paginated lookup, one `Tags` acquire per page. A failed page
//! abandons the rest of its batch but keeps what was already merged; the
//! affected identifiers simply end up without tags.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use rustc_hash::FxHashMap;
use tokio::time::Instant;

use crate::error::{ApiError, Cancelled, EnrichmentError};
use crate::events::ListingEvent;
use crate::ratelimit::OperationKind;
use crate::resource::{Resource, Tags};
use crate::session::Session;

/// Tags of one resource as returned by the lookup API
#[derive(Debug, Clone, PartialEq)]
pub struct TagMapping {
    pub identifier: String,
    pub tags: Tags,
}

/// One page of a tag lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagPage {
    pub mappings: Vec<TagMapping>,
    pub next_token: Option<String>,
}

/// Secondary tagging API, keyed by resource identifier
#[async_trait]
pub trait TagApi: Send + Sync + 'static {
    /// Look up tags for at most 100 identifiers
    async fn get_resources(
        &self,
        identifiers: &[String],
        page_token: Option<&str>,
    ) -> Result<TagPage, ApiError>;
}

/// Identifier → non-empty tag set
pub type EnrichmentMap = FxHashMap<String, Tags>;

/// What happened to one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Offset of the batch's first identifier among the looked-up ones
    pub start: usize,
    pub size: usize,
    /// Lookup pages merged
    pub pages: usize,
    /// Mappings received (including empty tag sets)
    pub mappings: usize,
    /// A page failed and the rest of the batch was abandoned
    pub degraded: bool,
}

/// Result of one enrichment pass
#[derive(Debug, Default)]
pub struct Enrichment {
    pub map: EnrichmentMap,
    /// Reports in batch order
    pub batches: Vec<BatchReport>,
    pub elapsed: Duration,
}

impl Enrichment {
    /// Tags for `identifier`; empty when the lookup had nothing
    pub fn tags_for(&self, identifier: &str) -> Tags {
        self.map.get(identifier).cloned().unwrap_or_default()
    }

    pub fn degraded_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.degraded).count()
    }
}

/// Split `len` items into consecutive ranges of at most `ceiling`
pub fn plan_batches(len: usize, ceiling: usize) -> Vec<Range<usize>> {
    let ceiling = ceiling.max(1);
    (0..len)
        .step_by(ceiling)
        .map(|start| start..(start + ceiling).min(len))
        .collect()
}

/// Merge lookup results into `map`. Empty tag sets are not stored; repeated
/// identifiers accumulate into one entry. Returns the number of mappings seen.
pub fn merge_mappings(map: &mut EnrichmentMap, mappings: Vec<TagMapping>) -> usize {
    let n = mappings.len();
    for m in mappings {
        if m.tags.is_empty() {
            continue;
        }
        map.entry(m.identifier).or_default().extend(m.tags);
    }
    n
}

struct BatchOutcome {
    report: BatchReport,
    mappings: Vec<TagMapping>,
}

/// Drives [`TagApi`] lookups for a set of items
pub struct BatchEnricher<G: TagApi> {
    api: Arc<G>,
    session: Session,
}

impl<G: TagApi> BatchEnricher<G> {
    pub fn new(api: Arc<G>, session: Session) -> Self {
        Self { api, session }
    }

    /// Build the enrichment map for `items`.
    ///
    /// Only cancellation is a hard failure. Upstream errors degrade the
    /// affected batch and are reported as warning events.
    pub async fn enrich<T: Resource>(&self, items: &[T]) -> Result<Enrichment, Cancelled> {
        let start = Instant::now();
        let config = self.session.config();
        let ids: Vec<String> = items
            .iter()
            .map(|i| i.identifier())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if ids.len() < items.len() {
            log::debug!(
                "{} items without an identifier left out of tag lookup",
                items.len() - ids.len()
            );
        }
        let plan = plan_batches(ids.len(), config.tag_batch_size);
        let total = plan.len();

        let jobs: Vec<_> = plan
            .into_iter()
            .map(|range| {
                enrich_batch(
                    self.api.clone(),
                    self.session.clone(),
                    ids[range.clone()].to_vec(),
                    range.start,
                )
            })
            .collect();
        let mut outcomes =
            futures_util::stream::iter(jobs).buffer_unordered(config.tag_batch_concurrency.max(1));

        let mut enrichment = Enrichment::default();
        while let Some(outcome) = outcomes.next().await {
            let BatchOutcome { report, mappings } = outcome?;
            merge_mappings(&mut enrichment.map, mappings);
            enrichment.batches.push(report);
        }
        drop(outcomes);

        enrichment.batches.sort_unstable_by_key(|b| b.start);
        enrichment.elapsed = start.elapsed();
        if total > 0 {
            log::debug!(
                "enriched {} ids in {total} batches: {} tagged, {} degraded, {}ms",
                ids.len(),
                enrichment.map.len(),
                enrichment.degraded_batches(),
                enrichment.elapsed.as_millis()
            );
        }
        Ok(enrichment)
    }
}

async fn enrich_batch<G: TagApi>(
    api: Arc<G>,
    session: Session,
    ids: Vec<String>,
    batch_start: usize,
) -> Result<BatchOutcome, Cancelled> {
    let cancel = session.cancellation();
    let mut token: Option<String> = None;
    let mut mappings = Vec::new();
    let mut pages = 0usize;
    let mut degraded = false;

    loop {
        session
            .limiter()
            .acquire(OperationKind::Tags, cancel)
            .await?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            r = api.get_resources(&ids, token.as_deref()) => r,
        };

        match result {
            Ok(page) => {
                pages += 1;
                mappings.extend(page.mappings);
                match page.next_token.filter(|t| !t.is_empty()) {
                    Some(t) => token = Some(t),
                    None => break,
                }
            }
            Err(source) => {
                let err = EnrichmentError {
                    batch_start,
                    batch_size: ids.len(),
                    page: pages + 1,
                    source,
                };
                session.emit(ListingEvent::Warning {
                    message: format!("{err}; unresolved ids carry no tags"),
                });
                degraded = true;
                break;
            }
        }
    }

    let report = BatchReport {
        start: batch_start,
        size: ids.len(),
        pages,
        mappings: mappings.len(),
        degraded,
    };
    session.emit(ListingEvent::BatchEnriched {
        batch_start,
        batch_size: ids.len(),
        pages,
        mappings: report.mappings,
        degraded,
    });
    Ok(BatchOutcome { report, mappings })
}
