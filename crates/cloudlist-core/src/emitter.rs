//! Composes paging, tag enrichment and optional detail reads into one lazy
//! stream of [`EnrichedResult`]s.
//!
//! Production only advances while the consumer polls. A stop (dropping the
//! stream, [`ListingStream::close`], or a `Break` from [`drive`]) happens at a
//! yield point, so no page fetch and no rate-gate acquire follows it.

use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_stream::stream;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::detail::{DetailApi, DetailFetcher, NoDetail};
use crate::enrich::{BatchEnricher, TagApi};
use crate::error::ListError;
use crate::events::ListingEvent;
use crate::filter::ItemFilter;
use crate::page::{ListApi, PageSource};
use crate::resource::{EnrichedResult, Resource};
use crate::session::Session;

/// When tag enrichment runs relative to paging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnrichScope {
    /// Enrich and emit each page before requesting the next
    #[default]
    PerPage,
    /// Collect the whole listing, then enrich and emit
    Collected,
}

/// Builder for one listing's output stream
pub struct StreamEmitter<L: ListApi, G: TagApi> {
    session: Session,
    list: Arc<L>,
    tags: Arc<G>,
    filter: ItemFilter<L::Item>,
    scope: EnrichScope,
}

impl<L: ListApi, G: TagApi> StreamEmitter<L, G> {
    pub fn new(session: Session, list: Arc<L>, tags: Arc<G>) -> Self {
        Self {
            session,
            list,
            tags,
            filter: ItemFilter::accept_all(),
            scope: EnrichScope::PerPage,
        }
    }

    pub fn with_filter(mut self, filter: ItemFilter<L::Item>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_scope(mut self, scope: EnrichScope) -> Self {
        self.scope = scope;
        self
    }

    /// Tagged items, no detail read
    pub fn stream(self) -> ListingStream<L::Item, ()> {
        self.build::<NoDetail>(None)
    }

    /// Tagged items with detail; items whose detail read fails are dropped.
    /// Emission order follows detail completion, not listing order.
    pub fn stream_with_detail<A>(self, detail: Arc<A>) -> ListingStream<L::Item, A::Detail>
    where
        A: DetailApi<L::Item>,
    {
        self.build(Some(detail))
    }

    fn build<A>(self, detail: Option<Arc<A>>) -> ListingStream<L::Item, A::Detail>
    where
        A: DetailApi<L::Item>,
    {
        let stop = CancellationToken::new();
        let inner = generate(self, detail, stop.clone());
        ListingStream { inner, stop }
    }
}

type ResultStream<T, D> = BoxStream<'static, Result<EnrichedResult<T, D>, ListError>>;

fn generate<L, G, A>(
    emitter: StreamEmitter<L, G>,
    detail: Option<Arc<A>>,
    stop: CancellationToken,
) -> ResultStream<L::Item, A::Detail>
where
    L: ListApi,
    G: TagApi,
    A: DetailApi<L::Item>,
{
    let StreamEmitter {
        session,
        list,
        tags,
        filter,
        scope,
    } = emitter;

    stream! {
        if stop.is_cancelled() {
            return;
        }
        let resource = list.resource_name().to_string();
        let config = session.config().clone();
        if let Err(e) = config.validate(list.max_page_size()) {
            session.emit(ListingEvent::Error {
                message: format!("Cannot list {resource}: {e}"),
            });
            yield Err(ListError::Config(e));
            return;
        }

        let start = Instant::now();
        session.emit(ListingEvent::Started {
            resource: resource.clone(),
            page_size: config.effective_page_size(list.max_page_size()),
        });

        let enricher = BatchEnricher::new(tags, session.clone());
        let fetcher = detail.map(|api| DetailFetcher::new(api, session.clone()));
        let mut pages = PageSource::new(list, session.clone())
            .with_filter(filter)
            .pages();

        let mut emitted = 0usize;
        let mut dropped = 0usize;
        let mut tag_batches = 0usize;
        let mut tag_time = Duration::ZERO;
        let mut collected = false;
        let mut pages_seen = 0usize;
        let every_items = match scope {
            EnrichScope::PerPage => 0,
            EnrichScope::Collected => config.progress_every_items,
        };

        loop {
            let chunk = match scope {
                EnrichScope::PerPage => match pages.next().await {
                    None => break,
                    Some(Ok(items)) => items,
                    Some(Err(e)) => {
                        yield Err(e);
                        return;
                    }
                },
                EnrichScope::Collected => {
                    if collected {
                        break;
                    }
                    let mut all = Vec::new();
                    while let Some(page) = pages.next().await {
                        match page {
                            Ok(items) => {
                                pages_seen += 1;
                                all.extend(items);
                            }
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        }
                    }
                    collected = true;
                    session.emit(ListingEvent::Collected {
                        resource: resource.clone(),
                        items: all.len(),
                    });
                    all
                }
            };
            if chunk.is_empty() {
                continue;
            }

            let enrichment = match enricher.enrich(&chunk).await {
                Ok(e) => e,
                Err(_) => {
                    yield Err(ListError::Cancelled);
                    return;
                }
            };
            tag_batches += enrichment.batches.len();
            tag_time += enrichment.elapsed;

            match &fetcher {
                None => {
                    for item in chunk {
                        let item_tags = enrichment.tags_for(item.identifier());
                        yield Ok(EnrichedResult::<_, A::Detail>::new(item, item_tags, None));
                        emitted += 1;
                        item_progress(
                            &session, &resource, every_items, pages_seen, emitted, start,
                        );
                        if stop.is_cancelled() {
                            session.emit(ListingEvent::StoppedEarly {
                                resource: resource.clone(),
                                emitted,
                                elapsed: start.elapsed(),
                            });
                            return;
                        }
                        if session.is_cancelled() {
                            yield Err(ListError::Cancelled);
                            return;
                        }
                    }
                }
                Some(fetcher) => {
                    let mut outcomes = fetcher.fetch_all(
                        chunk,
                        config.detail_concurrency,
                        config.stop_policy,
                    );
                    while let Some(outcome) = outcomes.next().await {
                        let detail = match outcome.result {
                            Ok(d) => d,
                            Err(_) => {
                                dropped += 1;
                                continue;
                            }
                        };
                        let item_tags = enrichment.tags_for(outcome.item.identifier());
                        yield Ok(EnrichedResult::new(outcome.item, item_tags, Some(detail)));
                        emitted += 1;
                        item_progress(
                            &session, &resource, every_items, pages_seen, emitted, start,
                        );
                        if stop.is_cancelled() {
                            outcomes.close().await;
                            session.emit(ListingEvent::StoppedEarly {
                                resource: resource.clone(),
                                emitted,
                                elapsed: start.elapsed(),
                            });
                            return;
                        }
                    }
                    if session.is_cancelled() {
                        yield Err(ListError::Cancelled);
                        return;
                    }
                }
            }
        }

        session.emit(ListingEvent::Completed {
            resource,
            emitted,
            dropped,
            tag_batches,
            tag_time,
            elapsed: start.elapsed(),
        });
    }
    .boxed()
}

fn item_progress(
    session: &Session,
    resource: &str,
    every: usize,
    pages: usize,
    items: usize,
    start: Instant,
) {
    if every > 0 && items % every == 0 {
        session.emit(ListingEvent::Progress {
            resource: resource.to_string(),
            pages,
            items,
            elapsed: start.elapsed(),
        });
    }
}

/// Lazy output of one listing.
///
/// Yields results until the listing is exhausted, or ends with exactly one
/// terminal error. Dropping it abandons any detail workers; prefer
/// [`close`](Self::close) to apply the configured stop policy.
pub struct ListingStream<T, D = ()> {
    inner: ResultStream<T, D>,
    stop: CancellationToken,
}

impl<T, D> ListingStream<T, D> {
    /// Stop early and release worker-pool resources
    pub async fn close(mut self) {
        self.stop.cancel();
        while self.inner.next().await.is_some() {}
    }
}

impl<T, D> Stream for ListingStream<T, D> {
    type Item = Result<EnrichedResult<T, D>, ListError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Outcome of [`drive`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveSummary {
    pub emitted: usize,
    /// The consumer or the limit ended the listing before it was exhausted
    pub stopped_early: bool,
}

/// Feed results to `consumer` one at a time until it breaks, `limit` results
/// have been delivered, or the listing ends.
pub async fn drive<T, D, F>(
    mut stream: ListingStream<T, D>,
    limit: Option<usize>,
    mut consumer: F,
) -> Result<DriveSummary, ListError>
where
    T: Resource,
    F: FnMut(EnrichedResult<T, D>) -> ControlFlow<()>,
{
    if limit == Some(0) {
        stream.close().await;
        return Ok(DriveSummary {
            emitted: 0,
            stopped_early: true,
        });
    }

    let mut emitted = 0usize;
    while let Some(next) = stream.next().await {
        let result = next?;
        emitted += 1;
        let flow = consumer(result);
        if flow.is_break() || limit.is_some_and(|l| emitted >= l) {
            stream.close().await;
            return Ok(DriveSummary {
                emitted,
                stopped_early: true,
            });
        }
    }
    Ok(DriveSummary {
        emitted,
        stopped_early: false,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::ListingConfig;
    use crate::detail::StopPolicy;
    use crate::error::{ApiError, ConfigError};
    use crate::events::RecordingSink;
    use crate::page::Page;
    use crate::ratelimit::{OperationKind, RateLimiter};
    use crate::testing::{FakeDetailApi, FakeListApi, FakeTagApi, TestItem, tags};

    fn session_with(config: ListingConfig) -> (Session, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let session =
            Session::new(Arc::new(RateLimiter::unlimited()), config).with_events(sink.clone());
        (session, sink)
    }

    fn ids<T: Resource, D>(results: &[EnrichedResult<T, D>]) -> Vec<String> {
        results.iter().map(|r| r.identifier().to_string()).collect()
    }

    #[tokio::test]
    async fn per_page_preserves_order_and_tags() {
        let items = TestItem::range(0, 120);
        let list = Arc::new(FakeListApi::with_items(items.clone(), 50));
        let tags_api = Arc::new(FakeTagApi::new(HashMap::from([(
            "item-0007".to_string(),
            tags("prod"),
        )])));
        let (session, sink) = session_with(ListingConfig::default());

        let results: Vec<_> = StreamEmitter::new(session, list, tags_api.clone())
            .stream()
            .map(Result::unwrap)
            .collect()
            .await;

        let expected: Vec<String> = items.into_iter().map(|i| i.id).collect();
        assert_eq!(ids(&results), expected);
        assert_eq!(results[7].tags, tags("prod"));
        assert!(results.iter().filter(|r| r.resource.n != 7).all(|r| r.tags.is_empty()));
        assert!(results.iter().all(|r| r.detail.is_none()));
        // 50 + 50 + 20: one lookup batch per page
        assert_eq!(tags_api.batches().len(), 3);
        assert_eq!(
            sink.count(|e| matches!(e, ListingEvent::Completed { emitted: 120, .. })),
            1
        );
    }

    #[tokio::test]
    async fn degraded_batch_still_emits_everything() {
        let items = TestItem::range(0, 120);
        let list = Arc::new(FakeListApi::with_items(items.clone(), 200));
        let tags_api =
            Arc::new(FakeTagApi::tagging_all(&items).fail_batch_containing("item-0100", 0));
        let (session, sink) = session_with(ListingConfig::default());

        let results: Vec<_> = StreamEmitter::new(session, list, tags_api)
            .with_scope(EnrichScope::Collected)
            .stream()
            .collect()
            .await;

        assert_eq!(results.len(), 120);
        let results: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(results.iter().filter(|r| !r.tags.is_empty()).count(), 100);
        assert!(results[100..].iter().all(|r| r.tags.is_empty()));
        assert_eq!(sink.warnings().len(), 1);
    }

    #[tokio::test]
    async fn collected_scope_reports_progress_by_items() {
        let items = TestItem::range(0, 250);
        let list = Arc::new(FakeListApi::with_items(items.clone(), 1000));
        let tags_api = Arc::new(FakeTagApi::tagging_all(&items));
        let (session, sink) = session_with(ListingConfig::default());

        let results: Vec<_> = StreamEmitter::new(session, list, tags_api)
            .with_scope(EnrichScope::Collected)
            .stream()
            .collect()
            .await;

        assert_eq!(results.len(), 250);
        let progress: Vec<(usize, usize)> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ListingEvent::Progress { pages, items, .. } => Some((pages, items)),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![(1, 100), (1, 200)]);
    }

    #[tokio::test]
    async fn per_page_scope_has_no_item_progress() {
        let items = TestItem::range(0, 250);
        let list = Arc::new(FakeListApi::with_items(items, 1000));
        let tags_api = Arc::new(FakeTagApi::new(HashMap::new()));
        let (session, sink) = session_with(ListingConfig::default());

        let count = StreamEmitter::new(session, list, tags_api).stream().count().await;

        assert_eq!(count, 250);
        assert_eq!(sink.count(|e| matches!(e, ListingEvent::Progress { .. })), 0);
    }

    #[tokio::test]
    async fn stop_after_three_items_fetches_one_page() {
        let list = Arc::new(FakeListApi::with_items(TestItem::range(0, 500), 50));
        let tags_api = Arc::new(FakeTagApi::new(HashMap::new()));
        let (session, sink) = session_with(ListingConfig::default());

        let stream = StreamEmitter::new(session.clone(), list.clone(), tags_api).stream();
        let mut taken = Vec::new();
        let summary = drive(stream, None, |r| {
            taken.push(r);
            if taken.len() == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await
        .unwrap();

        assert_eq!(
            summary,
            DriveSummary {
                emitted: 3,
                stopped_early: true
            }
        );
        assert_eq!(list.calls(), 1);
        assert_eq!(session.limiter().acquired(OperationKind::List), 1);
        assert_eq!(
            sink.count(|e| matches!(e, ListingEvent::StoppedEarly { emitted: 3, .. })),
            1
        );
        assert_eq!(sink.count(|e| matches!(e, ListingEvent::Completed { .. })), 0);
    }

    #[tokio::test]
    async fn limit_bounds_emission() {
        let list = Arc::new(FakeListApi::with_items(TestItem::range(0, 30), 10));
        let tags_api = Arc::new(FakeTagApi::new(HashMap::new()));
        let (session, _) = session_with(ListingConfig::default());

        let mut seen = 0;
        let summary = drive(
            StreamEmitter::new(session, list.clone(), tags_api).stream(),
            Some(12),
            |_| {
                seen += 1;
                ControlFlow::Continue(())
            },
        )
        .await
        .unwrap();
        assert_eq!(seen, 12);
        assert_eq!(summary.emitted, 12);
        assert_eq!(list.calls(), 2);
    }

    #[tokio::test]
    async fn zero_limit_fetches_nothing() {
        let list = Arc::new(FakeListApi::with_items(TestItem::range(0, 30), 10));
        let tags_api = Arc::new(FakeTagApi::new(HashMap::new()));
        let (session, _) = session_with(ListingConfig::default());
        let summary = drive(
            StreamEmitter::new(session, list.clone(), tags_api).stream(),
            Some(0),
            |_| ControlFlow::Continue(()),
        )
        .await
        .unwrap();
        assert_eq!(summary.emitted, 0);
        assert_eq!(list.calls(), 0);
    }

    #[tokio::test]
    async fn upstream_failure_is_single_terminal_error() {
        let list = Arc::new(
            FakeListApi::with_items(TestItem::range(0, 150), 50).fail_page(
                1,
                ApiError::Http {
                    status: Some(403),
                    message: "denied".into(),
                },
            ),
        );
        let tags_api = Arc::new(FakeTagApi::new(HashMap::new()));
        let (session, sink) = session_with(ListingConfig::default());

        let results: Vec<_> = StreamEmitter::new(session, list, tags_api)
            .stream()
            .collect()
            .await;
        assert_eq!(results.len(), 51);
        assert!(results[..50].iter().all(Result::is_ok));
        let err = results[50].as_ref().unwrap_err();
        assert!(err.to_string().starts_with("listing Test Items: HTTP 403"));
        assert_eq!(sink.count(|e| matches!(e, ListingEvent::Error { .. })), 1);
    }

    #[tokio::test]
    async fn drive_returns_upstream_error() {
        let list = Arc::new(FakeListApi::with_items(TestItem::range(0, 10), 50).fail_page(
            0,
            ApiError::Http {
                status: Some(500),
                message: "down".into(),
            },
        ));
        let tags_api = Arc::new(FakeTagApi::new(HashMap::new()));
        let (session, _) = session_with(ListingConfig::default());
        let err = drive(
            StreamEmitter::new(session, list, tags_api).stream(),
            None,
            |_| ControlFlow::Continue(()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ListError::Upstream { .. }));
    }

    #[tokio::test]
    async fn invalid_config_rejected_before_any_call() {
        let list = Arc::new(FakeListApi::with_items(TestItem::range(0, 10), 50));
        let tags_api = Arc::new(FakeTagApi::new(HashMap::new()));
        let (session, _) = session_with(ListingConfig {
            page_size: Some(500),
            ..Default::default()
        });
        let results: Vec<_> = StreamEmitter::new(session, list.clone(), tags_api)
            .stream()
            .collect()
            .await;
        assert_eq!(
            results,
            vec![Err(ListError::Config(ConfigError::PageSizeTooLarge {
                requested: 500,
                max: 50
            }))]
        );
        assert_eq!(list.calls(), 0);
    }

    #[tokio::test]
    async fn cancellation_mid_listing_ends_with_cancelled() {
        let list = Arc::new(FakeListApi::with_items(TestItem::range(0, 100), 10));
        let tags_api = Arc::new(FakeTagApi::new(HashMap::new()));
        let (session, _) = session_with(ListingConfig::default());

        let mut stream = StreamEmitter::new(session.clone(), list, tags_api).stream();
        let mut results = Vec::new();
        while let Some(r) = stream.next().await {
            if results.len() == 4 {
                session.cancel();
            }
            results.push(r);
        }
        assert_eq!(results.len(), 6);
        assert!(results[..5].iter().all(Result::is_ok));
        assert_eq!(results[5], Err(ListError::Cancelled));
    }

    #[tokio::test]
    async fn empty_listing_completes() {
        let list = Arc::new(FakeListApi::from_pages(vec![Page::last(Vec::<TestItem>::new())]));
        let tags_api = Arc::new(FakeTagApi::new(HashMap::new()));
        let (session, sink) = session_with(ListingConfig::default());
        let results: Vec<_> = StreamEmitter::new(session, list, tags_api.clone())
            .stream()
            .collect()
            .await;
        assert!(results.is_empty());
        assert_eq!(tags_api.calls(), 0);
        assert_eq!(
            sink.count(|e| matches!(e, ListingEvent::Completed { emitted: 0, .. })),
            1
        );
    }

    #[tokio::test]
    async fn filter_applies_before_enrichment() {
        let items = TestItem::range(0, 20);
        let list = Arc::new(FakeListApi::with_items(items.clone(), 50));
        let tags_api = Arc::new(FakeTagApi::tagging_all(&items));
        let (session, _) = session_with(ListingConfig::default());

        let results: Vec<_> = StreamEmitter::new(session, list, tags_api.clone())
            .with_filter(ItemFilter::accept_all().predicate(|i: &TestItem| i.n < 5))
            .stream()
            .collect()
            .await;
        assert_eq!(results.len(), 5);
        assert_eq!(tags_api.batches()[0].len(), 5);
    }

    #[tokio::test]
    async fn detail_not_found_drops_one_of_ten() {
        let items = TestItem::range(0, 10);
        let list = Arc::new(FakeListApi::with_items(items.clone(), 50));
        let tags_api = Arc::new(FakeTagApi::tagging_all(&items));
        let detail = Arc::new(FakeDetailApi::new().not_found("item-0004"));
        let (session, sink) = session_with(ListingConfig {
            detail_concurrency: 4,
            ..Default::default()
        });

        let results: Vec<_> = StreamEmitter::new(session, list, tags_api)
            .with_scope(EnrichScope::Collected)
            .stream_with_detail(detail)
            .collect()
            .await;

        let results: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        let got: HashSet<String> = ids(&results).into_iter().collect();
        let expected: HashSet<String> = items
            .iter()
            .map(|i| i.id.clone())
            .filter(|id| id != "item-0004")
            .collect();
        assert_eq!(got, expected);
        for r in &results {
            assert_eq!(r.detail.as_deref(), Some(format!("detail:{}", r.resource.id).as_str()));
            assert_eq!(r.tags, tags("test"));
        }
        assert_eq!(
            sink.count(|e| matches!(
                e,
                ListingEvent::Completed {
                    emitted: 9,
                    dropped: 1,
                    ..
                }
            )),
            1
        );
        assert!(sink.warnings().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_with_detail_abandons_workers() {
        let items = TestItem::range(0, 10);
        let list = Arc::new(FakeListApi::with_items(items.clone(), 50));
        let tags_api = Arc::new(FakeTagApi::new(HashMap::new()));
        let detail = Arc::new(
            FakeDetailApi::new()
                .default_delay(Duration::from_secs(10))
                .delay_for("item-0000", Duration::from_millis(1)),
        );
        let (session, _) = session_with(ListingConfig {
            detail_concurrency: 3,
            stop_policy: StopPolicy::Abandon,
            ..Default::default()
        });

        let stream = StreamEmitter::new(session, list, tags_api)
            .with_scope(EnrichScope::Collected)
            .stream_with_detail(detail.clone());
        let summary = drive(stream, Some(1), |_| ControlFlow::Continue(()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(summary.emitted, 1);
        assert_eq!(detail.completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_with_detail_drains_in_flight() {
        let items = TestItem::range(0, 10);
        let list = Arc::new(FakeListApi::with_items(items.clone(), 50));
        let tags_api = Arc::new(FakeTagApi::new(HashMap::new()));
        let detail = Arc::new(
            FakeDetailApi::new()
                .default_delay(Duration::from_secs(10))
                .delay_for("item-0000", Duration::from_millis(1)),
        );
        let (session, _) = session_with(ListingConfig {
            detail_concurrency: 3,
            stop_policy: StopPolicy::Drain,
            ..Default::default()
        });

        let stream = StreamEmitter::new(session, list, tags_api)
            .with_scope(EnrichScope::Collected)
            .stream_with_detail(detail.clone());
        drive(stream, Some(1), |_| ControlFlow::Continue(()))
            .await
            .unwrap();

        let started = detail.started();
        assert!(started < 10);
        assert_eq!(detail.completed(), started);
    }
}
