//! Lazy paginated enumeration of primary items.
//!
//! Nothing is fetched until the consumer polls. Every page fetch is preceded
//! by one `List` acquire on the shared rate gate, so a consumer that stops
//! polling stops both fetching and acquiring.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::time::Instant;

use crate::error::{ApiError, ListError};
use crate::events::ListingEvent;
use crate::filter::ItemFilter;
use crate::ratelimit::OperationKind;
use crate::resource::Resource;
use crate::session::Session;

/// One page of a primary listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation token; `None` or empty ends the listing
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// Primary listing API
#[async_trait]
pub trait ListApi: Send + Sync + 'static {
    type Item: Resource;

    /// Name used in error messages and telemetry
    fn resource_name(&self) -> &str;

    /// Largest page the API accepts
    fn max_page_size(&self) -> usize;

    async fn list_page(
        &self,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<Page<Self::Item>, ApiError>;
}

/// Stream of filtered pages; ends after the last page or after one error.
pub type PageStream<T> = BoxStream<'static, Result<Vec<T>, ListError>>;

/// Paginated enumerator over a [`ListApi`]
pub struct PageSource<A: ListApi> {
    api: Arc<A>,
    session: Session,
    filter: ItemFilter<A::Item>,
}

impl<A: ListApi> PageSource<A> {
    pub fn new(api: Arc<A>, session: Session) -> Self {
        Self {
            api,
            session,
            filter: ItemFilter::accept_all(),
        }
    }

    pub fn with_filter(mut self, filter: ItemFilter<A::Item>) -> Self {
        self.filter = filter;
        self
    }

    /// Pages of items that pass the filter, in encounter order.
    ///
    /// A failed page yields exactly one error and ends the stream; items of a
    /// failed page are never delivered. An empty page is yielded as an empty
    /// vector so callers can still see page boundaries.
    pub fn pages(self) -> PageStream<A::Item> {
        let Self {
            api,
            session,
            filter,
        } = self;
        let page_size = session
            .config()
            .effective_page_size(api.max_page_size());
        let progress_every = session.config().progress_every_pages;

        stream! {
            let resource = api.resource_name().to_string();
            let cancel = session.cancellation().clone();
            let start = Instant::now();
            let mut token: Option<String> = None;
            let mut pages = 0usize;
            let mut items = 0usize;

            loop {
                if session.limiter().acquire(OperationKind::List, &cancel).await.is_err() {
                    yield Err(ListError::Cancelled);
                    return;
                }

                let fetched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    r = api.list_page(token.as_deref(), page_size) => Some(r),
                };
                let page = match fetched {
                    None => {
                        yield Err(ListError::Cancelled);
                        return;
                    }
                    Some(Err(e)) => {
                        session.emit(ListingEvent::Error {
                            message: format!(
                                "Failed to list {resource} after {pages} pages ({items} items): {e}"
                            ),
                        });
                        yield Err(ListError::upstream(&resource, e));
                        return;
                    }
                    Some(Ok(page)) => page,
                };

                pages += 1;
                items += page.items.len();
                session.emit(ListingEvent::PageFetched {
                    resource: resource.clone(),
                    page: pages,
                    items: page.items.len(),
                });
                if progress_every > 0 && pages % progress_every == 0 {
                    session.emit(ListingEvent::Progress {
                        resource: resource.clone(),
                        pages,
                        items,
                        elapsed: start.elapsed(),
                    });
                }

                let next = page.next_token.filter(|t| !t.is_empty());
                let kept: Vec<A::Item> = if filter.is_accept_all() {
                    page.items
                } else {
                    page.items.into_iter().filter(|i| filter.matches(i)).collect()
                };
                yield Ok(kept);

                match next {
                    Some(t) => token = Some(t),
                    None => break,
                }
            }
        }
        .boxed()
    }

    /// Individual items, flattened from [`pages`](Self::pages)
    pub fn items(self) -> BoxStream<'static, Result<A::Item, ListError>> {
        self.pages()
            .flat_map(|page| {
                let items: Vec<Result<A::Item, ListError>> = match page {
                    Ok(items) => items.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                futures_util::stream::iter(items)
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListingConfig;
    use crate::error::ApiError;
    use crate::ratelimit::RateLimiter;
    use crate::testing::{FakeListApi, TestItem};

    fn session() -> Session {
        Session::new(Arc::new(RateLimiter::unlimited()), ListingConfig::default())
    }

    #[tokio::test]
    async fn yields_all_pages_in_order() {
        let api = Arc::new(FakeListApi::with_items(TestItem::range(0, 120), 50));
        let session = session();
        let ids: Vec<String> = PageSource::new(api.clone(), session.clone())
            .items()
            .map(|r| r.unwrap().id)
            .collect()
            .await;
        let expected: Vec<String> = TestItem::range(0, 120).into_iter().map(|i| i.id).collect();
        assert_eq!(ids, expected);
        assert_eq!(api.calls(), 3);
        assert_eq!(session.limiter().acquired(OperationKind::List), 3);
    }

    #[tokio::test]
    async fn requests_configured_page_size() {
        let api = Arc::new(FakeListApi::with_items(TestItem::range(0, 10), 50));
        let session = Session::new(
            Arc::new(RateLimiter::unlimited()),
            ListingConfig {
                page_size: Some(4),
                ..Default::default()
            },
        );
        let pages: Vec<_> = PageSource::new(api.clone(), session).pages().collect().await;
        assert_eq!(pages.len(), 3);
        assert_eq!(api.requested_sizes(), vec![4, 4, 4]);
    }

    #[tokio::test]
    async fn failed_page_yields_one_error_and_ends() {
        let api = Arc::new(
            FakeListApi::with_items(TestItem::range(0, 150), 50).fail_page(
                1,
                ApiError::Http {
                    status: Some(500),
                    message: "boom".into(),
                },
            ),
        );
        let results: Vec<_> = PageSource::new(api.clone(), session())
            .pages()
            .collect()
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().len(), 50);
        assert!(matches!(results[1], Err(ListError::Upstream { .. })));
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn filter_skips_items_silently() {
        let api = Arc::new(FakeListApi::with_items(TestItem::range(0, 20), 50));
        let filter = ItemFilter::accept_all().predicate(|i: &TestItem| i.n % 2 == 0);
        let items: Vec<_> = PageSource::new(api, session())
            .with_filter(filter)
            .items()
            .collect()
            .await;
        assert_eq!(items.len(), 10);
        assert!(items.iter().all(|r| r.as_ref().unwrap().n % 2 == 0));
    }

    #[tokio::test]
    async fn nothing_fetched_until_polled_and_stop_halts_fetching() {
        let api = Arc::new(FakeListApi::with_items(TestItem::range(0, 500), 50));
        let session = session();
        let mut items = PageSource::new(api.clone(), session.clone()).items();
        assert_eq!(api.calls(), 0);

        for _ in 0..3 {
            items.next().await.unwrap().unwrap();
        }
        drop(items);

        assert_eq!(api.calls(), 1);
        assert_eq!(session.limiter().acquired(OperationKind::List), 1);
    }

    #[tokio::test]
    async fn empty_token_ends_listing() {
        let api = Arc::new(FakeListApi::from_pages(vec![Page {
            items: TestItem::range(0, 3),
            next_token: Some(String::new()),
        }]));
        let items: Vec<_> = PageSource::new(api.clone(), session()).items().collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn cancelled_session_yields_cancelled() {
        let api = Arc::new(FakeListApi::with_items(TestItem::range(0, 10), 50));
        let session = session();
        session.cancel();
        let results: Vec<_> = PageSource::new(api.clone(), session).pages().collect().await;
        assert_eq!(results, vec![Err(ListError::Cancelled)]);
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn progress_event_cadence() {
        use crate::events::RecordingSink;

        let sink = Arc::new(RecordingSink::new());
        let session = Session::new(
            Arc::new(RateLimiter::unlimited()),
            ListingConfig {
                page_size: Some(1),
                progress_every_pages: 2,
                ..Default::default()
            },
        )
        .with_events(sink.clone());
        let api = Arc::new(FakeListApi::with_items(TestItem::range(0, 5), 50));
        let _: Vec<_> = PageSource::new(api, session).pages().collect().await;
        assert_eq!(
            sink.count(|e| matches!(e, ListingEvent::PageFetched { .. })),
            5
        );
        assert_eq!(sink.count(|e| matches!(e, ListingEvent::Progress { .. })), 2);
    }
}
