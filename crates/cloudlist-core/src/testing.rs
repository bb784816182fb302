//! In-memory fakes of the upstream APIs.
//!
//! Compiled for this crate's tests and, through the `testing` feature, for
//! downstream crates' tests. Every fake counts its calls so tests can assert
//! on fetch and acquire behaviour.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::detail::DetailApi;
use crate::enrich::{TagApi, TagMapping, TagPage};
use crate::error::ApiError;
use crate::page::{ListApi, Page};
use crate::resource::{Resource, Tags};

/// Minimal resource: a string id plus its ordinal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TestItem {
    pub id: String,
    pub n: usize,
}

impl TestItem {
    pub fn new(n: usize) -> Self {
        Self {
            id: format!("item-{n:04}"),
            n,
        }
    }

    /// Items `start..end`
    pub fn range(start: usize, end: usize) -> Vec<Self> {
        (start..end).map(Self::new).collect()
    }
}

impl Resource for TestItem {
    fn identifier(&self) -> &str {
        &self.id
    }
}

/// `{"env": value}` tag set
pub fn tags(value: &str) -> Tags {
    Tags::from([("env".to_string(), value.to_string())])
}

fn server_error(message: &str) -> ApiError {
    ApiError::Http {
        status: Some(500),
        message: message.to_string(),
    }
}

enum Source<T> {
    /// Sliced by the requested page size, token is the offset
    Items(Vec<T>),
    /// Served verbatim, token is the page index
    Pages(Vec<Page<T>>),
}

/// Fake primary listing API
pub struct FakeListApi<T> {
    source: Source<T>,
    max_page_size: usize,
    calls: AtomicUsize,
    sizes: Mutex<Vec<usize>>,
    failures: Mutex<HashMap<usize, ApiError>>,
}

impl<T: Resource> FakeListApi<T> {
    pub fn with_items(items: Vec<T>, max_page_size: usize) -> Self {
        Self {
            source: Source::Items(items),
            max_page_size,
            calls: AtomicUsize::new(0),
            sizes: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_pages(pages: Vec<Page<T>>) -> Self {
        let max_page_size = pages.iter().map(|p| p.items.len()).max().unwrap_or(1).max(1);
        Self {
            source: Source::Pages(pages),
            max_page_size,
            calls: AtomicUsize::new(0),
            sizes: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Make the `call`-th request (0-based) fail
    pub fn fail_page(self, call: usize, error: ApiError) -> Self {
        self.failures.lock().unwrap().insert(call, error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested_sizes(&self) -> Vec<usize> {
        self.sizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl<T: Resource> ListApi for FakeListApi<T> {
    type Item = T;

    fn resource_name(&self) -> &str {
        "Test Items"
    }

    fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    async fn list_page(
        &self,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<Page<T>, ApiError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.sizes.lock().unwrap().push(page_size);
        tokio::task::yield_now().await;
        if let Some(err) = self.failures.lock().unwrap().remove(&call) {
            return Err(err);
        }

        let index: usize = match page_token {
            Some(t) => t
                .parse()
                .map_err(|_| ApiError::Decode(format!("bad token {t}")))?,
            None => 0,
        };
        match &self.source {
            Source::Items(items) => {
                let end = (index + page_size).min(items.len());
                let slice = items.get(index..end).unwrap_or_default().to_vec();
                let next_token = (end < items.len()).then(|| end.to_string());
                Ok(Page {
                    items: slice,
                    next_token,
                })
            }
            Source::Pages(pages) => {
                let mut page = pages
                    .get(index)
                    .cloned()
                    .ok_or_else(|| ApiError::Decode(format!("no page {index}")))?;
                if page.next_token.as_deref().is_some_and(|t| !t.is_empty()) {
                    page.next_token = Some((index + 1).to_string());
                }
                Ok(page)
            }
        }
    }
}

/// Fake secondary tag lookup API
pub struct FakeTagApi {
    tags: HashMap<String, Tags>,
    /// Mappings returned per response page
    page_size: usize,
    /// Batch containing the id fails after the given number of good pages
    failures: Vec<(String, usize)>,
    calls: AtomicUsize,
    batches: Mutex<Vec<Vec<String>>>,
    delay: Duration,
}

impl FakeTagApi {
    pub fn new(tags: HashMap<String, Tags>) -> Self {
        Self {
            tags,
            page_size: 100,
            failures: Vec::new(),
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Tag every item with `tags("test")`
    pub fn tagging_all<T: Resource>(items: &[T]) -> Self {
        Self::new(
            items
                .iter()
                .map(|i| (i.identifier().to_string(), tags("test")))
                .collect(),
        )
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn fail_batch_containing(mut self, id: &str, good_pages: usize) -> Self {
        self.failures.push((id.to_string(), good_pages));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Identifier lists of each batch, in request order
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl TagApi for FakeTagApi {
    async fn get_resources(
        &self,
        identifiers: &[String],
        page_token: Option<&str>,
    ) -> Result<TagPage, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let page: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        if page == 0 {
            self.batches.lock().unwrap().push(identifiers.to_vec());
        }
        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }

        for (id, good_pages) in &self.failures {
            if page >= *good_pages && identifiers.contains(id) {
                return Err(server_error("tagging unavailable"));
            }
        }

        let tagged: Vec<TagMapping> = identifiers
            .iter()
            .filter_map(|id| {
                self.tags.get(id).map(|t| TagMapping {
                    identifier: id.clone(),
                    tags: t.clone(),
                })
            })
            .collect();
        let start = page * self.page_size;
        let end = (start + self.page_size).min(tagged.len());
        let mappings = tagged.get(start..end).unwrap_or_default().to_vec();
        let next_token = (end < tagged.len()).then(|| (page + 1).to_string());
        Ok(TagPage {
            mappings,
            next_token,
        })
    }
}

/// Fake per-item detail API; detail is `"detail:{id}"`
#[derive(Default)]
pub struct FakeDetailApi {
    not_found: HashSet<String>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    started: AtomicUsize,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeDetailApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn not_found(mut self, id: &str) -> Self {
        self.not_found.insert(id.to_string());
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn delay_for(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Resource> DetailApi<T> for FakeDetailApi {
    type Detail = String;

    async fn fetch_detail(&self, item: &T) -> Result<String, ApiError> {
        let id = item.identifier();
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(id).copied().unwrap_or(self.default_delay);
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.not_found.contains(id) {
            return Err(ApiError::NotFound(id.to_string()));
        }
        if self.failing.contains(id) {
            return Err(server_error("detail unavailable"));
        }
        Ok(format!("detail:{id}"))
    }
}
