//! Bounded worker pool for per-item detail reads.
//!
//! A fixed number of workers claim items from a shared [`WorkQueue`], each
//! read gated by the `Detail` rate kind, and push outcomes into one bounded
//! channel. Outcomes arrive in completion order. A failed read, including
//! not-found, affects only its own item.

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, DetailFetchError};
use crate::events::ListingEvent;
use crate::ratelimit::OperationKind;
use crate::resource::Resource;
use crate::session::Session;
use crate::work_queue::WorkQueue;

/// What stopping a detail stream does to its workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopPolicy {
    /// Abort in-flight reads immediately
    #[default]
    Abandon,
    /// Claim no new items and pass the rate gate no more; reads already
    /// past the gate finish
    Drain,
}

impl fmt::Display for StopPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Abandon => "abandon",
            Self::Drain => "drain",
        })
    }
}

impl FromStr for StopPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abandon" => Ok(Self::Abandon),
            "drain" => Ok(Self::Drain),
            other => Err(format!("unknown stop policy {other:?} (expected abandon or drain)")),
        }
    }
}

/// Per-item supplementary read
#[async_trait]
pub trait DetailApi<T: Resource>: Send + Sync + 'static {
    type Detail: Send + 'static;

    /// Read detail for one item. [`ApiError::NotFound`] means the item
    /// vanished after it was listed.
    async fn fetch_detail(&self, item: &T) -> Result<Self::Detail, ApiError>;
}

/// Placeholder for listings without a detail read
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDetail;

#[async_trait]
impl<T: Resource> DetailApi<T> for NoDetail {
    type Detail = ();

    async fn fetch_detail(&self, _item: &T) -> Result<(), ApiError> {
        Ok(())
    }
}

/// One completed read
#[derive(Debug)]
pub struct DetailOutcome<T, D> {
    pub item: T,
    pub result: Result<D, DetailFetchError>,
}

/// Spawns detail workers
pub struct DetailFetcher<A> {
    api: Arc<A>,
    session: Session,
}

impl<A> DetailFetcher<A> {
    pub fn new(api: Arc<A>, session: Session) -> Self {
        Self { api, session }
    }

    /// Start reading detail for `items` on `min(concurrency, items.len())`
    /// workers. Must be called inside a tokio runtime.
    pub fn fetch_all<T>(
        &self,
        items: Vec<T>,
        concurrency: usize,
        policy: StopPolicy,
    ) -> DetailStream<T, A::Detail>
    where
        T: Resource,
        A: DetailApi<T>,
    {
        let n_workers = concurrency.max(1).min(items.len());
        let queue = Arc::new(WorkQueue::new(items));
        let (tx, rx) = mpsc::channel(concurrency.max(1));
        let cancel = self.session.cancellation().child_token();
        let closing = cancel.child_token();

        let mut workers = JoinSet::new();
        for _ in 0..n_workers {
            workers.spawn(worker(
                self.api.clone(),
                self.session.clone(),
                queue.clone(),
                tx.clone(),
                Shutdown {
                    cancel: cancel.clone(),
                    closing: closing.clone(),
                },
            ));
        }
        log::debug!(
            "detail pool: {n_workers} workers for {} items ({policy} on stop)",
            queue.total()
        );

        DetailStream {
            rx,
            workers,
            queue,
            cancel,
            closing,
            policy,
        }
    }
}

/// Stop signals seen by a worker
struct Shutdown {
    /// Abandon: leave everything, including reads in progress
    cancel: CancellationToken,
    /// Child of `cancel`, also fired by a drain: no more rate-gate acquires
    closing: CancellationToken,
}

async fn worker<T, A>(
    api: Arc<A>,
    session: Session,
    queue: Arc<WorkQueue<T>>,
    tx: mpsc::Sender<DetailOutcome<T, A::Detail>>,
    shutdown: Shutdown,
) where
    T: Resource,
    A: DetailApi<T>,
{
    while let Some(item) = queue.next() {
        let item = item.clone();
        // A claimed item is not in flight until it is past the gate
        if session
            .limiter()
            .acquire(OperationKind::Detail, &shutdown.closing)
            .await
            .is_err()
        {
            return;
        }

        let fetched = tokio::select! {
            biased;
            _ = shutdown.cancel.cancelled() => return,
            r = api.fetch_detail(&item) => r,
        };
        let result = fetched.map_err(|source| DetailFetchError {
            identifier: item.identifier().to_string(),
            source,
        });
        if let Err(e) = &result {
            if e.is_not_found() {
                log::debug!("{}: gone before detail read, skipping", e.identifier);
            } else {
                session.emit(ListingEvent::Warning {
                    message: format!("dropping item: {e}"),
                });
            }
        }

        if tx.send(DetailOutcome { item, result }).await.is_err() {
            return;
        }
    }
}

/// Outcomes of a running detail pool, in completion order.
///
/// Ends once every item has been read. Dropping the stream abandons the
/// workers; [`close`](DetailStream::close) applies the configured
/// [`StopPolicy`] and waits for the workers to exit.
pub struct DetailStream<T, D> {
    rx: mpsc::Receiver<DetailOutcome<T, D>>,
    workers: JoinSet<()>,
    queue: Arc<WorkQueue<T>>,
    cancel: CancellationToken,
    closing: CancellationToken,
    policy: StopPolicy,
}

impl<T, D> DetailStream<T, D> {
    /// Workers still running
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    pub fn policy(&self) -> StopPolicy {
        self.policy
    }

    /// Stop the pool early
    pub async fn close(mut self) {
        match self.policy {
            StopPolicy::Abandon => {
                self.cancel.cancel();
                self.workers.abort_all();
            }
            StopPolicy::Drain => {
                self.queue.close();
                self.closing.cancel();
                self.rx.close();
            }
        }
        while self.workers.join_next().await.is_some() {}
        log::debug!(
            "detail pool closed ({}), {} of {} items claimed",
            self.policy,
            self.queue.claimed(),
            self.queue.total()
        );
    }
}

impl<T, D> Stream for DetailStream<T, D> {
    type Item = DetailOutcome<T, D>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T, D> Drop for DetailStream<T, D> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
