//! Minimum-interval throughput gate, one per operation kind.
//!
//! This is not a token bucket: there is no burst. Each kind keeps the time of
//! its last successful acquire behind its own mutex, and a caller waits until
//! `min_interval` has passed since then. The mutex is held across the wait, so
//! concurrent callers of one kind are served one after another and every pair
//! of consecutive acquires is at least `min_interval` apart.
//!
//! A [`RateLimiter`] is meant to be shared (`Arc`) by every session talking to
//! the same upstream account. It is injected, never global.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RateConfig;
use crate::error::Cancelled;

/// Upstream operation kinds with independently configured intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Primary listing page
    List,
    /// Secondary tag lookup page
    Tags,
    /// Per-item detail read
    Detail,
}

impl OperationKind {
    pub const ALL: [Self; 3] = [Self::List, Self::Tags, Self::Detail];

    pub fn label(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Tags => "tags",
            Self::Detail => "detail",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

struct Gate {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
    acquired: AtomicU64,
}

impl Gate {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
            acquired: AtomicU64::new(0),
        }
    }
}

/// Per-kind minimum-interval gates
pub struct RateLimiter {
    list: Gate,
    tags: Gate,
    detail: Gate,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("list", &self.list.min_interval)
            .field("tags", &self.tags.min_interval)
            .field("detail", &self.detail.min_interval)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(rate: &RateConfig) -> Self {
        Self {
            list: Gate::new(rate.interval(OperationKind::List)),
            tags: Gate::new(rate.interval(OperationKind::Tags)),
            detail: Gate::new(rate.interval(OperationKind::Detail)),
        }
    }

    /// Gates that never wait (still counted)
    pub fn unlimited() -> Self {
        Self::new(&RateConfig::UNLIMITED)
    }

    fn gate(&self, kind: OperationKind) -> &Gate {
        match kind {
            OperationKind::List => &self.list,
            OperationKind::Tags => &self.tags,
            OperationKind::Detail => &self.detail,
        }
    }

    pub fn min_interval(&self, kind: OperationKind) -> Duration {
        self.gate(kind).min_interval
    }

    /// Successful acquires of `kind` so far
    pub fn acquired(&self, kind: OperationKind) -> u64 {
        self.gate(kind).acquired.load(Ordering::Relaxed)
    }

    /// Wait until a call of `kind` may proceed.
    ///
    /// Returns immediately when the interval has already elapsed. Fails with
    /// [`Cancelled`] if `cancel` fires while queued or sleeping; a cancelled
    /// acquire leaves the gate's timestamp untouched.
    pub async fn acquire(
        &self,
        kind: OperationKind,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        let gate = self.gate(kind);

        let mut last_call = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            guard = gate.last_call.lock() => guard,
        };

        if let Some(prev) = *last_call {
            let ready_at = prev + gate.min_interval;
            let now = Instant::now();
            if ready_at > now {
                log::trace!(
                    "rate gate {kind}: waiting {}ms",
                    (ready_at - now).as_millis()
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Cancelled),
                    () = tokio::time::sleep_until(ready_at) => {}
                }
            }
        }

        *last_call = Some(Instant::now());
        gate.acquired.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(list_ms: u64) -> RateLimiter {
        RateLimiter::new(&RateConfig {
            list_ms,
            tags_ms: 0,
            detail_ms: 0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn first_acquire_is_immediate() {
        let limiter = limiter(1000);
        let cancel = CancellationToken::new();
        let start = Instant::now();
        limiter.acquire(OperationKind::List, &cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.acquired(OperationKind::List), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_acquires_are_spaced() {
        let limiter = limiter(250);
        let cancel = CancellationToken::new();
        let mut stamps = Vec::new();
        for _ in 0..5 {
            limiter.acquire(OperationKind::List, &cancel).await.unwrap();
            stamps.push(Instant::now());
        }
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_serialised() {
        let limiter = Arc::new(limiter(100));
        let cancel = CancellationToken::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(OperationKind::List, &cancel).await.unwrap();
                Instant::now()
            }));
        }
        let mut stamps = Vec::new();
        for h in handles {
            stamps.push(h.await.unwrap());
        }
        stamps.sort();
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
        assert_eq!(limiter.acquired(OperationKind::List), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn kinds_are_independent() {
        let limiter = RateLimiter::new(&RateConfig {
            list_ms: 10_000,
            tags_ms: 10_000,
            detail_ms: 10_000,
        });
        let cancel = CancellationToken::new();
        let start = Instant::now();
        for kind in OperationKind::ALL {
            limiter.acquire(kind, &cancel).await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_fails_and_keeps_timestamp() {
        let limiter = Arc::new(limiter(60_000));
        let cancel = CancellationToken::new();
        limiter.acquire(OperationKind::List, &cancel).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(OperationKind::List, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(Cancelled));
        assert_eq!(limiter.acquired(OperationKind::List), 1);

        // A fresh session still has to respect the original timestamp
        let fresh = CancellationToken::new();
        let start = Instant::now();
        limiter.acquire(OperationKind::List, &fresh).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(59_000));
    }

    #[tokio::test]
    async fn already_cancelled_fails_fast() {
        let limiter = RateLimiter::unlimited();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            limiter.acquire(OperationKind::Tags, &cancel).await,
            Err(Cancelled)
        );
        assert_eq!(limiter.acquired(OperationKind::Tags), 0);
    }
}
