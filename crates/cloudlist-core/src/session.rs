//! Listing session: the per-invocation bundle of shared limiter, cancellation
//! signal, event sink and validated configuration.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ListingConfig;
use crate::events::{EventSink, ListingEvent, LogSink};
use crate::ratelimit::RateLimiter;

/// Everything one listing call needs besides its upstream clients.
///
/// The limiter is shared with other sessions; the cancellation token is a
/// child of the caller's token, so cancelling the session does not cancel the
/// caller while cancelling the caller cancels every session it opened.
#[derive(Clone)]
pub struct Session {
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
    events: Arc<dyn EventSink>,
    config: ListingConfig,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("limiter", &self.limiter)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(limiter: Arc<RateLimiter>, config: ListingConfig) -> Self {
        Self {
            limiter,
            cancel: CancellationToken::new(),
            events: Arc::new(LogSink),
            config,
        }
    }

    /// Tie the session to a parent cancellation signal (e.g. Ctrl-C)
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn config(&self) -> &ListingConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    pub(crate) fn emit(&self, event: ListingEvent) {
        self.events.emit(&event);
    }
}
