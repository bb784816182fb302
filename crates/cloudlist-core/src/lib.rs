//! cloudlist core - streaming enumeration and enrichment of cloud resources
//!
//! A listing pulls pages from a primary API, attaches tags from a batched
//! secondary lookup and optionally reads per-item detail on a bounded worker
//! pool. Every upstream call passes a shared per-kind rate gate. Output is a
//! lazy [`ListingStream`] the caller consumes one item at a time.

pub mod config;
pub mod detail;
pub mod emitter;
pub mod enrich;
pub mod error;
pub mod events;
pub mod filter;
pub mod logging;
pub mod page;
pub mod progress;
pub mod ratelimit;
pub mod resource;
pub mod retry;
pub mod session;
pub mod shutdown;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod work_queue;

// Re-exports for convenience
pub use config::{ListingConfig, MAX_TAG_BATCH_SIZE, RateConfig};
pub use detail::{DetailApi, DetailFetcher, DetailOutcome, DetailStream, NoDetail, StopPolicy};
pub use emitter::{DriveSummary, EnrichScope, ListingStream, StreamEmitter, drive};
pub use enrich::{
    BatchEnricher, BatchReport, Enrichment, EnrichmentMap, TagApi, TagMapping, TagPage,
};
pub use error::{ApiError, Cancelled, ConfigError, DetailFetchError, EnrichmentError, ListError};
pub use events::{EventSink, ListingEvent, LogSink, RecordingSink};
pub use filter::ItemFilter;
pub use logging::{IndicatifLogger, init_logging};
pub use page::{ListApi, Page, PageSource};
pub use progress::{ProgressContext, ProgressSink, SharedProgress, fmt_num};
pub use ratelimit::{OperationKind, RateLimiter};
pub use resource::{EnrichedResult, Resource, Tags};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use session::Session;
pub use shutdown::cancel_on_ctrl_c;
pub use tokio_util::sync::CancellationToken;
