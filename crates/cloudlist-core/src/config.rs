//! Listing configuration
//!
//! Deserialized from the `[listing]` and `[rate]` sections of the CLI config
//! file. Call [`ListingConfig::validate`] before opening a session; invalid
//! values are rejected before any network call.

use std::time::Duration;

use serde::Deserialize;

use crate::detail::StopPolicy;
use crate::error::ConfigError;
use crate::ratelimit::OperationKind;

/// Maximum identifiers per secondary tag lookup call
pub const MAX_TAG_BATCH_SIZE: usize = 100;

/// Tunables for one listing invocation
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Primary page size; `None` uses the API's maximum
    pub page_size: Option<usize>,
    /// Identifiers per tag lookup batch
    pub tag_batch_size: usize,
    /// Tag batches in flight at once
    pub tag_batch_concurrency: usize,
    /// Worker pool width for per-item detail reads
    pub detail_concurrency: usize,
    /// Emit a progress event every N primary pages (0 disables)
    pub progress_every_pages: usize,
    /// Emit a progress event every N emitted items in the collect-all scope (0 disables)
    pub progress_every_items: usize,
    /// What a consumer stop does to in-flight detail workers
    pub stop_policy: StopPolicy,
    pub rate: RateConfig,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: None,
            tag_batch_size: MAX_TAG_BATCH_SIZE,
            tag_batch_concurrency: 1,
            detail_concurrency: 8,
            progress_every_pages: 10,
            progress_every_items: 100,
            stop_policy: StopPolicy::default(),
            rate: RateConfig::default(),
        }
    }
}

impl ListingConfig {
    /// Check every tunable. `max_page_size` comes from the listing API.
    pub fn validate(&self, max_page_size: usize) -> Result<(), ConfigError> {
        if let Some(size) = self.page_size {
            if size == 0 {
                return Err(ConfigError::ZeroPageSize);
            }
            if size > max_page_size {
                return Err(ConfigError::PageSizeTooLarge {
                    requested: size,
                    max: max_page_size,
                });
            }
        }
        if self.tag_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.tag_batch_size > MAX_TAG_BATCH_SIZE {
            return Err(ConfigError::BatchSizeTooLarge {
                requested: self.tag_batch_size,
                max: MAX_TAG_BATCH_SIZE,
            });
        }
        if self.tag_batch_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency("tag batch concurrency"));
        }
        if self.detail_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency("detail concurrency"));
        }
        Ok(())
    }

    /// Effective page size for an API with the given maximum
    pub fn effective_page_size(&self, max_page_size: usize) -> usize {
        self.page_size.unwrap_or(max_page_size)
    }
}

/// Minimum interval between calls, per operation kind, in milliseconds.
///
/// Defaults are deliberately conservative: 1 call/s for listing and detail
/// reads, 5 calls/s for tag lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    pub list_ms: u64,
    pub tags_ms: u64,
    pub detail_ms: u64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            list_ms: 1000,
            tags_ms: 200,
            detail_ms: 1000,
        }
    }
}

impl RateConfig {
    /// No waiting between calls of any kind
    pub const UNLIMITED: Self = Self {
        list_ms: 0,
        tags_ms: 0,
        detail_ms: 0,
    };

    pub fn interval(&self, kind: OperationKind) -> Duration {
        let ms = match kind {
            OperationKind::List => self.list_ms,
            OperationKind::Tags => self.tags_ms,
            OperationKind::Detail => self.detail_ms,
        };
        Duration::from_millis(ms)
    }
}
