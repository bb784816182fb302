//! Listing lifecycle events
//!
//! The pipeline reports what it does through an [`EventSink`]. Sinks are a
//! pure side channel: emitting never blocks on I/O the pipeline waits for and
//! never changes control flow.

use std::sync::Mutex;
use std::time::Duration;

use crate::progress::{fmt_num, per_second};

#[derive(Debug, Clone, PartialEq)]
pub enum ListingEvent {
    Started {
        resource: String,
        page_size: usize,
    },
    PageFetched {
        resource: String,
        page: usize,
        items: usize,
    },
    /// Emitted every `progress_every_pages` pages, and in the collected scope
    /// every `progress_every_items` emitted items
    Progress {
        resource: String,
        pages: usize,
        items: usize,
        elapsed: Duration,
    },
    /// Full listing collected before enrichment (collected scope only)
    Collected {
        resource: String,
        items: usize,
    },
    BatchEnriched {
        batch_start: usize,
        batch_size: usize,
        pages: usize,
        mappings: usize,
        degraded: bool,
    },
    /// Consumer stopped before the listing was exhausted
    StoppedEarly {
        resource: String,
        emitted: usize,
        elapsed: Duration,
    },
    Completed {
        resource: String,
        emitted: usize,
        dropped: usize,
        tag_batches: usize,
        tag_time: Duration,
        elapsed: Duration,
    },
    Warning {
        message: String,
    },
    Error {
        message: String,
    },
}

/// Receiver of lifecycle events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ListingEvent);
}

/// Renders events through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &ListingEvent) {
        match event {
            ListingEvent::Started {
                resource,
                page_size,
            } => log::info!("Listing {resource} (page size {page_size})"),
            ListingEvent::PageFetched {
                resource,
                page,
                items,
            } => log::debug!("{resource}: page {page} with {items} items"),
            ListingEvent::Progress {
                resource,
                pages,
                items,
                elapsed,
            } => log::info!(
                "{resource}: {} items from {pages} pages in {}s ({:.1}/s)",
                fmt_num(*items),
                elapsed.as_secs(),
                per_second(*items, *elapsed)
            ),
            ListingEvent::Collected { resource, items } => {
                log::info!("{resource}: collected {} items", fmt_num(*items))
            }
            ListingEvent::BatchEnriched {
                batch_start,
                batch_size,
                pages,
                mappings,
                degraded,
            } => log::debug!(
                "tag batch at {batch_start} ({batch_size} ids): \
                 {mappings} tagged over {pages} pages{}",
                if *degraded { " [degraded]" } else { "" }
            ),
            ListingEvent::StoppedEarly {
                resource,
                emitted,
                elapsed,
            } => log::info!(
                "{resource}: listing stopped by caller after {} items in {:.1}s",
                fmt_num(*emitted),
                elapsed.as_secs_f64()
            ),
            ListingEvent::Completed {
                resource,
                emitted,
                dropped,
                tag_batches,
                tag_time,
                elapsed,
            } => {
                log::info!(
                    "{resource}: {} items in {:.1}s ({:.1}/s), {tag_batches} tag batches in {}ms",
                    fmt_num(*emitted),
                    elapsed.as_secs_f64(),
                    per_second(*emitted, *elapsed),
                    tag_time.as_millis()
                );
                if *dropped > 0 {
                    log::info!("{resource}: {dropped} items dropped after failed detail reads");
                }
            }
            ListingEvent::Warning { message } => log::warn!("{message}"),
            ListingEvent::Error { message } => log::error!("{message}"),
        }
    }
}

/// Keeps every event in memory, for tests and embedding callers
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ListingEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ListingEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ListingEvent::Warning { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&ListingEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &ListingEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
