//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one spinner line per listing, updated from pipeline events.
//! Non-TTY mode: log-based output only.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::events::{EventSink, ListingEvent, LogSink};

/// Central progress context managing spinner lines.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        let is_tty = std::io::stderr().is_terminal();
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Create a status line for one listing.
    ///
    /// TTY: spinner with the resource name as prefix.
    /// Non-TTY: hidden (no-op).
    pub fn listing_line(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {prefix:<12.cyan.bold} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_prefix(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Print a line above managed progress bars (avoids interference).
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.is_tty {
            let _ = self.multi.println(msg);
        } else {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for `ProgressContext`.
pub type SharedProgress = Arc<ProgressContext>;

/// Event sink that drives a spinner line and forwards to [`LogSink`].
pub struct ProgressSink {
    pb: ProgressBar,
}

impl ProgressSink {
    pub fn new(pb: ProgressBar) -> Self {
        Self { pb }
    }
}

impl EventSink for ProgressSink {
    fn emit(&self, event: &ListingEvent) {
        match event {
            ListingEvent::PageFetched { page, .. } => {
                self.pb.set_message(format!("page {page}"));
            }
            ListingEvent::Progress { items, pages, .. } => {
                self.pb
                    .set_message(format!("{} items / {pages} pages", fmt_num(*items)));
            }
            ListingEvent::Collected { items, .. } => {
                self.pb
                    .set_message(format!("{} items, fetching tags...", fmt_num(*items)));
            }
            ListingEvent::Completed { emitted, .. }
            | ListingEvent::StoppedEarly { emitted, .. } => {
                self.pb.finish_with_message(format!("{} items", fmt_num(*emitted)));
            }
            _ => {}
        }
        LogSink.emit(event);
    }
}

/// Items per second, 0 for an empty interval
pub fn per_second(count: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// Format number with thousand separators.
pub fn fmt_num(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
