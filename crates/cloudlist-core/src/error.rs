//! Error taxonomy for listing pipelines
//!
//! Hard errors ([`ListError`]) end a listing with exactly one terminal result.
//! Soft errors ([`EnrichmentError`], [`DetailFetchError`]) degrade the output
//! and are reported through the event sink only.

use std::fmt;

/// Error returned by an upstream API call (listing, tagging or detail read).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// HTTP or transport error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// The requested resource no longer exists
    NotFound(String),
    /// Response body could not be decoded
    Decode(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Decode(message) => write!(f, "decode error: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Throttling (429) and server errors (5xx) are worth another attempt.
    /// Network errors without a status are too.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => matches!(status, None | Some(429) | Some(500..=599)),
            Self::NotFound(_) | Self::Decode(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::Http {
                    status: Some(404),
                    ..
                }
        )
    }
}

/// The listing session was cancelled while waiting or fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("listing cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Invalid listing configuration, rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroPageSize,
    PageSizeTooLarge { requested: usize, max: usize },
    ZeroBatchSize,
    BatchSizeTooLarge { requested: usize, max: usize },
    ZeroConcurrency(&'static str),
    InvalidPattern { pattern: String, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroPageSize => f.write_str("page size must be at least 1"),
            Self::PageSizeTooLarge { requested, max } => {
                write!(f, "page size {requested} exceeds API maximum {max}")
            }
            Self::ZeroBatchSize => f.write_str("tag batch size must be at least 1"),
            Self::BatchSizeTooLarge { requested, max } => {
                write!(f, "tag batch size {requested} exceeds API maximum {max}")
            }
            Self::ZeroConcurrency(what) => write!(f, "{what} must be at least 1"),
            Self::InvalidPattern { pattern, message } => {
                write!(f, "invalid name pattern {pattern:?}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Hard failure of a listing. Emitted once, as the last item of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    /// The primary listing API failed; no further items follow
    Upstream { resource: String, source: ApiError },
    Cancelled,
    Config(ConfigError),
}

impl ListError {
    pub fn upstream(resource: &str, source: ApiError) -> Self {
        Self::Upstream {
            resource: resource.to_string(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for ListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream { resource, source } => write!(f, "listing {resource}: {source}"),
            Self::Cancelled => fmt::Display::fmt(&Cancelled, f),
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ListError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Upstream { source, .. } => Some(source),
            Self::Config(e) => Some(e),
            Self::Cancelled => None,
        }
    }
}

impl From<Cancelled> for ListError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<ConfigError> for ListError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// A secondary tag lookup page failed. The rest of its batch is abandoned.
#[derive(Debug, Clone)]
pub struct EnrichmentError {
    pub batch_start: usize,
    pub batch_size: usize,
    /// 1-based page number within the batch
    pub page: usize,
    pub source: ApiError,
}

impl fmt::Display for EnrichmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tag lookup failed for batch at {} ({} ids), page {}: {}",
            self.batch_start, self.batch_size, self.page, self.source
        )
    }
}

impl std::error::Error for EnrichmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// A per-item detail read failed. Only that item is dropped.
#[derive(Debug, Clone)]
pub struct DetailFetchError {
    pub identifier: String,
    pub source: ApiError,
}

impl DetailFetchError {
    /// The item vanished between listing and detail read
    pub fn is_not_found(&self) -> bool {
        self.source.is_not_found()
    }
}

impl fmt::Display for DetailFetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reading {}: {}", self.identifier, self.source)
    }
}

impl std::error::Error for DetailFetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_err(status: u16) -> ApiError {
        ApiError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn throttling_retryable() {
        assert!(http_err(429).is_retryable());
    }

    #[test]
    fn server_error_retryable() {
        assert!(http_err(500).is_retryable());
        assert!(http_err(503).is_retryable());
    }

    #[test]
    fn client_error_not_retryable() {
        assert!(!http_err(400).is_retryable());
        assert!(!http_err(403).is_retryable());
    }

    #[test]
    fn network_error_retryable() {
        let err = ApiError::Http {
            status: None,
            message: "connection reset".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn not_found_variants() {
        assert!(ApiError::NotFound("bucket".into()).is_not_found());
        assert!(http_err(404).is_not_found());
        assert!(!http_err(500).is_not_found());
        assert!(!ApiError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn display_upstream() {
        let err = ListError::upstream("CloudWatch Logs Log Groups", http_err(500));
        assert_eq!(
            format!("{err}"),
            "listing CloudWatch Logs Log Groups: HTTP 500: test"
        );
    }

    #[test]
    fn display_http_without_status() {
        let err = ApiError::Http {
            status: None,
            message: "timeout".to_string(),
        };
        assert_eq!(format!("{err}"), "HTTP error: timeout");
    }

    #[test]
    fn cancelled_converts() {
        let err: ListError = Cancelled.into();
        assert!(err.is_cancelled());
        assert_eq!(format!("{err}"), "listing cancelled");
    }

    #[test]
    fn detail_not_found() {
        let err = DetailFetchError {
            identifier: "arn:aws:s3:::gone".into(),
            source: ApiError::NotFound("gone".into()),
        };
        assert!(err.is_not_found());
        assert!(format!("{err}").contains("arn:aws:s3:::gone"));
    }
}
