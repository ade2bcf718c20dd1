mod http;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::MonitoredItem;

pub use http::HttpFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Network,
    Timeout,
    Http(u16),
    /// The fetcher cannot serve this item at all; retrying will not help.
    Unsupported,
}

impl FetchErrorKind {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchErrorKind::Unsupported)
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::Network => write!(f, "network error"),
            FetchErrorKind::Timeout => write!(f, "timed out"),
            FetchErrorKind::Http(status) => write!(f, "HTTP {}", status),
            FetchErrorKind::Unsupported => write!(f, "unsupported"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub raw_content: String,
    pub fetched_at: DateTime<Utc>,
    pub success: bool,
    pub error_kind: Option<FetchErrorKind>,
    pub error_message: Option<String>,
    pub http_status: Option<u16>,
    pub response_time_ms: u64,
}

impl FetchResult {
    pub fn ok(raw_content: String, http_status: Option<u16>, response_time_ms: u64) -> Self {
        Self {
            raw_content,
            fetched_at: Utc::now(),
            success: true,
            error_kind: None,
            error_message: None,
            http_status,
            response_time_ms,
        }
    }

    pub fn failed(kind: FetchErrorKind, message: impl Into<String>, response_time_ms: u64) -> Self {
        let http_status = match kind {
            FetchErrorKind::Http(status) => Some(status),
            _ => None,
        };
        Self {
            raw_content: String::new(),
            fetched_at: Utc::now(),
            success: false,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            http_status,
            response_time_ms,
        }
    }

    /// Short reason suitable for `last_error`.
    pub fn error_summary(&self) -> String {
        match (&self.error_kind, &self.error_message) {
            (Some(kind), Some(message)) => format!("{}: {}", kind, message),
            (Some(kind), None) => kind.to_string(),
            (None, _) => "unknown error".to_string(),
        }
    }
}

/// Fetch collaborator. Failures are reported inside the result, never raised.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, item: &MonitoredItem) -> FetchResult;
}
