//! Error taxonomy of the pipeline.
//!
//! Nothing here is fatal to the process: adapter errors advance the fallback chain,
//! scrape errors exclude a signal, and only `TemporarilyUnavailable` reaches callers.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure of a single source adapter call. Adapters never retry on their own.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    #[error("rate limited until {reset_at:?}")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("unauthorized (status {status})")]
    Unauthorized { status: u16 },

    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl AdapterError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::RateLimited { .. } => "rate_limited",
            AdapterError::Unauthorized { .. } => "unauthorized",
            AdapterError::Unreachable(_) => "unreachable",
            AdapterError::Malformed(_) => "malformed",
        }
    }

    /// Only network-level failures are worth another attempt in the same cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Unreachable(_))
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AdapterError::Malformed(err.to_string())
        } else {
            AdapterError::Unreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::Malformed(err.to_string())
    }
}

/// A verification signal could not run. The engine excludes it and renormalizes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScrapeError {
    #[error("lookup timed out")]
    Timeout,

    #[error("lookup target unreachable: {0}")]
    Unreachable(String),

    #[error("lookup returned status {status}")]
    Http { status: u16 },

    #[error("signal not applicable: {0}")]
    NotApplicable(String),
}

impl ScrapeError {
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Timeout => "timeout",
            ScrapeError::Unreachable(_) => "unreachable",
            ScrapeError::Http { .. } => "http",
            ScrapeError::NotApplicable(_) => "not_applicable",
        }
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScrapeError::Timeout
        } else if let Some(status) = err.status() {
            ScrapeError::Http {
                status: status.as_u16(),
            }
        } else {
            ScrapeError::Unreachable(err.to_string())
        }
    }
}

/// Errors surfaced to API callers.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Every provider failed and there is no snapshot to fall back to.
    #[error("news temporarily unavailable: all providers failed and no cached snapshot exists")]
    TemporarilyUnavailable,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Loading of a structured config file failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {message}")]
    Parse { path: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unreachable_is_transient() {
        assert!(AdapterError::Unreachable("x".into()).is_transient());
        assert!(!AdapterError::RateLimited { reset_at: None }.is_transient());
        assert!(!AdapterError::Unauthorized { status: 401 }.is_transient());
        assert!(!AdapterError::Malformed("x".into()).is_transient());
    }

    #[test]
    fn kinds_are_stable_labels() {
        assert_eq!(AdapterError::Malformed("x".into()).kind(), "malformed");
        assert_eq!(ScrapeError::Timeout.kind(), "timeout");
        assert_eq!(ScrapeError::Http { status: 503 }.kind(), "http");
    }
}
