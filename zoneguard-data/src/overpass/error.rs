//! Fetch failures and their retry classes.

use std::io;

use thiserror::Error;

/// How a failed request should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The server asked us to slow down.
    RateLimit,
    /// Any other retryable failure.
    Transient,
}

/// Errors from a single tile request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The connection failed before a response arrived.
    #[error("network error contacting {url}: {source}")]
    Network {
        /// Endpoint URL.
        url: String,
        /// Transport failure.
        #[source]
        source: io::Error,
    },
    /// The request exceeded its deadline.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Endpoint URL.
        url: String,
        /// Deadline in seconds.
        timeout_secs: u64,
    },
    /// The server answered 429, 503 or 504.
    #[error("request to {url} was rate limited with status {status}")]
    RateLimited {
        /// Endpoint URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// The server answered with another error status.
    #[error("request to {url} failed with status {status}: {message}")]
    Http {
        /// Endpoint URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Short error description.
        message: String,
    },
    /// The body was not JSON or lacked the `elements` array.
    #[error("malformed response from {url}: {message}")]
    MalformedResponse {
        /// Endpoint URL.
        url: String,
        /// Decoder message.
        message: String,
    },
    /// No endpoints were configured.
    #[error("no upstream endpoints are configured")]
    NoEndpoints,
    /// The run was cancelled.
    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Retry class of this failure.
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::RateLimited { .. } => FailureClass::RateLimit,
            _ => FailureClass::Transient,
        }
    }

    /// Build the error for a non-success HTTP status.
    #[must_use]
    pub fn from_status(url: &str, status: u16, message: impl Into<String>) -> Self {
        if matches!(status, 429 | 503 | 504) {
            Self::RateLimited {
                url: url.to_owned(),
                status,
            }
        } else {
            Self::Http {
                url: url.to_owned(),
                status,
                message: message.into(),
            }
        }
    }
}

/// Errors raised while constructing an HTTP source.
#[derive(Debug, Error)]
pub enum SourceBuildError {
    /// The endpoint was not a valid absolute URL.
    #[error("invalid endpoint URL `{url}`")]
    InvalidUrl {
        /// URL as supplied.
        url: String,
        /// Parser failure.
        #[source]
        source: url::ParseError,
    },
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),
}
