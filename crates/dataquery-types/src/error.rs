//! Error types for the DataQuery SDK.

use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for library-level operations.
pub type Result<T> = std::result::Result<T, DataQueryError>;

/// Classification of a failed fetch, verify or write step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Timeout, connection reset or other transport failure.
    Network,
    /// HTTP 5xx.
    Server,
    /// HTTP 429.
    RateLimited,
    /// HTTP 4xx other than 429.
    Client,
    /// Response that does not match the request (bad headers, wrong span).
    MalformedResponse,
    /// Server ignored a range request; the file must be fetched whole.
    RangeUnsupported,
    /// Byte count after all parts finished differs from the expected size.
    Verification,
    /// Circuit breaker is open for the target.
    CircuitOpen,
    /// Local disk failure.
    FileSystem,
    /// Work was abandoned due to cancellation.
    Cancelled,
}

impl ErrorKind {
    /// Returns true if failures of this kind are worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Server | Self::RateLimited)
    }

    /// Returns the kind as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network error",
            Self::Server => "server error",
            Self::RateLimited => "rate limited",
            Self::Client => "client error",
            Self::MalformedResponse => "malformed response",
            Self::RangeUnsupported => "range requests unsupported",
            Self::Verification => "verification failed",
            Self::CircuitOpen => "circuit open",
            Self::FileSystem => "file system error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Maps an HTTP status code to an error kind.
    ///
    /// Returns `None` for success and redirect codes.
    #[must_use]
    pub const fn from_status(status: u16) -> Option<Self> {
        match status {
            429 => Some(Self::RateLimited),
            400..=499 => Some(Self::Client),
            500..=599 => Some(Self::Server),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error produced by a single fetch, verify or write step.
///
/// The retry decision is carried as data: `retryable` is derived from the
/// kind when the error is built and never inferred later.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct FetchError {
    /// Classification of the failure.
    pub kind: ErrorKind,
    /// Whether a retry policy may try again.
    pub retryable: bool,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Server-provided `Retry-After` hint.
    pub retry_after: Option<Duration>,
    /// Human-readable description.
    pub message: String,
}

impl FetchError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
            status: None,
            retry_after: None,
            message: message.into(),
        }
    }

    /// Creates a transport-level error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Creates an error for a response that violates the range contract.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, message)
    }

    /// Creates a disk write error.
    pub fn file_system(err: &std::io::Error) -> Self {
        Self::new(ErrorKind::FileSystem, err.to_string())
    }

    /// Creates an error from a non-success HTTP status.
    ///
    /// Statuses that are not errors are reported as malformed responses.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = ErrorKind::from_status(status).unwrap_or(ErrorKind::MalformedResponse);
        Self {
            status: Some(status),
            ..Self::new(kind, message)
        }
    }

    /// Attaches a `Retry-After` hint.
    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Returns true if this error is a rate-limit signal.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.kind == ErrorKind::RateLimited
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        Self::file_system(&err)
    }
}

/// Errors surfaced by the library outside the per-file fetch path.
#[derive(Error, Debug)]
pub enum DataQueryError {
    /// A fetch step failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid date range.
    #[error(transparent)]
    DateRange(#[from] DateRangeError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error for invalid date ranges.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateRangeError {
    /// Start date is after end date.
    #[error("Invalid date range: {start} > {end}")]
    InvalidRange {
        /// The start date.
        start: NaiveDate,
        /// The end date.
        end: NaiveDate,
    },

    /// Date string is not in a supported format.
    #[error("Invalid file date: {0} (expected YYYYMMDD or YYYY-MM-DD)")]
    InvalidDate(String),
}
