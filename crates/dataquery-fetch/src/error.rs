//! Client construction and request errors.

use dataquery_types::{DataQueryError, ErrorKind, FetchError};
use thiserror::Error;

/// Errors raised while configuring or using the HTTP client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP client failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A built URL exceeds what the API accepts.
    #[error("URL length ({length}) exceeds maximum allowed ({max} characters)")]
    UrlTooLong {
        /// Length of the rejected URL.
        length: usize,
        /// Maximum accepted length.
        max: usize,
    },
}

impl From<ClientError> for FetchError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Http(e) => from_reqwest(&e),
            other => Self::new(ErrorKind::Client, other.to_string()),
        }
    }
}

impl From<ClientError> for DataQueryError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Http(e) => Self::Fetch(from_reqwest(&e)),
            other => Self::Config(other.to_string()),
        }
    }
}

/// Classifies a reqwest failure.
///
/// Builder errors are caller mistakes and never retried; everything else
/// (timeouts, resets, body decode) is a transport failure.
pub(crate) fn from_reqwest(err: &reqwest::Error) -> FetchError {
    if err.is_builder() {
        return FetchError::new(ErrorKind::Client, err.to_string());
    }
    if let Some(status) = err.status() {
        return FetchError::from_status(status.as_u16(), err.to_string());
    }
    FetchError::network(err.to_string())
}
