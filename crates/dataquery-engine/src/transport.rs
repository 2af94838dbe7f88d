//! Collaborator seams: the HTTP transport and the file catalog.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use dataquery_types::{ByteRange, FetchError};
use futures::stream::BoxStream;
use std::time::Duration;

/// Streamed response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// HTTP method used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
}

/// An authenticated request issued by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// HTTP method.
    pub method: Method,
    /// Fully built URL including query parameters.
    pub url: String,
    /// Byte range to request, sent as a `Range` header.
    pub range: Option<ByteRange>,
}

impl FetchRequest {
    /// Builds a `GET`, optionally ranged.
    #[must_use]
    pub fn get(url: impl Into<String>, range: Option<ByteRange>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            range,
        }
    }
}

/// Parsed `Content-Range: bytes start-end/total` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte offset of the span.
    pub start: u64,
    /// Last byte offset of the span (inclusive).
    pub end: u64,
    /// Full size of the resource, if the server disclosed it.
    pub total: Option<u64>,
}

impl ContentRange {
    /// Parses a `Content-Range` header value.
    ///
    /// Returns `None` for unsatisfied ranges (`bytes */N`) and garbage.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let spec = value.trim().strip_prefix("bytes")?.trim_start();
        let (span, total) = spec.split_once('/')?;
        let (start, end) = span.split_once('-')?;
        let start = start.trim().parse().ok()?;
        let end = end.trim().parse().ok()?;
        if end < start {
            return None;
        }
        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse().ok()?),
        };
        Some(Self { start, end, total })
    }
}

/// Response headers the engine cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    /// `Content-Length`.
    pub content_length: Option<u64>,
    /// `Content-Range`.
    pub content_range: Option<ContentRange>,
    /// `Retry-After`, in seconds form.
    pub retry_after: Option<Duration>,
}

/// Status, headers and streamed body of a response.
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed headers.
    pub headers: ResponseHeaders,
    /// Body chunks as they arrive.
    pub body: ByteStream,
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Result of a metadata probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadInfo {
    /// `Content-Length` of the resource.
    pub content_length: Option<u64>,
    /// `Some(true)` for `Accept-Ranges: bytes`, `Some(false)` for `none`,
    /// `None` when the header was absent.
    pub accept_ranges: Option<bool>,
}

/// Authenticated HTTP access used by every fetch path.
///
/// Implementations map transport failures to [`FetchError`]s of kind
/// `Network`; HTTP statuses are returned as-is in [`FetchResponse::status`]
/// so the engine can classify them.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues a request and returns once headers are available.
    async fn request(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;

    /// Learns the size and range support of a resource.
    async fn head_info(&self, url: &str) -> Result<HeadInfo, FetchError>;
}

/// Where files live and whether they are published yet.
#[async_trait]
pub trait FileCatalog: Send + Sync {
    /// Download URL for a file on a given date.
    fn download_url(&self, file_id: &str, date: NaiveDate) -> String;

    /// Returns true if the file for `date` can be downloaded.
    async fn is_available(&self, file_id: &str, date: NaiveDate) -> Result<bool, FetchError>;

    /// Lists the file identifiers belonging to a group.
    async fn list_file_ids(&self, group_id: &str) -> Result<Vec<String>, FetchError>;
}

/// Logical endpoint of a URL (everything before the query string).
///
/// Used to key circuit breaker state so that requests for different files on
/// the same endpoint share one circuit.
#[must_use]
pub fn endpoint_key(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}
