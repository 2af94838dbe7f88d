//! Fetching one byte range of a file into its final offset.

use crate::progress::ProgressReporter;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::sink::PartFile;
use crate::transport::{FetchRequest, FetchResponse, Transport, endpoint_key};
use dataquery_types::{DownloadPart, ErrorKind, FetchError, PartState};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default time allowed for response headers and between body chunks.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads parts through the shared limiter and retry policy.
#[derive(Clone)]
pub struct PartFetcher {
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl std::fmt::Debug for PartFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartFetcher")
            .field("limiter", &self.limiter)
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl PartFetcher {
    /// Creates a fetcher.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: RateLimiter,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry,
            request_timeout,
        }
    }

    /// Fetches `part` of `url` into `file`, retrying retryable failures.
    ///
    /// A retried ranged part resumes after the bytes it already wrote; a
    /// retried whole-body part starts over and retracts its progress. On
    /// return the part is `Done` or `Failed`.
    pub async fn fetch(
        &self,
        part: &mut DownloadPart,
        file: &PartFile,
        url: &str,
        progress: &ProgressReporter,
    ) -> Result<(), FetchError> {
        let mut attempts = self.retry.attempts(endpoint_key(url));

        let result = loop {
            if let Err(err) = attempts.admit() {
                break Err(err);
            }
            self.limiter.acquire().await;

            part.attempt_count += 1;
            part.state = PartState::InFlight;
            if !part.ranged && part.bytes_written > 0 {
                progress.retract(part.index, part.bytes_written);
                part.bytes_written = 0;
            }

            match self.attempt(part, file, url, progress).await {
                Ok(()) => {
                    attempts.succeeded();
                    break Ok(());
                }
                Err(err) => {
                    debug!(
                        part = part.index,
                        attempt = part.attempt_count,
                        written = part.bytes_written,
                        error = %err,
                        "part attempt failed"
                    );
                    if err.is_rate_limited() {
                        self.limiter.drain().await;
                    }
                    if let Err(err) = attempts.failed(err).await {
                        break Err(err);
                    }
                }
            }
        };

        part.state = if result.is_ok() {
            PartState::Done
        } else {
            PartState::Failed
        };
        result
    }

    async fn attempt(
        &self,
        part: &mut DownloadPart,
        file: &PartFile,
        url: &str,
        progress: &ProgressReporter,
    ) -> Result<(), FetchError> {
        let range = if part.ranged {
            match part.remaining_range() {
                Some(range) => Some(range),
                None => return Ok(()),
            }
        } else {
            None
        };

        let response = self
            .timed(self.transport.request(FetchRequest::get(url, range)))
            .await??;
        let FetchResponse {
            status,
            headers,
            mut body,
        } = response;

        match (status, range) {
            (206, Some(range)) => match headers.content_range {
                Some(cr) if cr.start == range.start => {}
                Some(cr) => {
                    return Err(FetchError::malformed(format!(
                        "requested bytes from {}, server sent from {}",
                        range.start, cr.start
                    )));
                }
                None => return Err(FetchError::malformed("206 response without Content-Range")),
            },
            (200, Some(_)) => {
                return Err(FetchError::new(
                    ErrorKind::RangeUnsupported,
                    "server answered a range request with the full body",
                ));
            }
            (206, None) => {
                return Err(FetchError::malformed("206 response to a request without Range"));
            }
            (200..=299, None) => {}
            (status, _) => {
                return Err(FetchError::from_status(status, format!("HTTP {status}"))
                    .with_retry_after(headers.retry_after));
            }
        }

        let expected = part.len();
        while let Some(chunk) = self.timed(body.next()).await? {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            let len = chunk.len() as u64;
            if let Some(expected) = expected
                && part.bytes_written + len > expected
            {
                return Err(FetchError::malformed(format!(
                    "body exceeds part length of {expected} bytes"
                )));
            }
            file.write_at(part.next_offset(), chunk).await?;
            part.bytes_written += len;
            progress.on_bytes(part.index, len);
        }

        match expected {
            Some(expected) if part.bytes_written < expected => Err(FetchError::network(format!(
                "body ended after {} of {expected} bytes",
                part.bytes_written
            ))),
            _ => Ok(()),
        }
    }

    async fn timed<T>(&self, fut: impl Future<Output = T>) -> Result<T, FetchError> {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| {
                FetchError::network(format!(
                    "no response within {}s",
                    self.request_timeout.as_secs_f64()
                ))
            })
    }
}
