//! reqwest-backed DataQuery client.

use async_trait::async_trait;
use chrono::NaiveDate;
use dataquery_engine::{
    BatchConfig, BatchDownloader, ByteStream, ContentRange, FetchRequest, FetchResponse,
    FileCatalog, FileDownloadConfig, FileDownloader, HeadInfo, Method, RateLimiter,
    ResponseHeaders, RetryPolicy, Transport,
};
use dataquery_types::{FetchError, file_datetime};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT_RANGES, AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth::{StaticToken, TokenProvider, bearer};
use crate::config::ClientConfig;
use crate::error::from_reqwest;
use crate::models::{AvailabilityInfo, AvailabilityResponse, FileInfo, FileListResponse};
use crate::url::{ApiUrls, DOWNLOAD_ENDPOINT};
use crate::ClientError;

/// Circuit breaker target for availability checks.
const AVAILABILITY_TARGET: &str = "availability";

/// Circuit breaker target for file listings.
const FILES_TARGET: &str = "files";

/// Authenticated DataQuery client.
///
/// Owns the connection pool, the rate limiter and the retry policy; every
/// downloader built from it shares all three. Dropping the last handle
/// closes the pool.
pub struct DataQueryClient {
    http: Client,
    config: ClientConfig,
    urls: ApiUrls,
    auth: Option<Arc<dyn TokenProvider>>,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl std::fmt::Debug for DataQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataQueryClient")
            .field("urls", &self.urls)
            .field("authenticated", &self.auth.is_some())
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl DataQueryClient {
    /// Creates a client with the given configuration.
    ///
    /// A configured `bearer_token` becomes the token provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let urls = config.api_urls();
        for root in [urls.api_root(), urls.files_root()] {
            reqwest::Url::parse(root)
                .map_err(|e| ClientError::Config(format!("invalid API root {root}: {e}")))?;
        }

        // No whole-request timeout: file bodies can take arbitrarily long and
        // the engine enforces its own idle timeout per chunk.
        let http = Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let auth = config
            .bearer_token
            .clone()
            .map(|token| Arc::new(StaticToken::new(token)) as Arc<dyn TokenProvider>);

        Ok(Self {
            http,
            limiter: RateLimiter::new(config.rate_limit()),
            retry: RetryPolicy::new(config.retry()),
            urls,
            auth,
            config,
        })
    }

    /// Creates a client from `DATAQUERY_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment holds invalid values.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Replaces the token provider.
    #[must_use]
    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.auth = Some(provider);
        self
    }

    /// Replaces the rate limiter, for sharing one limiter between clients.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the endpoint URL builder.
    #[must_use]
    pub const fn urls(&self) -> &ApiUrls {
        &self.urls
    }

    /// Returns the shared rate limiter.
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Returns the shared retry policy.
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Builds a single-file downloader over this client.
    #[must_use]
    pub fn file_downloader(self: &Arc<Self>, config: FileDownloadConfig) -> FileDownloader {
        let transport: Arc<dyn Transport> = Arc::clone(self) as Arc<dyn Transport>;
        FileDownloader::new(transport, self.limiter.clone(), self.retry.clone(), config)
    }

    /// Builds a batch downloader over this client.
    #[must_use]
    pub fn batch_downloader(
        self: &Arc<Self>,
        file_config: FileDownloadConfig,
        batch_config: BatchConfig,
    ) -> BatchDownloader {
        let catalog: Arc<dyn FileCatalog> = Arc::clone(self) as Arc<dyn FileCatalog>;
        BatchDownloader::new(
            Arc::new(self.file_downloader(file_config)),
            catalog,
            batch_config,
        )
    }

    /// Checks whether a file is published for a date.
    ///
    /// Rate limited and retried.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted.
    pub async fn check_availability(
        &self,
        file_id: &str,
        date: NaiveDate,
    ) -> Result<AvailabilityInfo, FetchError> {
        let info = self
            .retry
            .execute(AVAILABILITY_TARGET, move |_| async move {
                self.limiter.acquire().await;
                self.fetch_availability(file_id, date).await
            })
            .await?;
        info!(
            file_id,
            date = %date,
            is_available = info.is_available,
            "availability checked"
        );
        Ok(info)
    }

    /// Lists the files of a group.
    ///
    /// Rate limited and retried.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted.
    pub async fn list_files(&self, group_id: &str) -> Result<Vec<FileInfo>, FetchError> {
        let files = self
            .retry
            .execute(FILES_TARGET, move |_| async move {
                self.limiter.acquire().await;
                self.fetch_files(group_id).await
            })
            .await?;
        info!(group_id, count = files.len(), "files listed");
        Ok(files)
    }

    async fn fetch_availability(
        &self,
        file_id: &str,
        date: NaiveDate,
    ) -> Result<AvailabilityInfo, FetchError> {
        let url = self.urls.availability(file_id, date)?;
        let response: AvailabilityResponse = self.get_json(&url).await?;
        Ok(response.select(&file_datetime(date)))
    }

    async fn fetch_files(&self, group_id: &str) -> Result<Vec<FileInfo>, FetchError> {
        let url = self.urls.files(group_id)?;
        let response: FileListResponse = self.get_json(&url).await?;
        Ok(response.file_group_ids)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let builder = self.http.get(url).timeout(self.config.timeout);
        let response = self
            .authorize(builder)
            .await?
            .send()
            .await
            .map_err(|e| from_reqwest(&e))?;
        let response = check_status(response)?;
        response
            .json()
            .await
            .map_err(|e| FetchError::malformed(format!("invalid JSON from {url}: {e}")))
    }

    async fn authorize(&self, builder: RequestBuilder) -> Result<RequestBuilder, FetchError> {
        match &self.auth {
            Some(provider) => {
                let token = provider.token().await?;
                Ok(builder.header(AUTHORIZATION, bearer(&token)))
            }
            None => Ok(builder),
        }
    }
}

#[async_trait]
impl Transport for DataQueryClient {
    async fn request(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Head => self.http.head(&request.url),
        };
        if let Some(range) = request.range {
            builder = builder.header(RANGE, range.header_value());
        }
        debug!(url = %request.url, range = ?request.range, "sending request");

        let response = self
            .authorize(builder)
            .await?
            .send()
            .await
            .map_err(|e| from_reqwest(&e))?;

        let status = response.status().as_u16();
        let headers = response_headers(response.headers());
        let body: ByteStream = response
            .bytes_stream()
            .map_err(|e| from_reqwest(&e))
            .boxed();
        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }

    async fn head_info(&self, url: &str) -> Result<HeadInfo, FetchError> {
        let builder = self.http.head(url).timeout(self.config.timeout);
        let response = self
            .authorize(builder)
            .await?
            .send()
            .await
            .map_err(|e| from_reqwest(&e))?;
        let response = check_status(response)?;
        let headers = response.headers();

        let accept_ranges = headers
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")));
        Ok(HeadInfo {
            content_length: header_u64(headers, CONTENT_LENGTH.as_str()),
            accept_ranges,
        })
    }
}

#[async_trait]
impl FileCatalog for DataQueryClient {
    fn download_url(&self, file_id: &str, date: NaiveDate) -> String {
        self.urls.download(file_id, date).unwrap_or_else(|err| {
            // The bare endpoint fails with a client error, which fails the file.
            warn!(file_id, date = %date, error = %err, "cannot build download URL");
            format!("{}/{DOWNLOAD_ENDPOINT}", self.urls.files_root())
        })
    }

    async fn is_available(&self, file_id: &str, date: NaiveDate) -> Result<bool, FetchError> {
        Ok(self.fetch_availability(file_id, date).await?.is_available)
    }

    async fn list_file_ids(&self, group_id: &str) -> Result<Vec<String>, FetchError> {
        let mut ids: Vec<String> = self
            .fetch_files(group_id)
            .await?
            .into_iter()
            .map(|f| f.file_group_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

/// Turns a non-success response into a classified error.
fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = retry_after(response.headers());
    Err(FetchError::from_status(
        status.as_u16(),
        format!("{} returned {status}", response.url().path()),
    )
    .with_retry_after(retry_after))
}

fn response_headers(headers: &HeaderMap) -> ResponseHeaders {
    ResponseHeaders {
        content_length: header_u64(headers, CONTENT_LENGTH.as_str()),
        content_range: headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(ContentRange::parse),
        retry_after: retry_after(headers),
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// `Retry-After` in delay-seconds form; HTTP dates are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_u64(headers, RETRY_AFTER.as_str()).map(Duration::from_secs)
}
