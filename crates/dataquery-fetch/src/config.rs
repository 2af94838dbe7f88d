//! Client configuration and environment loading.

use dataquery_engine::{RateLimitConfig, RetryConfig};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::ClientError;
use crate::url::{ApiUrls, DEFAULT_BASE_URL, DEFAULT_CONTEXT_PATH, api_root};

/// Configuration for [`DataQueryClient`](crate::DataQueryClient).
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// API host.
    pub base_url: String,
    /// Path prefix appended to `base_url`.
    pub context_path: Option<String>,
    /// Separate host for file endpoints.
    pub files_base_url: Option<String>,
    /// Path prefix for the files host; falls back to `context_path`.
    pub files_context_path: Option<String>,
    /// Pre-issued bearer token.
    pub bearer_token: Option<String>,
    /// Whole-request timeout for API calls other than file bodies.
    pub timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base backoff delay.
    pub retry_delay: Duration,
    /// Sustained request rate shared by every request of the client.
    pub requests_per_minute: u32,
    /// Requests admitted back-to-back.
    pub burst_capacity: u32,
    /// Idle connections kept per host.
    pub pool_max_idle_per_host: usize,
    /// Default root for downloaded files.
    pub download_dir: PathBuf,
    /// User agent string.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            context_path: Some(DEFAULT_CONTEXT_PATH.to_string()),
            files_base_url: None,
            files_context_path: None,
            bearer_token: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            requests_per_minute: 100,
            burst_capacity: 20,
            pool_max_idle_per_host: 20,
            download_dir: PathBuf::from("./downloads"),
            user_agent: format!("dataquery-rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Reads `DATAQUERY_*` environment variables over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ClientConfig::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = var("DATAQUERY_BASE_URL") {
            config.base_url = v;
        }
        if let Some(v) = var("DATAQUERY_CONTEXT_PATH") {
            config.context_path = Some(v);
        }
        config.files_base_url = var("DATAQUERY_FILES_BASE_URL").or(config.files_base_url);
        config.files_context_path =
            var("DATAQUERY_FILES_CONTEXT_PATH").or(config.files_context_path);
        config.bearer_token = var("DATAQUERY_BEARER_TOKEN").or(config.bearer_token);
        if let Some(v) = var("DATAQUERY_TIMEOUT") {
            config.timeout = seconds("DATAQUERY_TIMEOUT", &v)?;
        }
        if let Some(v) = var("DATAQUERY_MAX_RETRIES") {
            config.max_retries = parse("DATAQUERY_MAX_RETRIES", &v)?;
        }
        if let Some(v) = var("DATAQUERY_RETRY_DELAY") {
            config.retry_delay = seconds("DATAQUERY_RETRY_DELAY", &v)?;
        }
        if let Some(v) = var("DATAQUERY_REQUESTS_PER_MINUTE") {
            config.requests_per_minute = parse("DATAQUERY_REQUESTS_PER_MINUTE", &v)?;
        }
        if let Some(v) = var("DATAQUERY_BURST_CAPACITY") {
            config.burst_capacity = parse("DATAQUERY_BURST_CAPACITY", &v)?;
        }
        if let Some(v) = var("DATAQUERY_DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(v);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.base_url.trim().is_empty() {
            return Err(ClientError::Config("base_url must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::Config("timeout must be positive".into()));
        }
        if self.requests_per_minute == 0 {
            return Err(ClientError::Config(
                "requests_per_minute must be positive".into(),
            ));
        }
        if self.burst_capacity == 0 {
            return Err(ClientError::Config("burst_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Endpoint URL builder for this configuration.
    #[must_use]
    pub fn api_urls(&self) -> ApiUrls {
        let files_root = self.files_base_url.as_deref().map(|files| {
            let ctx = self
                .files_context_path
                .as_deref()
                .or(self.context_path.as_deref());
            api_root(files, ctx)
        });
        ApiUrls::new(
            api_root(&self.base_url, self.context_path.as_deref()),
            files_root,
        )
    }

    /// Rate limiter settings.
    #[must_use]
    pub const fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: self.requests_per_minute,
            burst_capacity: self.burst_capacity,
            enabled: true,
        }
    }

    /// Retry settings.
    #[must_use]
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(self.max_retries)
            .with_base_delay(self.retry_delay)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, ClientError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ClientError::Config(format!("{key}={value}: {e}")))
}

fn seconds(key: &str, value: &str) -> Result<Duration, ClientError> {
    let secs: f64 = parse(key, value)?;
    Duration::try_from_secs_f64(secs).map_err(|e| ClientError::Config(format!("{key}={value}: {e}")))
}
