//! In-memory file server used by the integration tests.

#![allow(dead_code, unreachable_pub, missing_docs)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use dataquery_engine::{
    ByteStream, ContentRange, FetchRequest, FetchResponse, FileCatalog, HeadInfo, RateLimiter,
    ResponseHeaders, RetryConfig, RetryPolicy, Transport,
};
use dataquery_types::{FetchError, file_datetime};
use futures::StreamExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const CHUNK: usize = 64 * 1024;

/// Deterministic file content.
pub fn content(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>().into()
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

pub fn url_for(file_id: &str, date: NaiveDate) -> String {
    format!("mock://files/{file_id}/{}", file_datetime(date))
}

/// Retry policy with short delays and no circuit breaker.
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(
        RetryConfig::default()
            .with_max_retries(max_retries)
            .with_base_delay(Duration::from_millis(10))
            .without_circuit_breaker(),
    )
}

/// The shipped retry configuration, circuit breaker included, with short delays.
pub fn default_retry() -> RetryPolicy {
    RetryPolicy::new(RetryConfig::default().with_base_delay(Duration::from_millis(10)))
}

pub fn no_limit() -> RateLimiter {
    RateLimiter::disabled()
}

/// A scripted file server.
#[derive(Default)]
pub struct MockServer {
    files: Mutex<HashMap<String, Bytes>>,
    default_size: Option<usize>,
    serves_ranges: bool,
    advertises_ranges: Option<bool>,
    latency: Duration,
    reported_size: Option<u64>,
    unavailable: Mutex<HashSet<(String, NaiveDate)>>,
    faults: Mutex<HashMap<(String, u64), VecDeque<u16>>>,
    gets: Mutex<Vec<(String, Option<(u64, u64)>)>>,
    heads: AtomicUsize,
    availability_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockServer {
    /// Server honouring and advertising range requests.
    pub fn new() -> Self {
        Self {
            serves_ranges: true,
            advertises_ranges: Some(true),
            ..Self::default()
        }
    }

    /// Server that ignores `Range` headers.
    pub fn without_ranges() -> Self {
        Self {
            serves_ranges: false,
            advertises_ranges: Some(false),
            ..Self::default()
        }
    }

    /// Serves `size` generated bytes for every URL not added explicitly.
    pub fn with_default_size(mut self, size: usize) -> Self {
        self.default_size = Some(size);
        self
    }

    /// Sets the `Accept-Ranges` value reported by the probe.
    pub fn with_advertised_ranges(mut self, advertised: Option<bool>) -> Self {
        self.advertises_ranges = advertised;
        self
    }

    /// Sets whether ranged GETs get a 206.
    pub fn with_served_ranges(mut self, served: bool) -> Self {
        self.serves_ranges = served;
        self
    }

    /// Makes the probe report `size` instead of the real length.
    pub fn with_reported_size(mut self, size: u64) -> Self {
        self.reported_size = Some(size);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn add_file(&self, url: &str, body: Bytes) {
        self.files.lock().unwrap().insert(url.to_string(), body);
    }

    pub fn mark_unavailable(&self, file_id: &str, date: NaiveDate) {
        self.unavailable
            .lock()
            .unwrap()
            .insert((file_id.to_string(), date));
    }

    /// Answers the next GETs of `url` starting at `offset` with `statuses`.
    pub fn inject(&self, url: &str, offset: u64, statuses: &[u16]) {
        self.faults
            .lock()
            .unwrap()
            .entry((url.to_string(), offset))
            .or_default()
            .extend(statuses);
    }

    pub fn get_count(&self) -> usize {
        self.gets.lock().unwrap().len()
    }

    pub fn gets_for(&self, url: &str) -> Vec<Option<(u64, u64)>> {
        self.gets
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, r)| *r)
            .collect()
    }

    pub fn head_count(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    pub fn availability_count(&self) -> usize {
        self.availability_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn body(&self, url: &str) -> Option<Bytes> {
        self.files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .or_else(|| self.default_size.map(content))
    }

    fn next_fault(&self, url: &str, offset: u64) -> Option<u16> {
        self.faults
            .lock()
            .unwrap()
            .get_mut(&(url.to_string(), offset))
            .and_then(VecDeque::pop_front)
    }
}

fn respond(status: u16, content_range: Option<ContentRange>, body: Bytes) -> FetchResponse {
    let chunks: Vec<Result<Bytes, FetchError>> = body
        .chunks(CHUNK)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    let stream: ByteStream = futures::stream::iter(chunks).boxed();
    FetchResponse {
        status,
        headers: ResponseHeaders {
            content_length: Some(body.len() as u64),
            content_range,
            retry_after: None,
        },
        body: stream,
    }
}

#[async_trait]
impl Transport for MockServer {
    async fn request(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let range = request.range.map(|r| (r.start, r.end));
        self.gets
            .lock()
            .unwrap()
            .push((request.url.clone(), range));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let Some(body) = self.body(&request.url) else {
            return Ok(respond(404, None, Bytes::new()));
        };
        let offset = range.map_or(0, |(start, _)| start);
        if let Some(status) = self.next_fault(&request.url, offset) {
            return Ok(respond(status, None, Bytes::new()));
        }

        let total = body.len() as u64;
        match range {
            Some((start, end)) if self.serves_ranges && start < total => {
                let end = end.min(total - 1);
                let slice = body.slice(start as usize..=end as usize);
                Ok(respond(
                    206,
                    Some(ContentRange {
                        start,
                        end,
                        total: Some(total),
                    }),
                    slice,
                ))
            }
            _ => Ok(respond(200, None, body)),
        }
    }

    async fn head_info(&self, url: &str) -> Result<HeadInfo, FetchError> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        match self.body(url) {
            Some(body) => Ok(HeadInfo {
                content_length: Some(self.reported_size.unwrap_or(body.len() as u64)),
                accept_ranges: self.advertises_ranges,
            }),
            None => Err(FetchError::from_status(404, "not found")),
        }
    }
}

#[async_trait]
impl FileCatalog for MockServer {
    fn download_url(&self, file_id: &str, date: NaiveDate) -> String {
        url_for(file_id, date)
    }

    async fn is_available(&self, file_id: &str, date: NaiveDate) -> Result<bool, FetchError> {
        self.availability_calls.fetch_add(1, Ordering::SeqCst);
        Ok(!self
            .unavailable
            .lock()
            .unwrap()
            .contains(&(file_id.to_string(), date)))
    }

    async fn list_file_ids(&self, _group_id: &str) -> Result<Vec<String>, FetchError> {
        let mut ids: Vec<String> = self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter_map(|url| url.strip_prefix("mock://files/"))
            .filter_map(|rest| rest.split('/').next())
            .map(str::to_string)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
