//! Benchmark fixtures for the DataQuery engine.

use async_trait::async_trait;
use bytes::Bytes;
use dataquery_engine::{
    ByteStream, ContentRange, FetchRequest, FetchResponse, HeadInfo, ResponseHeaders, Transport,
};
use dataquery_types::FetchError;
use futures::StreamExt;

/// Size of body chunks handed to the engine.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Serves one in-memory body for every URL, honouring range requests.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    body: Bytes,
}

impl MemoryTransport {
    /// Creates a transport serving `len` generated bytes.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        let body: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        Self { body: body.into() }
    }

    /// Size of the served body.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.body.len() as u64
    }

    /// Returns true if the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

fn stream(body: Bytes) -> ByteStream {
    let chunks: Vec<Result<Bytes, FetchError>> = (0..body.len())
        .step_by(CHUNK_SIZE)
        .map(|start| Ok(body.slice(start..(start + CHUNK_SIZE).min(body.len()))))
        .collect();
    futures::stream::iter(chunks).boxed()
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn request(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let total = self.len();
        let (status, content_range, body) = match request.range {
            Some(range) if range.start < total => {
                let end = range.end.min(total - 1);
                let body = self.body.slice(range.start as usize..=end as usize);
                let content_range = ContentRange {
                    start: range.start,
                    end,
                    total: Some(total),
                };
                (206, Some(content_range), body)
            }
            _ => (200, None, self.body.clone()),
        };
        Ok(FetchResponse {
            status,
            headers: ResponseHeaders {
                content_length: Some(body.len() as u64),
                content_range,
                retry_after: None,
            },
            body: stream(body),
        })
    }

    async fn head_info(&self, _url: &str) -> Result<HeadInfo, FetchError> {
        Ok(HeadInfo {
            content_length: Some(self.len()),
            accept_ranges: Some(true),
        })
    }
}
