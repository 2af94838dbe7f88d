//! Token-bucket admission control shared by every outbound request.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Float slack when comparing accrued tokens against one whole token.
const TOKEN_EPSILON: f64 = 1e-9;

/// Shortest sleep between refill checks.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Sustained request rate.
    pub requests_per_minute: u32,
    /// Maximum number of requests admitted back-to-back.
    pub burst_capacity: u32,
    /// When false, `acquire` never waits.
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 100,
            burst_capacity: 20,
            enabled: true,
        }
    }
}

/// Counters describing limiter usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimiterStats {
    /// Tokens handed out.
    pub acquired: u64,
    /// Total time callers spent suspended in `acquire`.
    pub waited: Duration,
}

/// A token bucket shared by all fetch paths of one client.
///
/// Refill is lazy: tokens accrue from the wall-clock time elapsed since the
/// previous `acquire`, so no background task is needed. Clones share state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Option<Arc<Inner>>,
}

#[derive(Debug)]
struct Inner {
    bucket: Mutex<TokenBucket>,
    acquired: AtomicU64,
    waited_micros: AtomicU64,
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_second: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes one token or returns how long until one accrues.
    fn try_take(&mut self, now: Instant) -> Option<Duration> {
        self.refill(now);
        if self.tokens >= 1.0 - TOKEN_EPSILON {
            self.tokens = (self.tokens - 1.0).max(0.0);
            return None;
        }
        let missing = 1.0 - self.tokens;
        let wait = Duration::from_secs_f64(missing / self.refill_per_second);
        Some(wait.max(MIN_WAIT))
    }
}

impl RateLimiter {
    /// Creates a limiter from a configuration. The bucket starts full.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        let capacity = f64::from(config.burst_capacity.max(1));
        let bucket = TokenBucket {
            tokens: capacity,
            capacity,
            refill_per_second: f64::from(config.requests_per_minute.max(1)) / 60.0,
            last_refill: Instant::now(),
        };
        Self {
            inner: Some(Arc::new(Inner {
                bucket: Mutex::new(bucket),
                acquired: AtomicU64::new(0),
                waited_micros: AtomicU64::new(0),
            })),
        }
    }

    /// Creates a limiter admitting `requests_per_minute` with the given burst.
    #[must_use]
    pub fn per_minute(requests_per_minute: u32, burst_capacity: u32) -> Self {
        Self::new(RateLimitConfig {
            requests_per_minute,
            burst_capacity,
            enabled: true,
        })
    }

    /// Creates a limiter that admits everything immediately.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { inner: None }
    }

    /// Returns true if this limiter actually limits.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Suspends until a token is available, then consumes it.
    pub async fn acquire(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        let started = Instant::now();

        loop {
            let wait = {
                let mut bucket = inner.bucket.lock().await;
                bucket.try_take(Instant::now())
            };
            match wait {
                None => break,
                // Lock is released before sleeping so other callers can refill.
                Some(delay) => tokio::time::sleep(delay).await,
            }
        }

        inner.acquired.fetch_add(1, Ordering::Relaxed);
        let waited = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        inner.waited_micros.fetch_add(waited, Ordering::Relaxed);
    }

    /// Empties the bucket so every caller backs off until it refills.
    ///
    /// Called when the server answers 429.
    pub async fn drain(&self) {
        if let Some(inner) = &self.inner {
            let mut bucket = inner.bucket.lock().await;
            bucket.refill(Instant::now());
            bucket.tokens = 0.0;
        }
    }

    /// Tokens currently in the bucket (after refill).
    pub async fn available(&self) -> f64 {
        match &self.inner {
            Some(inner) => {
                let mut bucket = inner.bucket.lock().await;
                bucket.refill(Instant::now());
                bucket.tokens
            }
            None => f64::INFINITY,
        }
    }

    /// Returns usage counters.
    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        self.inner
            .as_ref()
            .map_or_else(RateLimiterStats::default, |inner| RateLimiterStats {
                acquired: inner.acquired.load(Ordering::Relaxed),
                waited: Duration::from_micros(inner.waited_micros.load(Ordering::Relaxed)),
            })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
