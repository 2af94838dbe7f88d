//! Retry with exponential backoff, jitter and an optional circuit breaker.

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};
use dataquery_types::{ErrorKind, FetchError};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, before jitter.
    pub base_delay: Duration,
    /// Cap on the exponential delay, before jitter.
    pub max_delay: Duration,
    /// Factor applied to the capped delay when the server answered 429.
    pub rate_limit_multiplier: u32,
    /// Circuit breaker settings, `None` to disable.
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            rate_limit_multiplier: 4,
            circuit_breaker: Some(CircuitBreakerConfig::default()),
        }
    }
}

impl RetryConfig {
    /// Sets the number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Disables the circuit breaker.
    #[must_use]
    pub const fn without_circuit_breaker(mut self) -> Self {
        self.circuit_breaker = None;
        self
    }
}

/// Snapshot of retry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    /// Attempts started.
    pub attempts: u64,
    /// Attempts that were a retry of an earlier failure.
    pub retries: u64,
    /// Operations that eventually succeeded.
    pub successes: u64,
    /// Operations that ended in a terminal error.
    pub failures: u64,
    /// Times a circuit opened.
    pub breaker_trips: u64,
    /// Times an open circuit closed again.
    pub breaker_resets: u64,
}

#[derive(Debug, Default)]
struct Counters {
    attempts: AtomicU64,
    retries: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

/// Runs fallible operations with backoff. Clones share breaker and counters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    breaker: Option<Arc<CircuitBreaker>>,
    counters: Arc<Counters>,
}

impl RetryPolicy {
    /// Creates a policy from a configuration.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            breaker: config
                .circuit_breaker
                .map(|c| Arc::new(CircuitBreaker::new(c))),
            counters: Arc::new(Counters::default()),
        }
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(RetryConfig::default().with_max_retries(0).without_circuit_breaker())
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Returns the circuit breaker, if enabled.
    #[must_use]
    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_deref()
    }

    /// Starts tracking attempts of one operation against `target`.
    ///
    /// For callers that need to mutate state between attempts; closures can
    /// use [`RetryPolicy::execute`] instead.
    #[must_use]
    pub fn attempts(&self, target: impl Into<String>) -> Attempts<'_> {
        Attempts {
            policy: self,
            target: target.into(),
            attempt: 0,
        }
    }

    /// Runs `op` until it succeeds, fails fatally, or retries are exhausted.
    ///
    /// `op` receives the zero-based attempt number. The last error is
    /// returned unchanged.
    pub async fn execute<T, F, Fut>(&self, target: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempts = self.attempts(target);
        loop {
            let attempt = attempts.admit()?;
            match op(attempt).await {
                Ok(value) => {
                    attempts.succeeded();
                    return Ok(value);
                }
                Err(err) => attempts.failed(err).await?,
            }
        }
    }

    /// Delay before retry number `attempt + 1` after `err`.
    ///
    /// `jitter` is clamped to `[0.5, 1.5]`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32, err: &FetchError, jitter: f64) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let mut delay = self
            .config
            .base_delay
            .saturating_mul(factor)
            .min(self.config.max_delay);
        if err.kind == ErrorKind::RateLimited {
            delay = delay.saturating_mul(self.config.rate_limit_multiplier.max(1));
        }
        let delay = delay.mul_f64(jitter.clamp(0.5, 1.5));
        err.retry_after.map_or(delay, |hint| delay.max(hint))
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> RetryStats {
        RetryStats {
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            successes: self.counters.successes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            breaker_trips: self.breaker.as_ref().map_or(0, |b| b.trips()),
            breaker_resets: self.breaker.as_ref().map_or(0, |b| b.resets()),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Attempt bookkeeping for one operation.
#[derive(Debug)]
pub struct Attempts<'a> {
    policy: &'a RetryPolicy,
    target: String,
    attempt: u32,
}

impl Attempts<'_> {
    /// Admits the next attempt.
    ///
    /// Only the first attempt passes through the circuit breaker; retries of
    /// an admitted operation are not cut short by a circuit opening meanwhile.
    /// Returns the zero-based attempt number.
    pub fn admit(&mut self) -> Result<u32, FetchError> {
        if self.attempt == 0
            && let Some(breaker) = &self.policy.breaker
            && let Err(err) = breaker.check(&self.target)
        {
            self.policy.counters.failures.fetch_add(1, Ordering::Relaxed);
            return Err(err);
        }
        self.policy.counters.attempts.fetch_add(1, Ordering::Relaxed);
        Ok(self.attempt)
    }

    /// Records success of the current attempt.
    pub fn succeeded(&self) {
        if let Some(breaker) = &self.policy.breaker {
            breaker.record_success(&self.target);
        }
        self.policy.counters.successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records failure of the current attempt.
    ///
    /// Sleeps and returns `Ok` if another attempt should follow; otherwise
    /// returns the error for the caller to surface. The breaker sees one
    /// failure per operation, once its retries are exhausted.
    pub async fn failed(&mut self, err: FetchError) -> Result<(), FetchError> {
        let policy = self.policy;
        if !err.retryable {
            if let Some(breaker) = &policy.breaker {
                breaker.release(&self.target);
            }
            policy.counters.failures.fetch_add(1, Ordering::Relaxed);
            return Err(err);
        }

        if self.attempt >= policy.config.max_retries {
            if let Some(breaker) = &policy.breaker {
                breaker.record_failure(&self.target);
            }
            policy.counters.failures.fetch_add(1, Ordering::Relaxed);
            return Err(err);
        }

        let jitter = rand::thread_rng().gen_range(0.5..=1.5);
        let delay = policy.backoff_delay(self.attempt, &err, jitter);
        warn!(
            target = %self.target,
            attempt = self.attempt + 1,
            max_attempts = policy.config.max_retries + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "retrying after failure"
        );
        tokio::time::sleep(delay).await;

        self.attempt += 1;
        policy.counters.retries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Zero-based number of the current attempt.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitPhase;
    use std::sync::atomic::AtomicU32;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::default()
                .with_max_retries(max_retries)
                .with_base_delay(Duration::from_millis(100))
                .without_circuit_breaker(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_retries_plus_one() {
        let policy = policy(3);
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = policy
            .execute("t", move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::from_status(503, "unavailable"))
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.status, Some(503));
        assert_eq!(err.kind, ErrorKind::Server);
        let stats = policy.stats();
        assert_eq!(stats.attempts, 4);
        assert_eq!(stats.retries, 3);
        assert_eq!(stats.failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let policy = policy(3);
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = policy
            .execute("t", move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::from_status(404, "not found"))
            })
            .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::Client);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_later_attempt() {
        let policy = policy(3);
        let value = policy
            .execute("t", |attempt| async move {
                if attempt < 2 {
                    Err(FetchError::network("connection reset"))
                } else {
                    Ok(attempt)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(policy.stats().successes, 1);
    }

    #[test]
    fn test_backoff_delay_bounds() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            rate_limit_multiplier: 4,
            circuit_breaker: None,
        });
        let server = FetchError::from_status(503, "x");
        let limited = FetchError::from_status(429, "x");

        assert_eq!(policy.backoff_delay(0, &server, 1.0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2, &server, 1.0), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(10, &server, 1.0), Duration::from_secs(8));
        assert_eq!(policy.backoff_delay(0, &server, 9.0), Duration::from_millis(1500));

        for attempt in 0..6 {
            let shortest_429 = policy.backoff_delay(attempt, &limited, 0.5);
            let longest_503 = policy.backoff_delay(attempt, &server, 1.5);
            assert!(shortest_429 > longest_503, "attempt {attempt}");
        }
    }

    #[test]
    fn test_retry_after_raises_delay() {
        let policy = policy(3);
        let err = FetchError::from_status(503, "x").with_retry_after(Some(Duration::from_secs(30)));
        assert_eq!(policy.backoff_delay(0, &err, 1.0), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_fails_fast_once_open() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 0,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            rate_limit_multiplier: 4,
            circuit_breaker: Some(CircuitBreakerConfig {
                failure_threshold: 2,
                cooldown: Duration::from_secs(30),
                max_cooldown: Duration::from_secs(60),
            }),
        });
        let counter = AtomicU32::new(0);
        let calls = &counter;
        for _ in 0..2 {
            let _ = policy
                .execute("ep", move |_| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(FetchError::network("down"))
                })
                .await;
        }

        let err = policy
            .execute("ep", move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CircuitOpen);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(policy.stats().breaker_trips, 1);
    }

    fn breaker_policy(max_retries: u32, threshold: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            rate_limit_multiplier: 4,
            circuit_breaker: Some(CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown: Duration::from_secs(30),
                max_cooldown: Duration::from_secs(60),
            }),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_failures_do_not_trip_breaker() {
        let policy = breaker_policy(3, 2);
        // Many concurrent operations each fail once and then recover.
        let results = futures::future::join_all((0..8).map(|_| {
            policy.execute("ep", |attempt| async move {
                if attempt == 0 {
                    Err(FetchError::from_status(503, "busy"))
                } else {
                    Ok(attempt)
                }
            })
        }))
        .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(policy.stats().breaker_trips, 0);
        assert_eq!(policy.breaker().unwrap().phase("ep"), CircuitPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_does_not_cut_admitted_retries() {
        let policy = breaker_policy(2, 1);

        // Admitted first; the other operation exhausts and opens the circuit
        // while this one is still on its first attempt.
        let admitted = policy.execute("ep", move |attempt| async move {
            if attempt == 0 {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Err(FetchError::network("reset"))
            } else {
                Ok(attempt)
            }
        });
        let exhausted = policy.execute("ep", |_| async {
            Err::<u32, _>(FetchError::from_status(500, "down"))
        });
        let (admitted, exhausted) = tokio::join!(admitted, exhausted);

        assert_eq!(exhausted.unwrap_err().kind, ErrorKind::Server);
        assert_eq!(admitted.unwrap(), 1);
        assert_eq!(policy.stats().breaker_trips, 1);
        let fresh = policy.execute("ep", |_| async { Ok(()) }).await;
        assert_eq!(fresh.unwrap_err().kind, ErrorKind::CircuitOpen);
    }
}
