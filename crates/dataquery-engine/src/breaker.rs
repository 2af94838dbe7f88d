//! Per-endpoint circuit breaker.

use dataquery_types::{ErrorKind, FetchError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive operations ending in exhausted retries that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a probe is allowed.
    pub cooldown: Duration,
    /// Upper bound for the cooldown after repeated failed probes.
    pub max_cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            max_cooldown: Duration::from_secs(600),
        }
    }
}

/// Observable phase of one circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitPhase {
    /// Requests flow normally.
    Closed,
    /// Requests fail fast.
    Open,
    /// Cooldown elapsed; one probe may pass.
    HalfOpen,
}

#[derive(Debug, Clone, Default)]
struct CircuitState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
    probe_started: Option<Instant>,
    cooldown: Duration,
}

/// Tracks consecutive failures per target and fails fast while a target is open.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuits: Mutex<HashMap<String, CircuitState>>,
    trips: AtomicU64,
    resets: AtomicU64,
}

impl CircuitBreaker {
    /// Creates a breaker with every circuit closed.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
            trips: AtomicU64::new(0),
            resets: AtomicU64::new(0),
        }
    }

    /// Returns the breaker configuration.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Admits a call to `target` or fails with a `CircuitOpen` error.
    ///
    /// After the cooldown exactly one caller is admitted as the half-open
    /// probe; others keep failing until the probe resolves. A probe that never
    /// reports back is considered lost after another cooldown.
    pub fn check(&self, target: &str) -> Result<(), FetchError> {
        let now = Instant::now();
        let mut circuits = self.lock();
        let Some(state) = circuits.get_mut(target) else {
            return Ok(());
        };

        match state.open_until {
            None => Ok(()),
            Some(until) if now < until => Err(Self::open_error(target, until - now)),
            Some(_) => match state.probe_started {
                Some(started) if now < started + state.cooldown => {
                    Err(Self::open_error(target, started + state.cooldown - now))
                }
                _ => {
                    state.probe_started = Some(now);
                    Ok(())
                }
            },
        }
    }

    /// Records a successful call; closes the circuit.
    pub fn record_success(&self, target: &str) {
        let removed = self.lock().remove(target);
        if removed.is_some_and(|s| s.open_until.is_some()) {
            self.resets.fetch_add(1, Ordering::Relaxed);
            info!(target, "circuit closed after successful probe");
        }
    }

    /// Records an operation that exhausted its retries; may open or re-open the circuit.
    pub fn record_failure(&self, target: &str) {
        let now = Instant::now();
        let mut circuits = self.lock();
        let state = circuits.entry(target.to_string()).or_default();
        state.consecutive_failures += 1;

        if state.probe_started.take().is_some() {
            state.cooldown = (state.cooldown * 2).min(self.config.max_cooldown);
            state.open_until = Some(now + state.cooldown);
            self.trips.fetch_add(1, Ordering::Relaxed);
            warn!(target, cooldown_secs = state.cooldown.as_secs(), "circuit probe failed, reopening");
        } else if state.open_until.is_none()
            && state.consecutive_failures >= self.config.failure_threshold
        {
            state.cooldown = self.config.cooldown;
            state.open_until = Some(now + state.cooldown);
            self.trips.fetch_add(1, Ordering::Relaxed);
            warn!(
                target,
                failures = state.consecutive_failures,
                cooldown_secs = state.cooldown.as_secs(),
                "circuit opened"
            );
        }
    }

    /// Records a call that ended without saying anything about target health.
    ///
    /// Frees the half-open slot so the next caller may probe.
    pub fn release(&self, target: &str) {
        if let Some(state) = self.lock().get_mut(target) {
            state.probe_started = None;
        }
    }

    /// Returns the current phase of a target's circuit.
    #[must_use]
    pub fn phase(&self, target: &str) -> CircuitPhase {
        let now = Instant::now();
        match self.lock().get(target).and_then(|s| s.open_until) {
            None => CircuitPhase::Closed,
            Some(until) if now < until => CircuitPhase::Open,
            Some(_) => CircuitPhase::HalfOpen,
        }
    }

    /// Number of times a circuit opened.
    #[must_use]
    pub fn trips(&self) -> u64 {
        self.trips.load(Ordering::Relaxed)
    }

    /// Number of times an open circuit closed again.
    #[must_use]
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CircuitState>> {
        // State stays consistent across a panic in another holder.
        self.circuits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn open_error(target: &str, remaining: Duration) -> FetchError {
        FetchError::new(
            ErrorKind::CircuitOpen,
            format!(
                "circuit open for {target}, retry in {:.1}s",
                remaining.as_secs_f64()
            ),
        )
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: &str = "https://host/group/file/download";

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            cooldown: Duration::from_secs(10),
            max_cooldown: Duration::from_secs(40),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let b = breaker();
        for _ in 0..2 {
            b.check(T).unwrap();
            b.record_failure(T);
        }
        assert_eq!(b.phase(T), CircuitPhase::Closed);

        b.check(T).unwrap();
        b.record_failure(T);
        assert_eq!(b.phase(T), CircuitPhase::Open);
        assert_eq!(b.trips(), 1);

        let err = b.check(T).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CircuitOpen);
        assert!(!err.retryable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_count() {
        let b = breaker();
        b.record_failure(T);
        b.record_failure(T);
        b.record_success(T);
        b.record_failure(T);
        b.record_failure(T);
        assert_eq!(b.phase(T), CircuitPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_probe() {
        let b = breaker();
        for _ in 0..3 {
            b.record_failure(T);
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(b.phase(T), CircuitPhase::HalfOpen);

        assert!(b.check(T).is_ok());
        assert!(b.check(T).is_err(), "second caller must not pass while probing");

        b.record_success(T);
        assert_eq!(b.phase(T), CircuitPhase::Closed);
        assert!(b.check(T).is_ok());
        assert_eq!(b.resets(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_extends_cooldown() {
        let b = breaker();
        for _ in 0..3 {
            b.record_failure(T);
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        b.check(T).unwrap();
        b.record_failure(T);
        assert_eq!(b.phase(T), CircuitPhase::Open);
        assert_eq!(b.trips(), 2);

        // Cooldown doubled to 20s
        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(b.check(T).is_err());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(b.check(T).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_targets_are_independent() {
        let b = breaker();
        for _ in 0..3 {
            b.record_failure(T);
        }
        assert!(b.check(T).is_err());
        assert!(b.check("https://host/group/file/availability").is_ok());
    }
}
