//! Generic retry-with-backoff and circuit-breaker primitives shared by every
//! component that calls into something that can fail transiently (the
//! embedder backends, the lexical/vector store opens, the daemon's outbound
//! requests).

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RetryConfig {
  pub max_retries: u32,
  pub initial_delay: Duration,
  pub max_delay: Duration,
  pub multiplier: f64,
  pub jitter: bool,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_delay: Duration::from_millis(500),
      max_delay: Duration::from_secs(30),
      multiplier: 2.0,
      jitter: true,
    }
  }
}

impl RetryConfig {
  pub fn for_local() -> Self {
    Self {
      max_retries: 2,
      initial_delay: Duration::from_millis(250),
      max_delay: Duration::from_secs(5),
      multiplier: 2.0,
      jitter: true,
    }
  }

  pub fn for_remote() -> Self {
    Self {
      max_retries: 5,
      initial_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(60),
      multiplier: 2.0,
      jitter: true,
    }
  }

  /// Backoff for the given zero-indexed attempt, capped at `max_delay`.
  /// Jitter multiplies the base delay by a uniform factor in [0.5, 1.0].
  pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
    let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
    let capped = base.min(self.max_delay.as_secs_f64());
    let factor = if self.jitter { 0.5 + jitter_fraction() * 0.5 } else { 1.0 };
    Duration::from_secs_f64((capped * factor).min(self.max_delay.as_secs_f64()))
  }
}

fn jitter_fraction() -> f64 {
  use std::time::{SystemTime, UNIX_EPOCH};
  let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().subsec_nanos();
  (nanos as f64 / u32::MAX as f64).fract()
}

/// Run `op` with exponential backoff. `is_retryable` decides whether a given
/// error should be retried at all; `op` is re-invoked from scratch on retry.
pub async fn retry<T, E, F, Fut, R>(config: &RetryConfig, is_retryable: R, mut op: F) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  R: Fn(&E) -> bool,
{
  let mut last_err = None;
  for attempt in 0..=config.max_retries {
    if attempt > 0 {
      tokio::time::sleep(config.delay_for_attempt(attempt - 1)).await;
    }
    match op().await {
      Ok(v) => return Ok(v),
      Err(e) => {
        if attempt < config.max_retries && is_retryable(&e) {
          last_err = Some(e);
          continue;
        }
        return Err(e);
      }
    }
  }
  Err(last_err.expect("loop always executes at least once"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
  Closed,
  Open,
  HalfOpen,
}

struct CircuitInner {
  state: CircuitState,
  consecutive_failures: u32,
  opened_at: Option<Instant>,
}

/// A per-dependency circuit breaker: opens after `failure_threshold`
/// consecutive failures, moves to half-open after `reset_timeout`, and
/// closes again on the first half-open success.
pub struct CircuitBreaker {
  name: String,
  failure_threshold: u32,
  reset_timeout: Duration,
  inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
  pub fn new(name: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
    Self {
      name: name.into(),
      failure_threshold,
      reset_timeout,
      inner: Mutex::new(CircuitInner {
        state: CircuitState::Closed,
        consecutive_failures: 0,
        opened_at: None,
      }),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Whether a call is currently allowed through. Transitions Open -> HalfOpen
  /// as a side effect once `reset_timeout` has elapsed.
  pub fn allow(&self) -> bool {
    let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
    match inner.state {
      CircuitState::Closed | CircuitState::HalfOpen => true,
      CircuitState::Open => {
        let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
        if elapsed >= self.reset_timeout {
          inner.state = CircuitState::HalfOpen;
          true
        } else {
          false
        }
      }
    }
  }

  pub fn record_success(&self) {
    let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
    inner.state = CircuitState::Closed;
    inner.consecutive_failures = 0;
    inner.opened_at = None;
  }

  pub fn record_failure(&self) {
    let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
    match inner.state {
      CircuitState::HalfOpen => {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
      }
      CircuitState::Closed | CircuitState::Open => {
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold {
          inner.state = CircuitState::Open;
          inner.opened_at = Some(Instant::now());
        }
      }
    }
  }

  pub fn state(&self) -> CircuitState {
    self.inner.lock().expect("circuit breaker mutex poisoned").state
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_delay_grows_exponentially_without_jitter() {
    let config = RetryConfig {
      initial_delay: Duration::from_secs(1),
      multiplier: 2.0,
      max_delay: Duration::from_secs(60),
      jitter: false,
      ..RetryConfig::default()
    };
    assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
    assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
    assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
  }

  #[test]
  fn test_delay_caps_at_max() {
    let config = RetryConfig {
      initial_delay: Duration::from_secs(10),
      multiplier: 10.0,
      max_delay: Duration::from_secs(30),
      jitter: false,
      ..RetryConfig::default()
    };
    assert_eq!(config.delay_for_attempt(2), Duration::from_secs(30));
  }

  #[tokio::test]
  async fn test_retry_succeeds_after_transient_failures() {
    let config = RetryConfig {
      initial_delay: Duration::from_millis(1),
      max_delay: Duration::from_millis(2),
      ..RetryConfig::default()
    };
    let attempts = std::sync::atomic::AtomicU32::new(0);
    let result: Result<i32, &str> = retry(
      &config,
      |_: &&str| true,
      || {
        let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        async move { if n < 2 { Err("transient") } else { Ok(42) } }
      },
    )
    .await;
    assert_eq!(result, Ok(42));
  }

  #[tokio::test]
  async fn test_retry_stops_on_non_retryable() {
    let config = RetryConfig::default();
    let attempts = std::sync::atomic::AtomicU32::new(0);
    let result: Result<i32, &str> = retry(
      &config,
      |_: &&str| false,
      || {
        attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        async move { Err("fatal") }
      },
    )
    .await;
    assert_eq!(result, Err("fatal"));
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
  }

  #[test]
  fn test_circuit_breaker_opens_after_threshold() {
    let breaker = CircuitBreaker::new("test", 3, Duration::from_secs(60));
    assert!(breaker.allow());
    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Closed);
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(!breaker.allow());
  }

  #[test]
  fn test_circuit_breaker_half_open_recovery() {
    let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(1));
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);
    std::thread::sleep(Duration::from_millis(5));
    assert!(breaker.allow());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);
  }

  #[test]
  fn test_circuit_breaker_half_open_failure_reopens() {
    let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(1));
    breaker.record_failure();
    std::thread::sleep(Duration::from_millis(5));
    assert!(breaker.allow());
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);
  }
}
