//! Declarative retry policy and the generic executor that applies it.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// How transient failures are retried.
///
/// The policy knows nothing about HTTP; it only classifies [`Error`] values,
/// so it can be exercised without a network.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
  /// Total attempts, including the first one.
  pub max_attempts: u32,
  /// Delay before the first retry; doubled on every subsequent retry.
  pub base_delay: Duration,
  /// Upper bound for a single delay.
  pub max_delay: Duration,
  /// Lowercase substrings that mark an error message as transient.
  pub retryable_signatures: Vec<String>,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_millis(300),
      max_delay: Duration::from_millis(3000),
      retryable_signatures: default_signatures(),
    }
  }
}

pub fn default_signatures() -> Vec<String> {
  ["rate limit", "too many requests", "throttl", "timeout", "timed out"]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl RetryPolicy {
  pub fn max_retries(&self) -> u32 {
    self.max_attempts.saturating_sub(1)
  }

  fn matches_signature(&self, text: &str) -> bool {
    let text = text.to_lowercase();
    self
      .retryable_signatures
      .iter()
      .any(|sig| text.contains(sig.as_str()))
  }

  /// Whether an error is worth another attempt against the same endpoint.
  pub fn is_retryable(&self, err: &Error) -> bool {
    match err {
      Error::Network { .. } | Error::RateLimited { .. } => true,
      Error::Status { status, .. } => (500..=599).contains(status),
      Error::PartialData { data: None, .. } => self.matches_signature(&err.signature_text()),
      _ => false,
    }
  }

  /// Whether an exhausted error should be re-issued against the secondary
  /// endpoint: throttling, timeouts, and an unavailable or timed-out gateway.
  pub fn is_failover_eligible(&self, err: &Error) -> bool {
    match err {
      Error::RateLimited { .. } => true,
      Error::Status { status, .. } => matches!(status, 503 | 504),
      Error::Network { .. } | Error::PartialData { data: None, .. } => {
        self.matches_signature(&err.signature_text())
      }
      _ => false,
    }
  }

  /// Delay before retry number `retry` (1-based): exponential, capped, with
  /// jitter in the upper half of the window.
  pub fn delay_for(&self, retry: u32) -> Duration {
    let exp = self
      .base_delay
      .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)));
    let capped = exp.min(self.max_delay);
    let millis = capped.as_millis() as u64;
    if millis == 0 {
      return Duration::ZERO;
    }
    let half = millis / 2;
    Duration::from_millis(half + rand::thread_rng().gen_range(0..=millis - half))
  }

  /// Final error once attempts run out. Throttling signatures become
  /// [`Error::RateLimited`]; everything else is passed through.
  fn exhausted(&self, err: Error, attempts: u32) -> Error {
    match err {
      Error::RateLimited { message, .. } => Error::RateLimited { attempts, message },
      Error::PartialData { data: None, .. } if self.matches_signature(&err.signature_text()) => {
        Error::RateLimited {
          attempts,
          message: err.signature_text(),
        }
      }
      other => other,
    }
  }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the policy
/// runs out of attempts.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let max_attempts = policy.max_attempts.max(1);
  let mut attempt = 1;

  loop {
    match op().await {
      Ok(value) => return Ok(value),
      Err(err) if !policy.is_retryable(&err) => return Err(err),
      Err(err) if attempt >= max_attempts => {
        tracing::warn!(operation, attempts = attempt, error = %err, "Giving up after retries");
        return Err(policy.exhausted(err, attempt));
      }
      Err(err) => {
        let delay = policy.delay_for(attempt);
        tracing::warn!(
          operation,
          attempt,
          delay_ms = delay.as_millis() as u64,
          error = %err,
          "Transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
    }
  }
}
