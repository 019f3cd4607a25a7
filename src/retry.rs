//! Generic retry policy for external collaborator calls.
//!
//! Exponential backoff with jitter: base delay doubles per attempt, capped,
//! with ±jitter% randomization to prevent thundering herd against a shared
//! downstream. Only errors whose code is retryable get another attempt;
//! everything else returns immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::models::errors::{EngineError, EngineResult, ErrorCode};

/// Base retry delay in milliseconds
pub const BASE_RETRY_MS: u64 = 250;

/// Maximum retry delay in milliseconds
pub const MAX_RETRY_MS: u64 = 5_000;

/// Default maximum attempts (1 initial + 2 retries)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Jitter percentage applied to each delay
pub const RETRY_JITTER_PERCENT: u64 = 20;

/// Retry policy: max attempts, backoff schedule, jitter.
///
/// The retryable-error predicate lives on [`EngineError::is_retryable`];
/// the policy only decides how often and how long to wait.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 = no retry)
    pub max_attempts: u32,
    /// Base delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Cap on the exponential delay, in milliseconds
    pub max_delay_ms: u64,
    /// Random jitter applied to each delay, in percent of the delay
    pub jitter_percent: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: BASE_RETRY_MS,
            max_delay_ms: MAX_RETRY_MS,
            jitter_percent: RETRY_JITTER_PERCENT,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries (single attempt)
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Policy with a custom attempt budget and default backoff
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based): base * 2^(retry-1),
    /// capped, with ±jitter%. Never below 10ms so a tight loop cannot
    /// hammer a struggling collaborator.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32);
        let base = self.base_delay_ms.saturating_mul(2_u64.pow(exponent));
        let capped = base.min(self.max_delay_ms);

        let jitter_range = (capped * self.jitter_percent) / 100;
        let jitter: i64 = if jitter_range > 0 {
            rand::thread_rng().gen_range(-(jitter_range as i64)..=(jitter_range as i64))
        } else {
            0
        };

        let final_ms = (capped as i64 + jitter).max(10) as u64;
        Duration::from_millis(final_ms)
    }

    /// Run `op` under this policy. Retries only while the returned error
    /// is retryable and the attempt budget lasts.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error: Option<EngineError> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.delay_for(attempt - 1);
                debug!(
                    "⏳ Retry {}/{} after {}ms",
                    attempt,
                    max_attempts,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| EngineError::new(ErrorCode::Unknown, "Retry budget exhausted")))
    }
}
