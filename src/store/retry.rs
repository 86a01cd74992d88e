//! Retry and backoff around store calls.
//!
//! | Error class | Backoff | Default budget |
//! |-------------|---------|----------------|
//! | Rate limit (429) | exponential from 1 s, capped at 120 s, server `retry-after` wins | 5 retries |
//! | Conflict (409) | fixed 500 ms step per attempt, capped at 5 s | 4 retries |
//! | Network (reset / timeout) | linear 1 s step per attempt | 3 retries |
//!
//! Each class has its own attempt counter. Other errors are returned
//! immediately. The retried closure re-borrows the same payload on every
//! attempt, so a resubmission is always identical to the original call.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RetryClass, StoreError};

// =============================================================================
// RetryPolicy
// =============================================================================

/// Budget and step size for one error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffStep {
    pub max_retries: u32,
    pub base_ms: u64,
    pub cap_ms: u64,
}

impl BackoffStep {
    pub const fn new(max_retries: u32, base_ms: u64, cap_ms: u64) -> Self {
        Self {
            max_retries,
            base_ms,
            cap_ms,
        }
    }

    fn cap(&self) -> Duration {
        Duration::from_millis(self.cap_ms)
    }

    fn linear(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_ms.saturating_mul(u64::from(attempt))).min(self.cap())
    }

    fn exponential(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(factor)).min(self.cap())
    }
}

/// Backoff policy for every store call in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub rate_limit: BackoffStep,
    pub conflict: BackoffStep,
    pub network: BackoffStep,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit: BackoffStep::new(5, 1_000, 120_000),
            conflict: BackoffStep::new(4, 500, 5_000),
            network: BackoffStep::new(3, 1_000, 10_000),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            rate_limit: BackoffStep::new(0, 0, 0),
            conflict: BackoffStep::new(0, 0, 0),
            network: BackoffStep::new(0, 0, 0),
        }
    }

    /// Delay before the `attempt`-th retry (1-based, counted per class), or
    /// `None` when the error is not retryable or the budget is spent.
    pub fn delay_for(&self, err: &StoreError, attempt: u32) -> Option<Duration> {
        let class = err.retry_class()?;
        let step = self.step(class);
        if attempt == 0 || attempt > step.max_retries {
            return None;
        }
        let delay = match (class, err) {
            (RetryClass::RateLimit, StoreError::RateLimited { retry_after: Some(hint) }) => {
                (*hint).min(step.cap())
            }
            (RetryClass::RateLimit, _) => step.exponential(attempt),
            (RetryClass::Conflict | RetryClass::Network, _) => step.linear(attempt),
        };
        Some(delay)
    }

    fn step(&self, class: RetryClass) -> &BackoffStep {
        match class {
            RetryClass::RateLimit => &self.rate_limit,
            RetryClass::Conflict => &self.conflict,
            RetryClass::Network => &self.network,
        }
    }
}

// =============================================================================
// Retrier
// =============================================================================

/// Drives store calls through a [`RetryPolicy`] and counts what happened.
///
/// Shared by reference across the concurrent calls of one run.
#[derive(Debug, Default)]
pub struct Retrier {
    policy: RetryPolicy,
    retries: AtomicUsize,
    exhausted: AtomicUsize,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            retries: AtomicUsize::new(0),
            exhausted: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Number of backoff sleeps taken so far.
    pub fn retries(&self) -> usize {
        self.retries.load(Ordering::Relaxed)
    }

    /// Number of calls that ran out of retry budget.
    pub fn exhausted(&self) -> usize {
        self.exhausted.load(Ordering::Relaxed)
    }

    /// Run `call` until it succeeds, fails permanently, or the budget for
    /// its error class is spent.
    pub async fn run<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempts = [0u32; 3];
        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let Some(class) = err.retry_class() else {
                return Err(err);
            };
            let attempt = &mut attempts[class_index(class)];
            *attempt += 1;
            match self.policy.delay_for(&err, *attempt) {
                Some(delay) => {
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        op,
                        attempt = *attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "store call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    self.exhausted.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(op, attempts = *attempt, error = %err, "retry budget exhausted");
                    return Err(err);
                }
            }
        }
    }
}

fn class_index(class: RetryClass) -> usize {
    match class {
        RetryClass::RateLimit => 0,
        RetryClass::Conflict => 1,
        RetryClass::Network => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_rate_limit_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            rate_limit: BackoffStep::new(10, 1_000, 120_000),
            ..Default::default()
        };
        let err = StoreError::RateLimited { retry_after: None };
        let delays: Vec<_> = (1..=9).map(|n| policy.delay_for(&err, n).unwrap().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 120, 120]);
        assert!(policy.delay_for(&err, 11).is_none());
    }

    #[test]
    fn test_retry_after_hint_wins() {
        let policy = RetryPolicy::default();
        let err = StoreError::RateLimited {
            retry_after: Some(Duration::from_millis(2_500)),
        };
        assert_eq!(policy.delay_for(&err, 1), Some(Duration::from_millis(2_500)));
    }

    #[test]
    fn test_conflict_steps_are_small() {
        let policy = RetryPolicy::default();
        let err = StoreError::Conflict("busy".into());
        assert_eq!(policy.delay_for(&err, 1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(&err, 4), Some(Duration::from_millis(2_000)));
        assert_eq!(policy.delay_for(&err, 5), None);
    }

    #[test]
    fn test_rejected_is_never_retried() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(&StoreError::rejected("bad"), 1), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_rate_limits_then_success() {
        let retrier = Retrier::new(RetryPolicy::default());
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result = retrier
            .run("append", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(StoreError::RateLimited { retry_after: None })
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(retrier.retries(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(1 + 2 + 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_returns_last_error() {
        let retrier = Retrier::new(RetryPolicy {
            network: BackoffStep::new(2, 100, 1_000),
            ..Default::default()
        });
        let result: Result<(), _> = retrier
            .run("list", || async { Err(StoreError::Network("reset".into())) })
            .await;

        assert_eq!(result, Err(StoreError::Network("reset".into())));
        assert_eq!(retrier.retries(), 2);
        assert_eq!(retrier.exhausted(), 1);
    }
}
