//! Bounded retry with exponential backoff for collaborator calls.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::adapters::{AdapterError, AdapterResult};
use crate::config::RetryConfig;
use crate::metrics::METRICS;
use crate::obs;

/// Retry schedule for one collaborator step.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least one is always made.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(c: &RetryConfig) -> Self {
        Self {
            max_attempts: c.max_attempts,
            initial_backoff: Duration::from_millis(c.initial_backoff_ms),
            max_backoff: Duration::from_millis(c.max_backoff_ms),
            multiplier: c.multiplier,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failed`-th failed attempt (1-based).
    pub fn backoff(&self, failed: u32) -> Duration {
        let exp = i32::try_from(failed.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exp);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Why a retried call gave up.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    Cancelled,
    Exhausted { attempts: u32, last: AdapterError },
}

/// Where a call runs: its name for logs, its per-attempt timeout, the
/// request's token and the shared in-flight limiter.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub adapter: &'static str,
    pub timeout: Duration,
    pub cancel: &'a CancellationToken,
    pub limiter: &'a Semaphore,
}

/// Run `call` until it succeeds, the policy is spent or the token fires.
///
/// Each attempt first takes a limiter permit, then races the call against
/// its timeout and the token. A timeout counts as a failed attempt.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    ctx: CallContext<'_>,
    mut call: F,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AdapterResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(CallError::Cancelled),
            outcome = attempt_once(&mut call, ctx) => outcome,
        };
        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(AdapterError::Cancelled) if ctx.cancel.is_cancelled() => {
                return Err(CallError::Cancelled)
            }
            Err(e) => e,
        };
        if attempt >= attempts {
            return Err(CallError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let delay = policy.backoff(attempt);
        obs::emit_adapter_retry(ctx.adapter, attempt, delay.as_millis() as u64, &err);
        METRICS.inc_adapter_retries();
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(CallError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn attempt_once<T, F, Fut>(call: &mut F, ctx: CallContext<'_>) -> AdapterResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AdapterResult<T>>,
{
    let _permit = ctx
        .limiter
        .acquire()
        .await
        .map_err(|_| AdapterError::Unavailable("adapter limiter closed".to_string()))?;
    match tokio::time::timeout(ctx.timeout, call()).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout {
            after_ms: ctx.timeout.as_millis() as u64,
        }),
    }
}
