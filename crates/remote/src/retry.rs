//! Retry and deadline handling for authority calls.
//!
//! [`with_retry`] wraps an async operation with automatic retry on transient
//! errors (transport failures, timeouts). Classified answers from the
//! authority (not found, service codes) are returned immediately.
//!
//! [`with_deadline`] bounds the whole retry loop by the earlier of the
//! caller's deadline and [`RemoteConfig::timeout`].
//!
//! # Backoff Strategy
//!
//! Retries use exponential backoff with jitter:
//! - Base delay doubles with each attempt: `initial_backoff * 2^attempt`
//! - Delay is capped at `max_backoff`
//! - Random jitter of 0–50% of the computed delay is added so concurrent
//!   gateways do not retry in lockstep

use std::{future::Future, time::Duration};

use fail::fail_point;
use rand::Rng;
use tokio::time::Instant;

use crate::{
    config::{RemoteConfig, RetryConfig},
    error::{RemoteError, RemoteResult},
};

/// Executes `operation` with automatic retry on transient errors.
///
/// Returns the result of the first successful call, or the last error if all
/// retry attempts are exhausted.
#[tracing::instrument(skip(config, operation), fields(max_retries = config.max_retries))]
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> RemoteResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RemoteResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "operation succeeded after retry",
                    );
                }
                return Ok(value);
            },
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = compute_backoff(config, attempt);
                tracing::debug!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient error, retrying after backoff",
                );
                fail_point!("remote-retry-before-sleep");
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(err) => {
                if attempt > 0 && err.is_transient() {
                    tracing::debug!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %err,
                        "retries exhausted",
                    );
                }
                return Err(err);
            },
        }
    }
}

/// Executes `operation` with retry, bounded by a time budget.
///
/// The budget is [`RemoteConfig::timeout`], shortened to whatever remains
/// before `deadline` when one is given. An exhausted budget, including one
/// that ran out before the call started, yields [`RemoteError::Timeout`].
#[tracing::instrument(skip(config, deadline, operation), fields(timeout_ms = config.timeout.as_millis() as u64))]
pub async fn with_deadline<F, Fut, T>(
    config: &RemoteConfig,
    deadline: Option<Instant>,
    operation_name: &str,
    operation: F,
) -> RemoteResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RemoteResult<T>>,
{
    let budget = budget(config.timeout, deadline, Instant::now());
    if budget.is_zero() {
        tracing::debug!(operation = operation_name, "deadline already passed");
        return Err(RemoteError::timeout(budget));
    }

    match tokio::time::timeout(budget, with_retry(&config.retry, operation_name, operation)).await {
        Ok(result) => result,
        Err(_elapsed) => {
            tracing::debug!(
                operation = operation_name,
                budget_ms = budget.as_millis() as u64,
                "authority call exceeded its budget",
            );
            Err(RemoteError::timeout(budget))
        },
    }
}

/// Returns the smaller of `timeout` and the time left before `deadline`.
fn budget(timeout: Duration, deadline: Option<Instant>, now: Instant) -> Duration {
    match deadline {
        Some(deadline) => timeout.min(deadline.saturating_duration_since(now)),
        None => timeout,
    }
}

/// Computes the backoff duration for the given attempt number.
///
/// `min(initial_backoff * 2^attempt, max_backoff) + random(0..50% of delay)`
fn compute_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.initial_backoff.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = base.min(config.max_backoff);

    let jitter_range = capped.as_millis() as u64 / 2;
    if jitter_range > 0 {
        let jitter = rand::rng().random_range(0..=jitter_range);
        capped + Duration::from_millis(jitter)
    } else {
        capped
    }
}
