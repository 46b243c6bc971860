//! Retrying host calls that failed for transient reasons.
//!
//! Reads retry on any [`BackendError::is_retryable`] failure. Commits are not
//! idempotent, so the save path retries them only when the host provably
//! refused the request ([`BackendError::is_refused`]); an ambiguous network
//! failure may have landed and is surfaced instead.

use crate::error::{BackendError, BackendResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How many times to try a host call and how long to wait in between.
///
/// The wait doubles after every failed try, up to `cap`. A rate-limited
/// response carrying `Retry-After` waits at least that long, still bounded
/// by `cap`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total tries, the first one included. Zero behaves like one.
    pub attempts: u32,
    pub base: Duration,
    pub cap: Duration,
    pub factor: f64,
    /// Stretch each wait by a random 0-25% so clients do not retry in lockstep.
    pub jitter: bool,
}

impl RetryConfig {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts,
            base: Duration::from_millis(200),
            cap: Duration::from_secs(30),
            factor: 2.0,
            jitter: true,
        }
    }

    /// A single try, no waiting.
    pub fn no_retry() -> Self {
        Self {
            attempts: 1,
            base: Duration::ZERO,
            cap: Duration::ZERO,
            factor: 1.0,
            jitter: false,
        }
    }

    pub fn with_initial_delay(self, base: Duration) -> Self {
        Self { base, ..self }
    }

    pub fn with_max_delay(self, cap: Duration) -> Self {
        Self { cap, ..self }
    }

    pub fn without_jitter(self) -> Self {
        Self {
            jitter: false,
            ..self
        }
    }

    /// Wait before retry number `attempt`; retry 0 is the first try and
    /// never waits.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(doublings) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };
        let exponent = i32::try_from(doublings).unwrap_or(i32::MAX);
        let grown = self.base.as_secs_f64() * self.factor.powi(exponent);
        let wait = if grown.is_finite() && grown < self.cap.as_secs_f64() {
            Duration::from_secs_f64(grown.max(0.0))
        } else {
            self.cap
        };
        if self.jitter {
            wait.mul_f64(1.0 + rand::thread_rng().gen_range(0.0..0.25))
        } else {
            wait
        }
    }

    /// Wait before retrying after `err`. Honors the host's `Retry-After`
    /// when it is longer than the backoff, never beyond `cap`.
    pub fn delay_after(&self, attempt: u32, err: &BackendError) -> Duration {
        let backoff = self.delay_for_attempt(attempt);
        let requested = match err {
            BackendError::RateLimited {
                retry_after_secs: Some(secs),
            } => Duration::from_secs(*secs).min(self.cap),
            _ => Duration::ZERO,
        };
        backoff.max(requested)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or runs
/// out of attempts.
///
/// While waiting between attempts, `cancel` (if given) aborts with
/// [`BackendError::Cancelled`].
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    cancel: Option<&CancellationToken>,
    what: &str,
    op: F,
) -> BackendResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BackendResult<T>>,
{
    with_retry_when(config, cancel, what, BackendError::is_retryable, op).await
}

/// Like [`with_retry`], but only errors accepted by `retry_if` are retried.
pub async fn with_retry_when<T, F, Fut>(
    config: &RetryConfig,
    cancel: Option<&CancellationToken>,
    what: &str,
    retry_if: fn(&BackendError) -> bool,
    mut op: F,
) -> BackendResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BackendResult<T>>,
{
    let attempts = config.attempts.max(1);
    for attempt in 1.. {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= attempts || !retry_if(&err) {
            return Err(err);
        }
        let delay = config.delay_after(attempt, &err);
        warn!(
            "{} failed (attempt {}/{}): {}; retrying in {:?}",
            what, attempt, attempts, err, delay
        );
        let Some(token) = cancel else {
            tokio::time::sleep(delay).await;
            continue;
        };
        tokio::select! {
            _ = token.cancelled() => return Err(BackendError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
    Err(BackendError::Validation(format!("{what}: retry attempts exhausted")))
}
