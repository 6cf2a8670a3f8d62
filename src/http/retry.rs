use crate::config::RetryConfig;
use crate::error::Error;
use crate::http::{ApiRequest, ApiResponse, Executor};
use crate::prelude::{debug, warn};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Sleeps for `dur` unless `token` fires first. Returns `true` if cancelled.
pub(crate) async fn sleep_or_cancel(token: &CancellationToken, dur: Duration) -> bool {
    tokio::select! {
        biased;
        () = token.cancelled() => true,
        () = sleep(dur) => false,
    }
}

/// Computes the delay before a retry.
pub trait Backoff: Send + Sync {
    /// Returns the delay to wait after failed attempt number `attempt` (starting at 1).
    fn next_delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with small jitter.
///
/// The delay after attempt `n` is `min * 2^(n-1)`, clamped to `max`, plus up
/// to 10% jitter (the total never exceeds `max`). The jitter spreads out
/// clients that hit the same failure at the same time.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct JitterBackoff {
    min: Duration,
    max: Duration,
}

impl JitterBackoff {
    /// Creates a backoff between `min` and `max`. Inverted bounds are swapped.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min > max {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }
}

impl Default for JitterBackoff {
    fn default() -> Self {
        Self::from(RetryConfig::default())
    }
}

impl From<RetryConfig> for JitterBackoff {
    fn from(config: RetryConfig) -> Self {
        Self::new(config.min_backoff, config.max_backoff)
    }
}

impl Backoff for JitterBackoff {
    // Millisecond precision is enough for retry delays.
    #[allow(clippy::cast_possible_truncation)]
    fn next_delay(&self, attempt: u32) -> Duration {
        let min = self.min.as_millis().min(u128::from(u64::MAX)) as u64;
        let max = self.max.as_millis().min(u128::from(u64::MAX)) as u64;

        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let base = min.saturating_mul(factor).min(max);
        if base == 0 {
            return Duration::ZERO;
        }

        let jitter = base / 10;
        let add = if jitter > 0 {
            fastrand::u64(0..=jitter)
        } else {
            0
        };

        Duration::from_millis(base.saturating_add(add).min(max))
    }
}

/// The outcome of one attempt, as seen by a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryContext<'a> {
    attempt: u32,
    outcome: &'a Result<ApiResponse, Error>,
}

impl<'a> RetryContext<'a> {
    pub(crate) fn new(attempt: u32, outcome: &'a Result<ApiResponse, Error>) -> Self {
        Self { attempt, outcome }
    }

    /// Number of the attempt that just finished, starting at 1.
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Response status, if the attempt produced a response.
    pub fn status(&self) -> Option<StatusCode> {
        self.outcome.as_ref().ok().map(|response| response.status)
    }

    /// Error, if the attempt failed without a response.
    pub fn error(&self) -> Option<&'a Error> {
        self.outcome.as_ref().err()
    }

    /// The full outcome.
    pub const fn outcome(&self) -> &'a Result<ApiResponse, Error> {
        self.outcome
    }
}

/// Decides whether an attempt should be retried.
///
/// Closures `Fn(&RetryContext<'_>) -> bool` implement this trait.
pub trait RetryPolicy: Send + Sync {
    /// Returns `true` to retry after the attempt described by `ctx`.
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool;
}

impl<F> RetryPolicy for F
where
    F: Fn(&RetryContext<'_>) -> bool + Send + Sync,
{
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
        self(ctx)
    }
}

/// Retry policy for the App Store Server API.
///
/// Retries `401 Unauthorized` (the token may have expired server-side just as
/// it was sent) and connections that ended before a full response was read.
/// Everything else, including cancellation, is final.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreRetryPolicy;

impl RetryPolicy for StoreRetryPolicy {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
        match ctx.outcome() {
            Ok(response) => response.status == StatusCode::UNAUTHORIZED,
            Err(Error::Transport(e)) => e.is_interrupted(),
            Err(_) => false,
        }
    }
}

/// Re-sends requests whose outcome the policy selects.
///
/// Only use for idempotent or replay-safe requests: every attempt sends the
/// same method, URL, headers and body.
#[derive(Debug, Clone)]
pub struct Retry<E, P, B> {
    inner: E,
    policy: P,
    backoff: B,
    max_attempts: u32,
}

impl<E, P, B> Retry<E, P, B> {
    /// Wraps `inner`. `max_attempts` counts the first attempt and is at least 1.
    pub fn new(inner: E, policy: P, backoff: B, max_attempts: u32) -> Self {
        Self {
            inner,
            policy,
            backoff,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Returns the attempt ceiling.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl<E, P, B> Executor for Retry<E, P, B>
where
    E: Executor,
    P: RetryPolicy,
    B: Backoff,
{
    async fn execute(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, Error> {
        let mut attempt = 1;
        loop {
            let outcome = self.inner.execute(request.clone(), cancel).await;
            if matches!(outcome, Err(Error::Cancelled)) {
                return outcome;
            }

            let retryable = self
                .policy
                .should_retry(&RetryContext::new(attempt, &outcome));
            if !retryable {
                return outcome;
            }
            if attempt >= self.max_attempts {
                warn!(
                    "Giving up on {} {} after {} attempts",
                    request.method, request.url, attempt
                );
                return outcome;
            }

            let delay = self.backoff.next_delay(attempt);
            debug!(
                "Retrying {} {}: attempt={}, backoff_ms={}",
                request.method,
                request.url,
                attempt,
                delay.as_millis()
            );
            if sleep_or_cancel(cancel, delay).await {
                return Err(Error::Cancelled);
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::TransportError;
    use std::io;

    #[test]
    fn jitter_backoff_grows_and_clamps() {
        let backoff = JitterBackoff::new(Duration::from_millis(100), Duration::from_millis(1000));

        let first = backoff.next_delay(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(110));

        let third = backoff.next_delay(3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(440));

        assert_eq!(backoff.next_delay(10), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(200), Duration::from_millis(1000));
    }

    #[test]
    fn jitter_backoff_zero_min_is_zero() {
        let backoff = JitterBackoff::new(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(backoff.next_delay(5), Duration::ZERO);
    }

    #[test]
    fn jitter_backoff_swaps_inverted_bounds() {
        let backoff = JitterBackoff::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(30), Duration::from_secs(2));
        assert!(backoff.next_delay(1) >= Duration::from_secs(1));
    }

    #[test]
    fn store_policy_retries_unauthorized_and_interrupted() {
        let policy = StoreRetryPolicy;

        let unauthorized = Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, Vec::new()));
        assert!(policy.should_retry(&RetryContext::new(1, &unauthorized)));

        let eof = Err(Error::Transport(TransportError::Io(io::Error::from(
            io::ErrorKind::UnexpectedEof,
        ))));
        assert!(policy.should_retry(&RetryContext::new(1, &eof)));
    }

    #[test]
    fn store_policy_does_not_retry_other_outcomes() {
        let policy = StoreRetryPolicy;

        for status in [StatusCode::OK, StatusCode::NOT_FOUND, StatusCode::TOO_MANY_REQUESTS] {
            let outcome = Ok(ApiResponse::new(status, Vec::new()));
            assert!(!policy.should_retry(&RetryContext::new(1, &outcome)));
        }

        let refused = Err(Error::Transport(TransportError::Io(io::Error::from(
            io::ErrorKind::ConnectionRefused,
        ))));
        assert!(!policy.should_retry(&RetryContext::new(1, &refused)));
        assert!(!policy.should_retry(&RetryContext::new(1, &Err(Error::Cancelled))));
    }

    #[test]
    fn retry_context_accessors() {
        let outcome = Ok(ApiResponse::new(StatusCode::ACCEPTED, Vec::new()));
        let ctx = RetryContext::new(2, &outcome);
        assert_eq!(ctx.attempt(), 2);
        assert_eq!(ctx.status(), Some(StatusCode::ACCEPTED));
        assert!(ctx.error().is_none());
    }

    #[tokio::test]
    async fn sleep_or_cancel_returns_early_on_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(sleep_or_cancel(&token, Duration::from_secs(60)).await);
        assert!(!sleep_or_cancel(&CancellationToken::new(), Duration::from_millis(1)).await);
    }
}
