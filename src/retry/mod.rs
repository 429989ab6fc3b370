//! Retry wrapper
//!
//! Generic re-execution of fallible network operations. The wrapper itself
//! knows nothing about HTTP or timing policy: after every failed attempt it
//! asks a caller-supplied [`RetryPolicy`] whether to re-invoke the operation
//! (after a policy-chosen delay) or to abort by returning the failure.
//!
//! Different call sites carry different policies: URL acquisition, part PUTs,
//! completion POSTs, and file-record creation each get their own
//! [`BackoffPolicy`], optionally with a site-specific abort predicate.

use crate::config::RetryTuning;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-invoke the operation after waiting this long
    Retry(Duration),
    /// Give up and surface the failure to the caller
    Abort,
}

/// Decides, after each failure, whether an operation is re-invoked.
///
/// `attempt` is the number of invocations so far (1 after the first failure).
pub trait RetryPolicy<E>: Send + Sync {
    fn decide(&self, attempt: u32, error: &E) -> RetryDecision;
}

/// Classification of an error as worth retrying.
///
/// Implemented by the crate's HTTP error types: network-level failures and
/// 5xx / 408 / 429 statuses are transient, every other status class is not.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Whether an HTTP status is worth another attempt
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error()
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

/// Attempt-bounded policy with a fixed delay ladder.
///
/// Defaults to 4 attempts with waits of 2s, 5s and 10s between them. Aborts
/// early on non-retryable errors, on cancellation, and on anything the
/// optional abort predicate flags (e.g. an out-of-quota response that makes
/// further upload attempts pointless).
pub struct BackoffPolicy<E> {
    max_attempts: u32,
    delays: Vec<Duration>,
    abort_if: Option<Box<dyn Fn(&E) -> bool + Send + Sync>>,
    cancel: Option<CancellationToken>,
}

impl<E: Retryable> BackoffPolicy<E> {
    pub fn new() -> Self {
        Self::from_tuning(&RetryTuning::default())
    }

    /// Build a policy from configured tuning values
    pub fn from_tuning(tuning: &RetryTuning) -> Self {
        Self {
            max_attempts: tuning.max_attempts,
            delays: tuning
                .delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            abort_if: None,
            cancel: None,
        }
    }

    /// Cap the total number of invocations, including the first
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Replace the delay ladder. An empty ladder retries immediately.
    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    /// Abort as soon as `predicate` matches a failure, even a retryable one
    pub fn abort_if(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.abort_if = Some(Box::new(predicate));
        self
    }

    /// Stop retrying once `cancel` is triggered
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let index = (attempt.saturating_sub(1)) as usize;
        self.delays
            .get(index.min(self.delays.len().saturating_sub(1)))
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

impl<E: Retryable> Default for BackoffPolicy<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Retryable> RetryPolicy<E> for BackoffPolicy<E> {
    fn decide(&self, attempt: u32, error: &E) -> RetryDecision {
        if let Some(cancel) = &self.cancel {
            if cancel.is_cancelled() {
                return RetryDecision::Abort;
            }
        }
        if let Some(abort_if) = &self.abort_if {
            if abort_if(error) {
                return RetryDecision::Abort;
            }
        }
        if !error.is_retryable() || attempt >= self.max_attempts {
            return RetryDecision::Abort;
        }
        RetryDecision::Retry(self.delay_for(attempt))
    }
}

/// Run `operation` until it succeeds or `policy` aborts.
///
/// The final failure is returned as-is; nothing is swallowed or rewrapped.
pub async fn with_retry<P, T, E, Op, Fut>(policy: &P, mut operation: Op) -> Result<T, E>
where
    P: RetryPolicy<E> + ?Sized,
    E: std::fmt::Display,
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => match policy.decide(attempt, &error) {
                RetryDecision::Retry(delay) => {
                    tracing::warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Abort => return Err(error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, thiserror::Error)]
    enum FakeError {
        #[error("transient")]
        Transient,
        #[error("fatal")]
        Fatal,
    }

    impl Retryable for FakeError {
        fn is_retryable(&self) -> bool {
            matches!(self, FakeError::Transient)
        }
    }

    fn immediate_policy(max_attempts: u32) -> BackoffPolicy<FakeError> {
        BackoffPolicy::new()
            .with_max_attempts(max_attempts)
            .with_delays(vec![])
    }

    #[tokio::test]
    async fn test_succeeds_after_two_failures() {
        let calls = AtomicU32::new(0);
        let policy = immediate_policy(3);

        let result = with_retry(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FakeError::Transient)
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(tokio_test::assert_ok!(result), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let policy = immediate_policy(3);

        let result: Result<(), _> = with_retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FakeError::Transient) }
        })
        .await;

        tokio_test::assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_aborts_immediately() {
        let calls = AtomicU32::new(0);
        let policy = immediate_policy(5);

        let result: Result<(), _> = with_retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FakeError::Fatal) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_predicate_overrides_retry() {
        let calls = AtomicU32::new(0);
        let policy = immediate_policy(5).abort_if(|e| matches!(e, FakeError::Transient));

        let result: Result<(), _> = with_retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FakeError::Transient) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_retries() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);
        let policy = immediate_policy(5).with_cancellation(cancel);

        let result: Result<(), _> = with_retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FakeError::Transient) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_ladder_reuses_last_entry() {
        let policy: BackoffPolicy<FakeError> = BackoffPolicy::new()
            .with_max_attempts(10)
            .with_delays(vec![Duration::from_millis(2), Duration::from_millis(5)]);

        assert_eq!(policy.delay_for(1), Duration::from_millis(2));
        assert_eq!(policy.delay_for(2), Duration::from_millis(5));
        assert_eq!(policy.delay_for(7), Duration::from_millis(5));
    }

    #[test]
    fn test_retryable_status_classes() {
        use reqwest::StatusCode;

        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }
}
