//! Embedder adapter: the narrow seam between the pipeline and whatever
//! service turns text into vectors.
//!
//! [`embed_with_retry`] wraps a single [`Embedder`] call with a per-attempt
//! timeout and capped exponential backoff. Only transient failures
//! (upstream unavailable, timeout) are retried.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

const BACKOFF_FACTOR: u32 = 2;

#[derive(Debug, Error)]
pub enum EmbedError {
    /// Upstream failure or transport error. Retryable.
    #[error("embedding service unavailable: {0}")]
    Unavailable(String),

    /// The attempt did not finish in time. Retryable.
    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    Dimension { expected: usize, actual: usize },

    /// The service answered with something that is not a usable vector.
    #[error("invalid embedding response: {0}")]
    Invalid(String),

    #[error("embedding failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<EmbedError> },
}

impl EmbedError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Converts text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Expected output dimension, when known up front.
    fn dim(&self) -> Option<usize> {
        None
    }
}

/// Timeout and backoff settings for embedder calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Limit for a single attempt.
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(2),
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = BACKOFF_FACTOR.saturating_pow(exp);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Embed `text`, retrying transient failures per `policy`.
///
/// A vector that is empty, non-finite, or of the wrong dimension is a
/// permanent failure.
pub async fn embed_with_retry(
    embedder: &dyn Embedder,
    text: &str,
    policy: &RetryPolicy,
) -> Result<Vec<f32>, EmbedError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match tokio::time::timeout(policy.timeout, embedder.embed(text)).await {
            Ok(Ok(vector)) => {
                validate(&vector, embedder.dim())?;
                debug!(attempt, dim = vector.len(), "embedded query");
                return Ok(vector);
            }
            Ok(Err(e)) => e,
            Err(_) => EmbedError::Timeout(policy.timeout),
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if attempt >= attempts {
            return Err(EmbedError::Exhausted {
                attempts,
                last: Box::new(err),
            });
        }

        let delay = policy.backoff(attempt);
        warn!(
            attempt,
            max_attempts = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "embedding attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

fn validate(vector: &[f32], expected: Option<usize>) -> Result<(), EmbedError> {
    if vector.is_empty() {
        return Err(EmbedError::Invalid("empty vector".into()));
    }
    if let Some(expected) = expected
        && vector.len() != expected
    {
        return Err(EmbedError::Dimension {
            expected,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(EmbedError::Invalid("vector contains non-finite values".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Fails with `Unavailable` for the first `failures` calls.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for Flaky {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(EmbedError::Unavailable("connection refused".into()))
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
    }

    struct Slow(Duration);

    #[async_trait]
    impl Embedder for Slow {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            tokio::time::sleep(self.0).await;
            Ok(vec![1.0, 0.0])
        }
    }

    struct Returns(Vec<f32>, Option<usize>);

    #[async_trait]
    impl Embedder for Returns {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Ok(self.0.clone())
        }

        fn dim(&self) -> Option<usize> {
            self.1
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(4), Duration::from_millis(1600));
        assert_eq!(policy.backoff(5), Duration::from_secs(2));
        assert_eq!(policy.backoff(100), Duration::from_secs(2));
    }

    #[test]
    fn only_transient_errors_retry() {
        assert!(EmbedError::Unavailable("x".into()).is_retryable());
        assert!(EmbedError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(
            !EmbedError::Dimension {
                expected: 3,
                actual: 2
            }
            .is_retryable()
        );
        assert!(!EmbedError::Invalid("x".into()).is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let embedder = Flaky::new(2);
        let start = Instant::now();
        let v = embed_with_retry(&embedder, "q", &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(v, vec![1.0, 0.0]);
        assert_eq!(embedder.calls(), 3);
        assert!(start.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let embedder = Flaky::new(10);
        let err = embed_with_retry(&embedder, "q", &RetryPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(embedder.calls(), 3);
        match err {
            EmbedError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, EmbedError::Unavailable(_)));
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_embedder_times_out() {
        let embedder = Slow(Duration::from_secs(30));
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };
        let start = Instant::now();
        let err = embed_with_retry(&embedder, "q", &policy)
            .await
            .unwrap_err();
        match err {
            EmbedError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, EmbedError::Timeout(_)));
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
        // Two 2s timeouts plus one 200ms backoff, nowhere near the 30s sleep.
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_not_retried() {
        let embedder = Returns(vec![1.0, 0.0], Some(3));
        let err = embed_with_retry(&embedder, "q", &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EmbedError::Dimension {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn empty_or_non_finite_vectors_are_invalid() {
        let policy = RetryPolicy::default();
        let err = embed_with_retry(&Returns(vec![], None), "q", &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::Invalid(_)));
        let err = embed_with_retry(&Returns(vec![f32::NAN, 1.0], None), "q", &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::Invalid(_)));
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let embedder = Flaky::new(0);
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(embed_with_retry(&embedder, "q", &policy).await.is_ok());
        assert_eq!(embedder.calls(), 1);
    }
}
