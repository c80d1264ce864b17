//! The seam between request assembly and the hosted model.
//!
//! A [`ChatBackend`] takes a fully-built [`ChatRequest`] and returns a stream
//! of text deltas. Two implementations ship with the crate:
//! [`crate::chat::gemini::GeminiBackend`] (native streaming) and
//! [`crate::chat::provider::ProviderBackend`] (any edgequake-llm provider).
//! Tests plug in their own.

use crate::chat::message::ChatRequest;
use crate::error::PdfChatError;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use tokio::time::{sleep, Duration};
use tokio_stream::Stream;
use tracing::warn;

/// A boxed stream of reply text deltas.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, PdfChatError>> + Send>>;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short provider name for logs and errors, e.g. "gemini".
    fn name(&self) -> &str;

    /// Model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Send `request` and stream the reply.
    ///
    /// Errors returned here happened before any text was produced; errors
    /// inside the stream mean the reply broke off part-way.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<TextStream, PdfChatError>;
}

/// Retry policy for opening a request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    /// Upper bound on any single wait, including a server's `Retry-After`.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `backoff_ms * 2^(attempt-1)`,
    /// or the server's `Retry-After` when it asked for one. Never more than
    /// `max_delay`.
    pub fn delay(&self, attempt: u32, err: &PdfChatError) -> Duration {
        let wanted = match err {
            PdfChatError::RateLimitExceeded {
                retry_after_secs: Some(secs),
                ..
            } => Duration::from_secs(*secs),
            _ => {
                let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
                Duration::from_millis(self.backoff_ms.saturating_mul(factor))
            }
        };
        wanted.min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
///
/// Only errors with [`PdfChatError::is_retryable`] are retried.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, PdfChatError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PdfChatError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay(attempt, &e);
                warn!(
                    "{}: retry {}/{} after {}ms: {}",
                    label,
                    attempt,
                    policy.max_retries,
                    delay.as_millis(),
                    e
                );
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            backoff_ms: 1,
            max_delay: Duration::from_secs(60),
        }
    }

    #[test]
    fn delay_doubles() {
        let p = RetryPolicy {
            max_retries: 3,
            backoff_ms: 500,
            max_delay: Duration::from_secs(60),
        };
        let e = PdfChatError::ApiTimeout { elapsed_ms: 1 };
        assert_eq!(p.delay(1, &e), Duration::from_millis(500));
        assert_eq!(p.delay(2, &e), Duration::from_millis(1000));
        assert_eq!(p.delay(3, &e), Duration::from_millis(2000));
    }

    #[test]
    fn delay_honours_retry_after() {
        let e = PdfChatError::RateLimitExceeded {
            provider: "gemini".into(),
            retry_after_secs: Some(7),
        };
        assert_eq!(policy().delay(1, &e), Duration::from_secs(7));
    }

    #[test]
    fn delay_is_capped() {
        let p = RetryPolicy {
            max_retries: 10,
            backoff_ms: 1_000,
            max_delay: Duration::from_secs(30),
        };
        let e = PdfChatError::RateLimitExceeded {
            provider: "gemini".into(),
            retry_after_secs: Some(3600),
        };
        assert_eq!(p.delay(1, &e), Duration::from_secs(30));

        let e = PdfChatError::ServiceUnavailable {
            status: 503,
            message: "busy".into(),
        };
        assert_eq!(p.delay(9, &e), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry(policy(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(PdfChatError::ServiceUnavailable {
                        status: 503,
                        message: "busy".into(),
                    })
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(PdfChatError::AuthError {
                    provider: "gemini".into(),
                    detail: "bad key".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(PdfChatError::AuthError { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_run_out() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PdfChatError::ApiTimeout { elapsed_ms: 5 }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
