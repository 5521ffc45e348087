use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::CrawlerError;

/// リトライ設定
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt)
    }

    /// `op` をリトライ可能なエラーの間だけ繰り返す。引数は0始まりの試行回数
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, CrawlerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CrawlerError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    if attempt + 1 < self.max_attempts {
                        let backoff = self.backoff(attempt);
                        warn!(
                            "{} attempt {} failed, retrying in {:?}: {}",
                            label,
                            attempt + 1,
                            backoff,
                            e
                        );
                        sleep(backoff).await;
                    }
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(CrawlerError::RetriesExhausted {
            attempts: self.max_attempts,
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Max retries exceeded".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_stale_errors() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result = policy
            .run("item", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(CrawlerError::StaleElement("li.item".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("item", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CrawlerError::Timeout("title".into())) }
            })
            .await;

        match result {
            Err(CrawlerError::RetriesExhausted { attempts, message }) => {
                assert_eq!(attempts, 3);
                assert!(message.contains("title"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_returns_immediately() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("item", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CrawlerError::AdultVerification("nid.naver.com".into())) }
            })
            .await;

        assert!(matches!(result, Err(CrawlerError::AdultVerification(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        assert_eq!(policy.backoff(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2), Duration::from_millis(4000));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }
}
