use deepscout_core::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff applied around one fallible call site.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retryable: fn(&Error) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
            retryable: Error::is_retryable,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    /// No waiting between attempts. Handy for tests and offline runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_predicate(mut self, retryable: fn(&Error) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Delay before attempt `attempt + 1`, given `attempt` failures so far (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let d = self.base_delay.saturating_mul(1u32 << exp);
        d.min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts && (self.retryable)(&e) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_grow_and_cap() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1), Duration::from_secs(4));
        assert_eq!(p.delay_for(2), Duration::from_secs(8));
        assert_eq!(p.delay_for(3), Duration::from_secs(10));
        assert_eq!(p.delay_for(40), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_without_surfacing_errors() {
        let calls = AtomicU32::new(0);
        let out = RetryPolicy::default()
            .run("llm", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(Error::Llm(format!("transient {n}")))
                } else {
                    Ok("report")
                }
            })
            .await
            .unwrap();
        assert_eq!(out, "report");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_failures() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::default()
            .run("llm", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Llm("down".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::immediate(5)
            .run("cfg", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::NotConfigured("missing key".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_predicate_is_honoured() {
        let calls = AtomicU32::new(0);
        let _ = RetryPolicy::immediate(4)
            .with_predicate(|e| matches!(e, Error::Search(_)))
            .run("search", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Search("blocked".into()))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
