use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Per-resource minimum spacing between calls.
///
/// Each resource (a model name, a search engine) gets an optional minimum interval.
/// `acquire` reserves the next free slot under the lock and sleeps outside it, so
/// concurrent callers queue up one interval apart instead of racing.
#[derive(Debug, Default)]
pub struct RateLimiter {
    limits: Mutex<HashMap<String, Duration>>,
    next_slot: Mutex<HashMap<String, Instant>>,
}

/// Minimum spacing for a requests-per-minute budget.
pub fn per_minute(requests_per_minute: u32) -> Duration {
    if requests_per_minute == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs(60) / requests_per_minute
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(self, resource: impl Into<String>, min_interval: Duration) -> Self {
        self.set_limit(resource, min_interval);
        self
    }

    pub fn set_limit(&self, resource: impl Into<String>, min_interval: Duration) {
        let mut limits = self.limits.lock().unwrap_or_else(|e| e.into_inner());
        limits.insert(resource.into(), min_interval);
    }

    pub fn limit_for(&self, resource: &str) -> Option<Duration> {
        let limits = self.limits.lock().unwrap_or_else(|e| e.into_inner());
        limits.get(resource).copied().filter(|d| !d.is_zero())
    }

    /// Wait until `resource` may be called again. Unlimited resources return immediately.
    pub async fn acquire(&self, resource: &str) {
        let Some(interval) = self.limit_for(resource) else {
            return;
        };
        let wait = self.reserve(resource, interval, Instant::now());
        if !wait.is_zero() {
            tracing::info!(
                resource,
                wait_ms = wait.as_millis() as u64,
                "rate limiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    // Claims the earliest slot at or after `now` and returns how long to wait for it.
    fn reserve(&self, resource: &str, interval: Duration, now: Instant) -> Duration {
        let mut slots = self.next_slot.lock().unwrap_or_else(|e| e.into_inner());
        let slot = match slots.get(resource) {
            Some(next) if *next > now => *next,
            _ => now,
        };
        slots.insert(resource.to_string(), slot + interval);
        slot.saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn per_minute_spacing() {
        assert_eq!(per_minute(15), Duration::from_secs(4));
        assert_eq!(per_minute(60), Duration::from_secs(1));
        assert_eq!(per_minute(0), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_resource_is_not_throttled() {
        let limiter = RateLimiter::new().with_limit("model-a", Duration::from_secs(4));
        let t0 = Instant::now();
        for _ in 0..5 {
            limiter.acquire("model-b").await;
        }
        assert_eq!(t0.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_calls_are_spaced() {
        let limiter = RateLimiter::new().with_limit("model-a", Duration::from_secs(4));
        let t0 = Instant::now();
        limiter.acquire("model-a").await;
        assert_eq!(t0.elapsed(), Duration::ZERO);
        limiter.acquire("model-a").await;
        assert!(t0.elapsed() >= Duration::from_secs(4));
        limiter.acquire("model-a").await;
        assert!(t0.elapsed() >= Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_get_distinct_slots() {
        let limiter = Arc::new(RateLimiter::new().with_limit("m", Duration::from_secs(2)));
        let t0 = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let l = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                l.acquire("m").await;
                Instant::now()
            }));
        }
        let mut done = Vec::new();
        for h in handles {
            done.push(h.await.unwrap().duration_since(t0));
        }
        done.sort();
        assert_eq!(done[0], Duration::ZERO);
        assert!(done[1] >= Duration::from_secs(2));
        assert!(done[2] >= Duration::from_secs(4));
    }

    #[test]
    fn reserve_after_idle_gap_does_not_wait() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        assert_eq!(limiter.reserve("m", Duration::from_secs(1), now), Duration::ZERO);
        let later = now + Duration::from_secs(5);
        assert_eq!(limiter.reserve("m", Duration::from_secs(1), later), Duration::ZERO);
    }
}
