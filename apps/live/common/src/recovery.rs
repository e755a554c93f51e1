use crate::ServiceError;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Bounded reconnection with exponential backoff and jitter.
///
/// `max_attempts` counts reconnection attempts after the initial try, so an
/// operation runs at most `max_attempts + 1` times.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    randomization_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1), Duration::from_secs(5))
    }
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            randomization_factor: 0.5,
        }
    }

    pub fn with_randomization(mut self, factor: f64) -> Self {
        self.randomization_factor = factor.clamp(0.0, 1.0);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the `failures`-th reconnection attempt (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let delay = std::cmp::min(
            self.base_delay.saturating_mul(1u32 << exponent),
            self.max_delay,
        );

        if self.randomization_factor <= 0.0 {
            return delay;
        }

        let jitter = rand::rng().random_range(-self.randomization_factor..=self.randomization_factor);
        std::cmp::min(delay.mul_f64(1.0 + jitter), self.max_delay)
    }

    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, ServiceError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<T, ServiceError>> + Send,
    {
        let mut failures = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    failures += 1;
                    if failures > self.max_attempts {
                        return Err(ServiceError::ConnectionFailed { attempts: failures });
                    }

                    let delay = self.delay_for(failures);
                    warn!(
                        "Connection failed (attempt {}/{}): {}. Retrying in {:?}",
                        failures, self.max_attempts, e, delay
                    );

                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(max_attempts, Duration::from_millis(10), Duration::from_millis(100))
            .with_randomization(0.0)
    }

    #[tokio::test]
    async fn test_successful_operation() {
        let policy = fast_policy(3);
        let result = policy.execute(|| async { Ok::<_, ServiceError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let policy = fast_policy(3);

        let attempts_clone = attempts.clone();
        let operation = move || {
            let attempts = attempts_clone.clone();
            async move {
                let current = attempts.fetch_add(1, Ordering::SeqCst);
                if current == 0 {
                    Err(ServiceError::WebSocket("First attempt fails".into()))
                } else {
                    Ok(42)
                }
            }
        };

        let result = policy.execute(operation).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_max_attempts_reached() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = fast_policy(3);

        let calls_clone = calls.clone();
        let result = policy
            .execute(move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), ServiceError>(ServiceError::WebSocket("Always fails".into()))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::ConnectionFailed { attempts: 4 })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = ReconnectPolicy::new(5, Duration::from_secs(1), Duration::from_secs(5))
            .with_randomization(0.0);

        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = ReconnectPolicy::default();
        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1500));
        }
    }
}
