//! Provider retry — bounded exponential backoff for transient failures.
//!
//! Wraps any provider. Transient failures (timeouts, rate limits, network
//! errors, 5xx) are retried up to `max_attempts` total attempts with a
//! doubling delay capped at `max_backoff`; anything else is returned at once.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use swarmline_core::error::ProviderError;
use swarmline_core::provider::*;
use tracing::{info, warn};

/// Backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
        }
    }
}

impl From<&swarmline_config::RetryConfig> for RetryPolicy {
    fn from(config: &swarmline_config::RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
        }
    }
}

/// A provider that retries its inner provider on transient failures.
pub struct RetryingProvider {
    inner: Arc<dyn swarmline_core::Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn swarmline_core::Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl swarmline_core::Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut attempt = 1;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => {
                    if attempt > 1 {
                        info!(provider = %self.inner.name(), attempt, "Retry: provider recovered");
                    }
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let mut delay = self.policy.backoff(attempt);
                    if let ProviderError::RateLimited { retry_after_secs } = &e {
                        delay = delay.max(Duration::from_secs(*retry_after_secs)).min(self.policy.max_backoff);
                    }
                    warn!(
                        provider = %self.inner.name(),
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retry: transient provider failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use swarmline_core::Provider;

    /// Fails with the given error `failures` times, then succeeds.
    struct FlakyProvider {
        failures: u32,
        error: ProviderError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl swarmline_core::Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(self.error.clone());
            }
            Ok(ProviderResponse {
                content: "ok".into(),
                usage: None,
                model: request.model,
            })
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "m".into(),
            messages: vec![],
            temperature: 0.0,
            max_tokens: None,
            tools: vec![],
        }
    }

    fn flaky(failures: u32, error: ProviderError) -> Arc<FlakyProvider> {
        Arc::new(FlakyProvider {
            failures,
            error,
            calls: AtomicU32::new(0),
        })
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let inner = flaky(2, ProviderError::Network("reset".into()));
        let provider = RetryingProvider::new(inner.clone(), RetryPolicy::default());
        let resp = provider.complete(request()).await.unwrap();
        assert_eq!(resp.content, "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let inner = flaky(10, ProviderError::Timeout("slow".into()));
        let provider = RetryingProvider::new(inner.clone(), RetryPolicy::default());
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let inner = flaky(10, ProviderError::AuthenticationFailed("bad key".into()));
        let provider = RetryingProvider::new(inner.clone(), RetryPolicy::default());
        assert!(provider.complete(request()).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn policy_from_config() {
        let config = swarmline_config::RetryConfig::default();
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy, RetryPolicy::default());
    }
}
