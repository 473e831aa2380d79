//! Retry wrapper — bounded retries with exponential backoff.
//!
//! Wraps any `LanguageModel` and re-issues failed calls up to a configured
//! limit. Only transport-shaped failures are retried; authentication and
//! malformed-request errors surface immediately. Generation requests are
//! retry-safe by contract, so re-sending the same request is sound.

use async_trait::async_trait;
use crabdesk_core::error::ProviderError;
use crabdesk_core::provider::{Generation, GenerationRequest, LanguageModel};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A language model wrapped in retry-with-backoff.
pub struct RetryModel {
    inner: Arc<dyn LanguageModel>,
    max_retries: u32,
    base_delay: Duration,
    attempt_timeout: Duration,
}

impl RetryModel {
    pub fn new(inner: Arc<dyn LanguageModel>, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            base_delay: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(60),
        }
    }

    /// Override the backoff base delay (doubles per attempt).
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Override the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

#[async_trait]
impl LanguageModel for RetryModel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<Generation, ProviderError> {
        let mut last_error = ProviderError::NotConfigured("No attempts made".into());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt - 1);
                info!(
                    attempt,
                    max = self.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying generation after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.attempt_timeout, self.inner.generate(request.clone()))
                .await
            {
                Ok(Ok(generation)) => return Ok(generation),
                Ok(Err(e)) => {
                    if !e.is_retryable() {
                        warn!(error = %e, "Generation failed with non-retryable error");
                        return Err(e);
                    }
                    warn!(error = %e, attempt, "Generation attempt failed");
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        attempt,
                        timeout_secs = self.attempt_timeout.as_secs(),
                        "Generation attempt timed out"
                    );
                    last_error = ProviderError::Timeout(format!(
                        "Attempt {} timed out after {}s",
                        attempt + 1,
                        self.attempt_timeout.as_secs()
                    ));
                }
            }
        }

        Err(last_error)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails `failures` times, then succeeds.
    struct FlakyModel {
        failures: Mutex<u32>,
        error: ProviderError,
    }

    impl FlakyModel {
        fn new(failures: u32, error: ProviderError) -> Self {
            Self { failures: Mutex::new(failures), error }
        }
    }

    #[async_trait]
    impl LanguageModel for FlakyModel {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> std::result::Result<Generation, ProviderError> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(self.error.clone());
            }
            Ok(Generation {
                text: "recovered".into(),
                self_confidence: None,
                model: "flaky-1".into(),
                usage: None,
            })
        }
    }

    /// Hangs forever (for timeout testing).
    struct HangingModel;

    #[async_trait]
    impl LanguageModel for HangingModel {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> std::result::Result<Generation, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "test".into(),
            system: String::new(),
            messages: vec![],
            temperature: 0.0,
            max_tokens: None,
            stop: vec![],
        }
    }

    #[tokio::test]
    async fn recovers_from_transient_failures() {
        let inner = Arc::new(FlakyModel::new(2, ProviderError::Network("conn reset".into())));
        let model = RetryModel::new(inner, 3).with_base_delay(Duration::from_millis(1));

        let generation = model.generate(request()).await.unwrap();
        assert_eq!(generation.text, "recovered");
    }

    #[tokio::test]
    async fn exhausts_retries_then_fails() {
        let inner = Arc::new(FlakyModel::new(10, ProviderError::Network("down".into())));
        let model = RetryModel::new(inner, 2).with_base_delay(Duration::from_millis(1));

        let err = model.generate(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }

    #[tokio::test]
    async fn non_retryable_error_surfaces_immediately() {
        let inner = Arc::new(FlakyModel::new(10, ProviderError::AuthenticationFailed("bad key".into())));
        let model = RetryModel::new(inner.clone(), 5).with_base_delay(Duration::from_millis(1));

        let err = model.generate(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
        // Only one attempt was made.
        assert_eq!(*inner.failures.lock().unwrap(), 9);
    }

    #[tokio::test]
    async fn attempt_timeout_counts_as_failure() {
        let model = RetryModel::new(Arc::new(HangingModel), 1)
            .with_base_delay(Duration::from_millis(1))
            .with_attempt_timeout(Duration::from_millis(20));

        let err = model.generate(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[test]
    fn backoff_doubles() {
        let model = RetryModel::new(
            Arc::new(HangingModel),
            3,
        )
        .with_base_delay(Duration::from_millis(100));
        assert_eq!(model.backoff(0), Duration::from_millis(100));
        assert_eq!(model.backoff(1), Duration::from_millis(200));
        assert_eq!(model.backoff(2), Duration::from_millis(400));
    }
}
