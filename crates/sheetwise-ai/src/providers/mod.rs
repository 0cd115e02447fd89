//! Completion provider implementations

pub mod local;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::bridge::{CompletionProvider, CompletionRequest, CompletionResult};
use crate::config::{AnalysisConfig, ProviderKind};
use crate::error::CompletionError;

pub use local::OfflineProvider;
pub use openai::{OpenAiProvider, decode_completion};

/// Factory function to create the configured completion provider
pub fn create_provider(config: &AnalysisConfig) -> Result<Arc<dyn CompletionProvider>, CompletionError> {
    match config.provider {
        ProviderKind::OpenAi => {
            let provider = OpenAiProvider::from_config(config)?;
            Ok(Arc::new(Retrying::new(provider, RetryPolicy::from_config(config))))
        }
        ProviderKind::Local => Ok(Arc::new(OfflineProvider::new())),
    }
}

/// Bounded exponential backoff for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Wraps a provider and retries calls that fail before a response arrives.
///
/// Protocol and upstream errors are returned immediately: the provider
/// answered, and repeating the call could bill twice.
pub struct Retrying<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: CompletionProvider> Retrying<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait::async_trait]
impl<P: CompletionProvider> CompletionProvider for Retrying<P> {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult, CompletionError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request).await {
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient completion failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy { max_retries: 3, base_delay: Duration::from_millis(100) };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert!(policy.delay_for(40) > policy.delay_for(2));
    }

    #[test]
    fn test_factory_picks_provider() {
        let local = AnalysisConfig { provider: ProviderKind::Local, ..AnalysisConfig::default() };
        assert_eq!(create_provider(&local).unwrap().name(), "local");

        let openai = AnalysisConfig::default();
        assert_eq!(create_provider(&openai).unwrap().name(), "openai");
    }
}
