//! Building provider clients from session settings

use cadgen_ai::{ChatClient, Provider, RetryPolicy, RetryingClient};

use crate::error::{PipelineError, Result};
use crate::session::ProviderSettings;

/// Creates a client for the active provider at the start of each call
pub trait ClientFactory: Send + Sync {
    fn create(&self, provider: Provider, settings: &ProviderSettings) -> Result<Box<dyn ChatClient>>;
}

/// Real HTTP clients, each wrapped in the shared backoff policy
#[derive(Debug, Clone, Default)]
pub struct HttpClientFactory {
    policy: RetryPolicy,
}

impl HttpClientFactory {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl ClientFactory for HttpClientFactory {
    fn create(&self, provider: Provider, settings: &ProviderSettings) -> Result<Box<dyn ChatClient>> {
        let api_key = settings
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(PipelineError::NoCredentials { provider })?;
        let inner = cadgen_ai::providers::connect(
            provider,
            api_key,
            settings.model.as_str(),
            settings.base_url.as_deref(),
        )?;
        Ok(Box::new(RetryingClient::new(inner, self.policy.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_no_credentials() {
        let factory = HttpClientFactory::default();
        let settings = ProviderSettings::for_provider(Provider::Google);
        assert!(matches!(
            factory.create(Provider::Google, &settings),
            Err(PipelineError::NoCredentials {
                provider: Provider::Google
            })
        ));
    }

    #[test]
    fn test_creates_wrapped_client() {
        let factory = HttpClientFactory::default();
        let mut settings = ProviderSettings::for_provider(Provider::Anthropic);
        settings.api_key = Some("sk-test".into());
        let client = factory.create(Provider::Anthropic, &settings).unwrap();
        assert_eq!(client.provider(), Provider::Anthropic);
        assert_eq!(client.model(), "claude-opus-4-6");
    }
}
