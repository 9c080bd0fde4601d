//! Chat provider implementations

pub mod anthropic;
pub mod google;
pub mod openai;

use crate::{
    ChatMessage, Completion, Context, Error, Provider, RequestOptions, Result,
};
use async_trait::async_trait;

/// Probe message used by [`ChatClient::test_connection`]
const PROBE_MESSAGE: &str = "hi";
/// Token cap for the connection check
const PROBE_MAX_TOKENS: u32 = 8;

/// Trait for chat providers
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Which provider this client talks to
    fn provider(&self) -> Provider;

    /// Model identifier sent with each request
    fn model(&self) -> &str;

    /// Run one request to completion
    async fn complete(&self, context: &Context, options: &RequestOptions) -> Result<Completion>;

    /// Send `message` after replaying `history`, with `system_prompt` on the
    /// provider's instruction channel. Returns the generated text.
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        message: &str,
        options: &RequestOptions,
    ) -> Result<String> {
        let mut context = Context::with_system(system_prompt);
        context.messages.extend_from_slice(history);
        context.push(ChatMessage::user(message));

        let completion = self.complete(&context, options).await?;
        tracing::debug!(
            "{} replied with {} chars ({} in / {} out tokens)",
            self.provider(),
            completion.text.len(),
            completion.usage.input,
            completion.usage.output
        );
        Ok(completion.text)
    }

    /// Minimal round trip used to validate credentials
    async fn test_connection(&self) -> Result<()> {
        let mut context = Context::default();
        context.push(ChatMessage::user(PROBE_MESSAGE));
        let options = RequestOptions {
            max_tokens: PROBE_MAX_TOKENS,
            temperature: None,
        };
        self.complete(&context, &options).await.map(|_| ())
    }
}

/// Build the client for `provider`
pub fn connect(
    provider: Provider,
    api_key: impl Into<String>,
    model: impl Into<String>,
    base_url: Option<&str>,
) -> Result<Box<dyn ChatClient>> {
    let api_key = api_key.into();
    if api_key.trim().is_empty() {
        return Err(Error::InvalidApiKey);
    }
    let base_url = base_url
        .unwrap_or(provider.default_base_url())
        .trim_end_matches('/')
        .to_string();
    let model = model.into();

    let client: Box<dyn ChatClient> = match provider {
        Provider::Anthropic => Box::new(anthropic::AnthropicProvider::new(api_key, model, base_url)),
        Provider::OpenAI => Box::new(openai::OpenAIProvider::new(api_key, model, base_url)),
        Provider::Google => Box::new(google::GoogleProvider::new(api_key, model, base_url)),
    };
    Ok(client)
}

/// Pull a readable message out of an error response body.
///
/// All three APIs wrap failures as `{"error": {"message": ...}}`; anything
/// else is returned trimmed.
pub(crate) fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Turn an event-source failure into a terminal text event
pub(crate) async fn error_event(error: reqwest_eventsource::Error) -> crate::TextEvent {
    match error {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            crate::TextEvent::Error {
                status: Some(status.as_u16()),
                error_type: None,
                message: error_message_from_body(&body),
            }
        }
        other => crate::TextEvent::Error {
            status: None,
            error_type: None,
            message: other.to_string(),
        },
    }
}
