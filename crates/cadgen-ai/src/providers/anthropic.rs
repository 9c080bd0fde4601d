//! Anthropic Messages API provider

use crate::{
    error::{Error, Result},
    providers::{ChatClient, error_event},
    stream::{Completion, TextEvent, TextEventStream, collect_text},
    types::{ChatMessage, Context, Provider, RequestOptions, Role, StopReason, Usage},
};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

const API_VERSION: &str = "2023-06-01";

/// Anthropic API client
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    /// Stream a response from Claude
    pub async fn stream(
        &self,
        context: &Context,
        options: &RequestOptions,
    ) -> Result<TextEventStream> {
        let request = self.build_request(context, options);
        let url = format!("{}/v1/messages", self.base_url);

        tracing::debug!("Anthropic API URL: {}", url);

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|_| Error::InvalidApiKey)?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert("accept", HeaderValue::from_static("text/event-stream"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let request_builder = self.client.post(&url).headers(headers).json(&request);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }

    fn build_request(&self, context: &Context, options: &RequestOptions) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            messages: convert_messages(&context.messages),
            max_tokens: options.max_tokens,
            stream: true,
            system: context.system_prompt.clone(),
            temperature: options.temperature,
        }
    }
}

#[async_trait]
impl ChatClient for AnthropicProvider {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, context: &Context, options: &RequestOptions) -> Result<Completion> {
        collect_text(self.stream(context, options).await?).await
    }
}

/// Create the event stream from SSE events
fn create_stream(mut event_source: EventSource) -> impl futures::Stream<Item = TextEvent> {
    stream! {
        let mut usage = Usage::default();
        let mut stop_reason = StopReason::Stop;
        let mut text = String::new();

        while let Some(event_result) = event_source.next().await {
            match event_result {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => match message.event.as_str() {
                    "message_start" => {
                        if let Ok(data) = serde_json::from_str::<MessageStartEvent>(&message.data) {
                            usage.input = data.message.usage.input_tokens;
                            usage.output = data.message.usage.output_tokens;
                        }
                    }
                    "content_block_delta" => {
                        if let Ok(data) = serde_json::from_str::<ContentBlockDeltaEvent>(&message.data) {
                            if data.delta.delta_type == "text_delta" {
                                let delta = data.delta.text.unwrap_or_default();
                                text.push_str(&delta);
                                yield TextEvent::Delta { delta };
                            }
                        }
                    }
                    "message_delta" => {
                        if let Ok(data) = serde_json::from_str::<MessageDeltaEvent>(&message.data) {
                            if let Some(reason) = data.delta.stop_reason {
                                stop_reason = map_stop_reason(&reason);
                            }
                            usage.output = data.usage.output_tokens;
                        }
                    }
                    "message_stop" => break,
                    "error" => {
                        event_source.close();
                        let (error_type, message) = match serde_json::from_str::<ErrorEvent>(&message.data) {
                            Ok(data) => (data.error.error_type, data.error.message),
                            Err(_) => ("error".to_string(), message.data.clone()),
                        };
                        yield TextEvent::Error {
                            status: None,
                            error_type: Some(error_type),
                            message,
                        };
                        return;
                    }
                    _ => {}
                },
                Err(e) => {
                    event_source.close();
                    yield error_event(e).await;
                    return;
                }
            }
        }

        event_source.close();
        yield TextEvent::Done {
            text,
            stop_reason,
            usage,
        };
    }
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, PartialEq)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

// ============================================================================
// Response event types
// ============================================================================

#[derive(Debug, Deserialize)]
struct MessageStartEvent {
    message: MessageInfo,
}

#[derive(Debug, Deserialize)]
struct MessageInfo {
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDeltaEvent {
    delta: DeltaInfo,
}

#[derive(Debug, Deserialize)]
struct DeltaInfo {
    #[serde(rename = "type")]
    delta_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaEvent {
    delta: MessageDelta,
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEvent {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

// ============================================================================
// Conversion functions
// ============================================================================

fn convert_messages(messages: &[ChatMessage]) -> Vec<AnthropicMessage> {
    messages
        .iter()
        .map(|m| AnthropicMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: m.content.clone(),
        })
        .collect()
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "max_tokens" => StopReason::Length,
        _ => StopReason::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_keeps_system_separate() {
        let provider = AnthropicProvider::new("key", "claude-opus-4-6", "https://api.anthropic.com");
        let mut context = Context::with_system("be terse");
        context.push(ChatMessage::user("box"));
        context.push(ChatMessage::assistant("```python\n```"));
        context.push(ChatMessage::user("again"));

        let request = provider.build_request(&context, &RequestOptions::default());
        assert_eq!(request.system.as_deref(), Some("be terse"));
        assert_eq!(request.max_tokens, 4096);
        assert_eq!(
            request.messages.iter().map(|m| m.role).collect::<Vec<_>>(),
            vec!["user", "assistant", "user"]
        );

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], true);
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_map_stop_reason() {
        assert_eq!(map_stop_reason("max_tokens"), StopReason::Length);
        assert_eq!(map_stop_reason("end_turn"), StopReason::Stop);
    }
}
