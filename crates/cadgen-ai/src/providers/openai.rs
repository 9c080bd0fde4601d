//! OpenAI Chat Completions API provider

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    providers::{ChatClient, error_event},
    stream::{Completion, TextEvent, TextEventStream, collect_text},
    types::{Context, Provider, RequestOptions, StopReason, Usage},
};

/// OpenAI API client
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider
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

    /// Stream a response from OpenAI
    pub async fn stream(
        &self,
        context: &Context,
        options: &RequestOptions,
    ) -> Result<TextEventStream> {
        let request = self.build_request(context, options);
        let url = format!("{}/chat/completions", self.base_url);

        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| Error::InvalidApiKey)?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let request_builder = self.client.post(&url).headers(headers).json(&request);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }

    fn build_request(&self, context: &Context, options: &RequestOptions) -> OpenAIRequest {
        let mut messages = Vec::with_capacity(context.messages.len() + 1);

        // System prompt travels as the leading system message
        if let Some(ref system_prompt) = context.system_prompt {
            messages.push(OpenAIMessage {
                role: "system",
                content: system_prompt.clone(),
            });
        }

        messages.extend(context.messages.iter().map(|m| OpenAIMessage {
            role: m.role.as_str(),
            content: m.content.clone(),
        }));

        OpenAIRequest {
            model: self.model.clone(),
            messages,
            stream: true,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream_options: StreamOptions {
                include_usage: true,
            },
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIProvider {
    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, context: &Context, options: &RequestOptions) -> Result<Completion> {
        collect_text(self.stream(context, options).await?).await
    }
}

fn create_stream(mut event_source: EventSource) -> impl futures::Stream<Item = TextEvent> {
    stream! {
        let mut accumulated_text = String::new();
        let mut finish_reason: Option<String> = None;
        let mut usage = Usage::default();

        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }

                    match serde_json::from_str::<StreamChunk>(&msg.data) {
                        Ok(chunk) => {
                            for choice in &chunk.choices {
                                if let Some(ref content) = choice.delta.content {
                                    accumulated_text.push_str(content);
                                    yield TextEvent::Delta {
                                        delta: content.clone(),
                                    };
                                }
                                if let Some(ref reason) = choice.finish_reason {
                                    finish_reason = Some(reason.clone());
                                }
                            }

                            if let Some(ref u) = chunk.usage {
                                usage.input = u.prompt_tokens;
                                usage.output = u.completion_tokens;
                            }
                        }
                        Err(e) => {
                            event_source.close();
                            yield TextEvent::Error {
                                status: None,
                                error_type: None,
                                message: format!("Failed to parse chunk: {}", e),
                            };
                            return;
                        }
                    }
                }
                Err(e) => {
                    event_source.close();
                    yield error_event(e).await;
                    return;
                }
            }
        }

        event_source.close();
        yield TextEvent::Done {
            text: accumulated_text,
            stop_reason: map_finish_reason(finish_reason.as_deref()),
            usage,
        };
    }
}

fn map_finish_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("length") => StopReason::Length,
        _ => StopReason::Stop,
    }
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[test]
    fn test_system_prompt_is_first_message() {
        let provider = OpenAIProvider::new("key", "gpt-4o", "https://api.openai.com/v1");
        let mut context = Context::with_system("only code");
        context.push(ChatMessage::user("a box"));

        let request = provider.build_request(&context, &RequestOptions::default());
        let roles: Vec<_> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user"]);
        assert_eq!(request.messages[0].content, "only code");
        assert_eq!(request.max_tokens, 4096);
    }

    #[test]
    fn test_parse_stream_chunk() {
        let data = r#"{"choices":[{"index":0,"delta":{"content":"```py"},"finish_reason":null}]}"#;
        let chunk: StreamChunk = serde_json::from_str(data).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("```py"));
        assert!(chunk.usage.is_none());
    }

    #[test]
    fn test_parse_usage_only_chunk() {
        let data = r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":40}}"#;
        let chunk: StreamChunk = serde_json::from_str(data).unwrap();
        assert!(chunk.choices.is_empty());
        assert_eq!(chunk.usage.unwrap().completion_tokens, 40);
    }

    #[test]
    fn test_map_finish_reason() {
        assert_eq!(map_finish_reason(Some("length")), StopReason::Length);
        assert_eq!(map_finish_reason(Some("stop")), StopReason::Stop);
        assert_eq!(map_finish_reason(None), StopReason::Stop);
    }
}
