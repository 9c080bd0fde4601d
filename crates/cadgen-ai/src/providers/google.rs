//! Google Gemini API provider

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
    types::{ChatMessage, Context, Provider, RequestOptions, Role, StopReason, Usage},
};

/// Google Gemini API client
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GoogleProvider {
    /// Create a new Google provider
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

    /// Stream a response from Gemini
    pub async fn stream(
        &self,
        context: &Context,
        options: &RequestOptions,
    ) -> Result<TextEventStream> {
        let request = self.build_request(context, options);
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|_| Error::InvalidApiKey)?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let request_builder = self.client.post(&url).headers(headers).json(&request);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }

    fn build_request(&self, context: &Context, options: &RequestOptions) -> GeminiRequest {
        let contents = context.messages.iter().map(convert_message).collect();

        let system_instruction = context.system_prompt.as_ref().map(|prompt| GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: prompt.clone(),
            }],
        });

        GeminiRequest {
            contents,
            system_instruction,
            generation_config: GeminiGenerationConfig {
                max_output_tokens: options.max_tokens,
                temperature: options.temperature,
            },
        }
    }
}

#[async_trait]
impl ChatClient for GoogleProvider {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, context: &Context, options: &RequestOptions) -> Result<Completion> {
        collect_text(self.stream(context, options).await?).await
    }
}

fn convert_message(msg: &ChatMessage) -> GeminiContent {
    // Gemini calls the assistant role "model"
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "model",
    };
    GeminiContent {
        role: Some(role),
        parts: vec![GeminiPart {
            text: msg.content.clone(),
        }],
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
                    if msg.data.is_empty() {
                        continue;
                    }

                    match serde_json::from_str::<GeminiStreamResponse>(&msg.data) {
                        Ok(response) => {
                            for candidate in &response.candidates {
                                if let Some(ref content) = candidate.content {
                                    for part in &content.parts {
                                        if let Some(ref text) = part.text {
                                            accumulated_text.push_str(text);
                                            yield TextEvent::Delta {
                                                delta: text.clone(),
                                            };
                                        }
                                    }
                                }
                                if let Some(ref reason) = candidate.finish_reason {
                                    finish_reason = Some(reason.clone());
                                }
                            }

                            if let Some(ref meta) = response.usage_metadata {
                                usage.input = meta.prompt_token_count.unwrap_or(0);
                                usage.output = meta.candidates_token_count.unwrap_or(0);
                            }
                        }
                        Err(e) => {
                            event_source.close();
                            if let Ok(error_response) = serde_json::from_str::<GeminiErrorResponse>(&msg.data) {
                                yield TextEvent::Error {
                                    status: error_response.error.code,
                                    error_type: error_response.error.status,
                                    message: error_response.error.message,
                                };
                                return;
                            }
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
        Some("MAX_TOKENS") => StopReason::Length,
        _ => StopReason::Stop,
    }
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    code: Option<u16>,
    status: Option<String>,
    message: String,
}
