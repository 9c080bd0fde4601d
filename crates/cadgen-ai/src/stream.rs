//! Streaming event types and collection into a completion

use crate::error::{Error, Result};
use crate::types::{StopReason, Usage};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted while a provider streams its response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextEvent {
    /// Text content delta
    Delta { delta: String },
    /// Response completed successfully
    Done {
        text: String,
        stop_reason: StopReason,
        usage: Usage,
    },
    /// Provider or transport failure
    Error {
        /// HTTP status when the provider answered with one
        status: Option<u16>,
        /// Provider error type, when reported in-stream
        error_type: Option<String>,
        message: String,
    },
}

impl TextEvent {
    /// Check if this is a terminal event (Done or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TextEvent::Done { .. } | TextEvent::Error { .. })
    }

    /// Convert an `Error` event into the matching crate error
    fn into_error(self) -> Option<Error> {
        match self {
            TextEvent::Error {
                status: Some(status),
                message,
                ..
            } => Some(Error::from_status(status, message)),
            TextEvent::Error {
                status: None,
                error_type: Some(error_type),
                message,
            } => Some(Error::api(error_type, message)),
            TextEvent::Error { message, .. } => Some(Error::Sse(message)),
            _ => None,
        }
    }
}

/// A stream of text events
pub type TextEventStream = Pin<Box<dyn Stream<Item = TextEvent> + Send>>;

/// A finished text response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

/// Drain a text event stream into a single completion.
///
/// The first terminal event decides the outcome. A stream that ends without
/// one yields whatever text arrived so far.
pub async fn collect_text(mut stream: TextEventStream) -> Result<Completion> {
    let mut text = String::new();

    while let Some(event) = stream.next().await {
        match event {
            TextEvent::Delta { delta } => text.push_str(&delta),
            TextEvent::Done {
                text: full,
                stop_reason,
                usage,
            } => {
                let text = if full.is_empty() { text } else { full };
                return Ok(Completion {
                    text,
                    stop_reason,
                    usage,
                });
            }
            error @ TextEvent::Error { .. } => {
                // into_error always yields Some for the Error variant
                return Err(error
                    .into_error()
                    .unwrap_or_else(|| Error::Sse("stream failed".to_string())));
            }
        }
    }

    tracing::debug!("stream ended without a terminal event ({} chars)", text.len());
    Ok(Completion {
        text,
        stop_reason: StopReason::Stop,
        usage: Usage::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_of(events: Vec<TextEvent>) -> TextEventStream {
        Box::pin(tokio_stream::iter(events))
    }

    #[tokio::test]
    async fn test_collect_uses_done_text() {
        let stream = stream_of(vec![
            TextEvent::Delta {
                delta: "Hel".into(),
            },
            TextEvent::Delta { delta: "lo".into() },
            TextEvent::Done {
                text: "Hello".into(),
                stop_reason: StopReason::Stop,
                usage: Usage { input: 3, output: 1 },
            },
        ]);
        let completion = collect_text(stream).await.unwrap();
        assert_eq!(completion.text, "Hello");
        assert_eq!(completion.usage.input, 3);
    }

    #[tokio::test]
    async fn test_collect_falls_back_to_deltas() {
        let stream = stream_of(vec![
            TextEvent::Delta { delta: "ab".into() },
            TextEvent::Delta { delta: "c".into() },
            TextEvent::Done {
                text: String::new(),
                stop_reason: StopReason::Length,
                usage: Usage::default(),
            },
        ]);
        let completion = collect_text(stream).await.unwrap();
        assert_eq!(completion.text, "abc");
        assert_eq!(completion.stop_reason, StopReason::Length);
    }

    #[tokio::test]
    async fn test_collect_maps_status_error() {
        let stream = stream_of(vec![TextEvent::Error {
            status: Some(429),
            error_type: None,
            message: "quota".into(),
        }]);
        let err = collect_text(stream).await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_collect_maps_in_stream_error_type() {
        let stream = stream_of(vec![
            TextEvent::Delta { delta: "x".into() },
            TextEvent::Error {
                status: None,
                error_type: Some("overloaded_error".into()),
                message: "Overloaded".into(),
            },
        ]);
        let err = collect_text(stream).await.unwrap_err();
        assert_eq!(err.status(), Some(529));
    }

    #[tokio::test]
    async fn test_collect_without_terminal_event() {
        let stream = stream_of(vec![TextEvent::Delta {
            delta: "partial".into(),
        }]);
        let completion = collect_text(stream).await.unwrap();
        assert_eq!(completion.text, "partial");
    }
}
