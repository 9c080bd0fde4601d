//! cadgen-ai: chat-completion clients
//!
//! Uniform access to the Anthropic, OpenAI and Google chat APIs. Every
//! provider streams its response and the client collects it into a single
//! text completion; rate-limit handling is applied uniformly by
//! [`retry::RetryingClient`].

pub mod error;
pub mod providers;
pub mod retry;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use providers::ChatClient;
pub use retry::{RetryPolicy, RetryingClient};
pub use stream::{Completion, TextEvent, TextEventStream};
pub use types::*;
