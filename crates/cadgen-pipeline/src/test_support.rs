//! Stub provider and executor shared by the orchestrator tests

use async_trait::async_trait;
use cadgen_ai::{ChatClient, ChatMessage, Completion, Context, Provider, RequestOptions, StopReason, Usage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::{
    client::ClientFactory,
    error::{PipelineError, Result},
    executor::{ExecOutcome, Executor},
    pipeline::{Pipeline, PipelineConfig},
    session::{ProviderSettings, Session},
};

pub const MINIMAL_PROGRAM: &str =
    "from build123d import *\nwith BuildPart() as part:\n    Box(10, 10, 10)";

pub fn fenced(code: &str) -> String {
    format!("Here is the model:\n```python\n{}\n```\n", code)
}

pub fn session_with_key() -> Session {
    let mut session = Session::new(Provider::Anthropic);
    session.set_api_key(Provider::Anthropic, "sk-test");
    session
}

pub fn pipeline_with(factory: ScriptedFactory, executor: StubExecutor) -> Pipeline {
    Pipeline::new(PipelineConfig::default(), Arc::new(factory), Arc::new(executor))
}

/// One recorded provider call
#[derive(Debug, Clone)]
pub struct Call {
    pub system_prompt: Option<String>,
    pub history: Vec<ChatMessage>,
    pub message: String,
}

/// Hands out clients that answer from a shared script
#[derive(Clone)]
pub struct ScriptedFactory {
    responses: Arc<Mutex<VecDeque<cadgen_ai::Result<String>>>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl ScriptedFactory {
    pub fn new(responses: Vec<cadgen_ai::Result<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every call answers with `text`
    pub fn repeating(text: &str, times: usize) -> Self {
        Self::new((0..times).map(|_| Ok(text.to_string())).collect())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

impl ClientFactory for ScriptedFactory {
    fn create(&self, provider: Provider, settings: &ProviderSettings) -> Result<Box<dyn ChatClient>> {
        Ok(Box::new(ScriptedClient {
            provider,
            model: settings.model.clone(),
            responses: self.responses.clone(),
            calls: self.calls.clone(),
        }))
    }
}

struct ScriptedClient {
    provider: Provider,
    model: String,
    responses: Arc<Mutex<VecDeque<cadgen_ai::Result<String>>>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

#[async_trait]
impl ChatClient for ScriptedClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, context: &Context, _options: &RequestOptions) -> cadgen_ai::Result<Completion> {
        let mut messages = context.messages.clone();
        let message = messages.pop().map(|m| m.content).unwrap_or_default();
        self.calls.lock().push(Call {
            system_prompt: context.system_prompt.clone(),
            history: messages,
            message,
        });

        let text = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(cadgen_ai::Error::UnexpectedResponse("script exhausted".into())))?;
        Ok(Completion {
            text,
            stop_reason: StopReason::Stop,
            usage: Usage::default(),
        })
    }
}

/// Hands out clients whose calls never finish until the run is aborted
#[derive(Clone, Default)]
pub struct BlockingFactory {
    started: Arc<Notify>,
}

impl BlockingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once a call is in flight
    pub async fn started(&self) {
        self.started.notified().await;
    }
}

impl ClientFactory for BlockingFactory {
    fn create(&self, provider: Provider, settings: &ProviderSettings) -> Result<Box<dyn ChatClient>> {
        Ok(Box::new(BlockingClient {
            provider,
            model: settings.model.clone(),
            started: self.started.clone(),
        }))
    }
}

struct BlockingClient {
    provider: Provider,
    model: String,
    started: Arc<Notify>,
}

#[async_trait]
impl ChatClient for BlockingClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, _context: &Context, _options: &RequestOptions) -> cadgen_ai::Result<Completion> {
        self.started.notify_one();
        std::future::pending().await
    }
}

/// Executor that answers from a script and records what it was given.
/// Once the script runs out every program succeeds.
#[derive(Clone)]
pub struct StubExecutor {
    results: Arc<Mutex<VecDeque<Result<()>>>>,
    programs: Arc<Mutex<Vec<String>>>,
}

impl StubExecutor {
    pub fn always_ok() -> Self {
        Self::scripted(vec![])
    }

    pub fn scripted(results: Vec<Result<()>>) -> Self {
        Self {
            results: Arc::new(Mutex::new(results.into())),
            programs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fails with a runtime error `failures` times, then succeeds
    pub fn failing(failures: usize) -> Self {
        Self::scripted(
            (1..=failures)
                .map(|n| Err(PipelineError::Runtime(format!("Traceback\nValueError: failure {}", n))))
                .collect(),
        )
    }

    pub fn programs(&self) -> Vec<String> {
        self.programs.lock().clone()
    }
}

#[async_trait]
impl Executor for StubExecutor {
    async fn execute(&self, code: &str, cancel: CancellationToken) -> Result<ExecOutcome> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.programs.lock().push(code.to_string());
        let scripted = self.results.lock().pop_front().unwrap_or(Ok(()));
        scripted.map(|_| ExecOutcome {
            result_type: "Part".to_string(),
            output: String::new(),
            duration: Duration::ZERO,
        })
    }
}
