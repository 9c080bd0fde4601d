//! Pipeline state and the stages shared by every entry point

use cadgen_ai::{ChatClient, ChatMessage, RequestOptions};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    artifacts,
    client::ClientFactory,
    convention::Convention,
    error::{PipelineError, Result},
    events::{PipelineEvent, RunKind},
    executor::{ExecOutcome, Executor},
    extract::Extractor,
    patch::{self, Patched},
    prompts, safety,
    session::Session,
};

/// Upper bound on repair attempts per invocation
pub const MAX_REPAIR_ATTEMPTS: u32 = 10;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub convention: Convention,
    /// Options sent with every provider call
    pub request: RequestOptions,
    /// Validate repair responses the way first generations are validated
    pub validate_repairs: bool,
    /// Directory programs run in; relative export paths resolve against it
    pub working_dir: PathBuf,
    /// Directory scanned for meshes when the program names none that exist
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let convention = Convention::build123d();
        Self {
            output_dir: PathBuf::from(convention.output_dir()),
            convention,
            request: RequestOptions::default(),
            validate_repairs: false,
            working_dir: PathBuf::from("."),
        }
    }
}

/// Result of a run that produced a finished part
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Program that ran, after patching
    pub code: String,
    /// Auto-patch changelog
    pub changes: Vec<String>,
    pub result_type: String,
    /// Text the program printed
    pub output: String,
    /// Mesh file to view, if one was found
    pub mesh: Option<PathBuf>,
    /// Repair attempt that succeeded, for repair runs
    pub attempt: Option<u32>,
}

/// A cloneable handle for aborting a pipeline from another task.
#[derive(Clone)]
pub struct PipelineHandle {
    cancel: Arc<Mutex<CancellationToken>>,
    is_running: Arc<AtomicBool>,
}

impl PipelineHandle {
    fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Abort the current run. The in-flight provider call or program is
    /// dropped and the run ends with `Cancelled`.
    pub fn abort(&self) {
        self.cancel.lock().cancel();
    }

    /// Whether a run is in flight
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }
}

/// Clears the running flag when a run ends, however it ends
pub(crate) struct RunGuard<'a> {
    handle: &'a PipelineHandle,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.handle.is_running.store(false, Ordering::Release);
    }
}

/// One patched-and-executed program
pub(crate) struct Attempt {
    pub(crate) patched: Patched,
    pub(crate) result: Result<ExecOutcome>,
}

/// Drives generation, repair, pasted responses and direct programs
pub struct Pipeline {
    pub(crate) config: PipelineConfig,
    pub(crate) extractor: Extractor,
    pub(crate) system_prompt: String,
    pub(crate) clients: Arc<dyn ClientFactory>,
    executor: Arc<dyn Executor>,
    event_tx: broadcast::Sender<PipelineEvent>,
    handle: PipelineHandle,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        clients: Arc<dyn ClientFactory>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            extractor: Extractor::new(&config.convention),
            system_prompt: config.convention.system_prompt(),
            config,
            clients,
            executor,
            event_tx,
            handle: PipelineHandle::new(),
        }
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get a cloneable handle for aborting runs from outside
    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Prompt text for copy-paste into an external chat
    pub fn manual_prompt(&self, request: &str) -> Result<String> {
        if request.trim().is_empty() {
            return Err(PipelineError::EmptyRequest);
        }
        Ok(prompts::manual_prompt(&self.config.convention, request))
    }

    /// Run a response pasted from an external chat: extract, validate, then
    /// patch, gate and execute. No provider is called and history is not
    /// touched. Failures seed the session so the repair loop can take over.
    pub async fn run_pasted(&self, session: &mut Session, response: &str) -> Result<RunOutcome> {
        let (_guard, cancel) = self.begin(RunKind::Pasted, "pasted response")?;
        let code = self.extractor.extract(response);
        if let Err(e) = crate::validate::validate(&self.config.convention, &code, response) {
            return self.finish(Err(e));
        }
        session.last_response = response.to_string();
        self.emit(PipelineEvent::Extracted {
            lines: code.lines().count(),
        });

        let attempt = self.execute_program(&code, &cancel).await;
        let result = match attempt.result {
            Ok(exec) => {
                session.last_code = attempt.patched.code.clone();
                session.last_error.clear();
                Ok(self.outcome(attempt.patched, exec, None))
            }
            Err(e) => {
                self.settle_failure(session, &attempt.patched.code, &e);
                Err(e)
            }
        };
        self.finish(result)
    }

    /// Patch, gate and execute a program written without a model (samples,
    /// parametric wizards). No session is involved.
    pub async fn run_program(&self, label: &str, code: &str) -> Result<RunOutcome> {
        let (_guard, cancel) = self.begin(RunKind::Program, label)?;
        let attempt = self.execute_program(code, &cancel).await;
        let result = attempt
            .result
            .map(|exec| self.outcome(attempt.patched, exec, None));
        self.finish(result)
    }

    // ------------------------------------------------------------------
    // Shared stages
    // ------------------------------------------------------------------

    /// Claim the pipeline for one run and hand out a fresh cancellation token
    pub(crate) fn begin(
        &self,
        kind: RunKind,
        label: &str,
    ) -> Result<(RunGuard<'_>, CancellationToken)> {
        if self
            .handle
            .is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(self.fail(PipelineError::Busy));
        }
        let guard = RunGuard {
            handle: &self.handle,
        };

        let token = CancellationToken::new();
        *self.handle.cancel.lock() = token.clone();

        tracing::info!("{:?} run started: {}", kind, label);
        self.emit(PipelineEvent::RunStart {
            kind,
            label: label.to_string(),
        });
        Ok((guard, token))
    }

    /// One provider round trip, abandoned if the run is cancelled
    pub(crate) async fn call(
        &self,
        client: &dyn ChatClient,
        history: &[ChatMessage],
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.emit(PipelineEvent::Requesting {
            provider: client.provider(),
            model: client.model().to_string(),
        });

        let text = tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            response = client.generate(&self.system_prompt, history, message, &self.config.request) => response?,
        };

        tracing::debug!("received {} chars from {}", text.len(), client.provider());
        self.emit(PipelineEvent::ResponseReceived {
            chars: text.chars().count(),
        });
        Ok(text)
    }

    /// Auto-patch, safety gate, execute
    pub(crate) async fn execute_program(&self, code: &str, cancel: &CancellationToken) -> Attempt {
        let patched = patch::auto_patch(code);
        if !patched.is_unchanged() {
            self.emit(PipelineEvent::Patched {
                changes: patched.changes.clone(),
            });
        }

        if let Err(e) = safety::check(&patched.code) {
            return Attempt {
                patched,
                result: Err(e),
            };
        }

        self.emit(PipelineEvent::Executing);
        let result = self.executor.execute(&patched.code, cancel.clone()).await;
        Attempt { patched, result }
    }

    /// Record a failed execution on the session.
    ///
    /// Repairable failures become the next repair seed. A safety rejection
    /// clears the seed since the rejected program must not be repaired.
    /// Anything else leaves the previous pair alone.
    pub(crate) fn settle_failure(&self, session: &mut Session, code: &str, error: &PipelineError) {
        if error.is_repairable() {
            session.record_failure(code, &error.to_string());
        } else if matches!(error, PipelineError::UnsafeCodeRejected { .. }) {
            session.forget_failure();
        }
    }

    pub(crate) fn outcome(&self, patched: Patched, exec: ExecOutcome, attempt: Option<u32>) -> RunOutcome {
        let mesh = artifacts::find_latest_mesh(
            &patched.code,
            &self.config.working_dir,
            &self.config.output_dir,
            self.config.convention.mesh_extension(),
        );
        RunOutcome {
            code: patched.code,
            changes: patched.changes,
            result_type: exec.result_type,
            output: exec.output,
            mesh,
            attempt,
        }
    }

    /// Emit the terminal event for `result` and pass it through
    pub(crate) fn finish(&self, result: Result<RunOutcome>) -> Result<RunOutcome> {
        match result {
            Ok(outcome) => {
                tracing::info!("run succeeded ({})", outcome.result_type);
                self.emit(PipelineEvent::Succeeded {
                    result_type: outcome.result_type.clone(),
                    mesh: outcome.mesh.clone(),
                    output: outcome.output.clone(),
                    attempt: outcome.attempt,
                });
                Ok(outcome)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Emit a `Failed` event for `error` and return it
    pub(crate) fn fail(&self, error: PipelineError) -> PipelineError {
        tracing::info!("run failed: {}", error.kind());
        self.emit(PipelineEvent::Failed {
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
        error
    }

    pub(crate) fn emit(&self, event: PipelineEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[tokio::test]
    async fn test_run_program_succeeds() {
        let executor = StubExecutor::always_ok();
        let pipeline = pipeline_with(ScriptedFactory::new(vec![]), executor.clone());

        let outcome = pipeline.run_program("box", "part.fillet(radius=1)").await.unwrap();
        assert_eq!(outcome.code, "fillet(part.edges(), radius=1)");
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(executor.programs(), vec!["fillet(part.edges(), radius=1)"]);
        assert!(!pipeline.is_running());
    }

    #[tokio::test]
    async fn test_run_program_safety_gate() {
        let executor = StubExecutor::always_ok();
        let pipeline = pipeline_with(ScriptedFactory::new(vec![]), executor.clone());

        let err = pipeline
            .run_program("evil", "import subprocess")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsafeCodeRejected { .. }));
        assert!(executor.programs().is_empty());
    }

    #[tokio::test]
    async fn test_run_pasted_seeds_repair() {
        let executor = StubExecutor::scripted(vec![Err(PipelineError::Runtime(
            "Traceback\nNameError: Bx".into(),
        ))]);
        let pipeline = pipeline_with(ScriptedFactory::new(vec![]), executor);
        let mut session = session_with_key();

        let err = pipeline
            .run_pasted(&mut session, &fenced("from build123d import *\nBx(1)"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Runtime(_)));
        assert_eq!(session.last_code, "from build123d import *\nBx(1)");
        assert!(session.last_error.contains("NameError"));
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn test_run_pasted_rejects_prose() {
        let pipeline = pipeline_with(ScriptedFactory::new(vec![]), StubExecutor::always_ok());
        let mut session = session_with_key();

        let err = pipeline
            .run_pasted(&mut session, "looks good to me")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyExtraction { .. }));
    }

    #[tokio::test]
    async fn test_run_pasted_validation_failure_starts_with_run_start() {
        let pipeline = pipeline_with(ScriptedFactory::new(vec![]), StubExecutor::always_ok());
        let mut rx = pipeline.subscribe();
        let mut session = session_with_key();

        pipeline.run_pasted(&mut session, "no code here").await.unwrap_err();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(
            events.first(),
            Some(PipelineEvent::RunStart {
                kind: RunKind::Pasted,
                ..
            })
        ));
        assert!(matches!(events.last(), Some(PipelineEvent::Failed { .. })));
        assert!(!pipeline.is_running());
    }

    #[tokio::test]
    async fn test_run_pasted_busy_while_running() {
        let pipeline = pipeline_with(ScriptedFactory::new(vec![]), StubExecutor::always_ok());
        let mut session = session_with_key();
        let (_guard, _cancel) = pipeline.begin(RunKind::Program, "first").unwrap();

        let err = pipeline
            .run_pasted(&mut session, "no code here")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Busy));
    }

    #[tokio::test]
    async fn test_abort_during_provider_call() {
        let factory = BlockingFactory::new();
        let pipeline = Pipeline::new(
            PipelineConfig::default(),
            Arc::new(factory.clone()),
            Arc::new(StubExecutor::always_ok()),
        );
        let handle = pipeline.handle();
        let mut session = session_with_key();
        session.record_failure("Bx(1)", "NameError: Bx");
        let history_before = session.history.clone();

        let (result, _) = tokio::join!(pipeline.generate(&mut session, "a 10mm cube"), async {
            factory.started().await;
            assert!(handle.is_running());
            handle.abort();
        });

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(!pipeline.is_running());
        assert_eq!(session.history, history_before);
        assert_eq!(session.last_code, "Bx(1)");
        assert_eq!(session.last_error, "NameError: Bx");
    }

    /// Scripted clients behind the real backoff wrapper
    struct BackoffFactory {
        inner: ScriptedFactory,
        policy: cadgen_ai::RetryPolicy,
    }

    impl ClientFactory for BackoffFactory {
        fn create(
            &self,
            provider: cadgen_ai::Provider,
            settings: &crate::session::ProviderSettings,
        ) -> Result<Box<dyn ChatClient>> {
            let inner = self.inner.create(provider, settings)?;
            Ok(Box::new(cadgen_ai::RetryingClient::new(inner, self.policy.clone())))
        }
    }

    #[tokio::test]
    async fn test_abort_during_backoff_sleep() {
        let scripted = ScriptedFactory::new(vec![
            Err(cadgen_ai::Error::from_status(429, "slow down")),
            Ok(fenced(MINIMAL_PROGRAM)),
        ]);
        let factory = BackoffFactory {
            inner: scripted.clone(),
            policy: cadgen_ai::RetryPolicy {
                max_attempts: 3,
                delays: vec![std::time::Duration::from_secs(60)],
                retryable_statuses: vec![429],
            },
        };
        let executor = StubExecutor::always_ok();
        let pipeline = Pipeline::new(PipelineConfig::default(), Arc::new(factory), Arc::new(executor.clone()));
        let handle = pipeline.handle();
        let mut session = session_with_key();

        let (result, _) = tokio::join!(pipeline.generate(&mut session, "a 10mm cube"), async {
            while scripted.calls().is_empty() {
                tokio::task::yield_now().await;
            }
            handle.abort();
        });

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(scripted.calls().len(), 1);
        assert!(executor.programs().is_empty());
        assert!(session.history.is_empty());
        assert!(!pipeline.is_running());
    }

    #[tokio::test]
    async fn test_abort_during_repair_call() {
        let factory = BlockingFactory::new();
        let executor = StubExecutor::always_ok();
        let pipeline = Pipeline::new(
            PipelineConfig::default(),
            Arc::new(factory.clone()),
            Arc::new(executor.clone()),
        );
        let handle = pipeline.handle();
        let mut session = session_with_key();
        session.record_failure("Bx(1)", "NameError: Bx");

        let (result, _) = tokio::join!(pipeline.repair(&mut session, 3), async {
            factory.started().await;
            handle.abort();
        });

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(!pipeline.is_running());
        assert!(executor.programs().is_empty());
        assert!(session.history.is_empty());
        assert_eq!(session.last_code, "Bx(1)");
    }

    #[tokio::test]
    async fn test_busy_rejects_second_run() {
        let pipeline = pipeline_with(ScriptedFactory::new(vec![]), StubExecutor::always_ok());
        let (_guard, _cancel) = pipeline.begin(RunKind::Program, "first").unwrap();

        let err = pipeline.run_program("second", MINIMAL_PROGRAM).await.unwrap_err();
        assert!(matches!(err, PipelineError::Busy));
        assert!(pipeline.is_running());
    }

    #[tokio::test]
    async fn test_events_end_with_terminal() {
        let pipeline = pipeline_with(ScriptedFactory::new(vec![]), StubExecutor::always_ok());
        let mut rx = pipeline.subscribe();

        pipeline.run_program("box", MINIMAL_PROGRAM).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(
            events.first(),
            Some(PipelineEvent::RunStart {
                kind: RunKind::Program,
                ..
            })
        ));
        assert!(events.contains(&PipelineEvent::Executing));
        assert!(events.last().is_some_and(|e| e.is_terminal()));
    }

    #[test]
    fn test_manual_prompt_requires_request() {
        let pipeline = pipeline_with(ScriptedFactory::new(vec![]), StubExecutor::always_ok());
        assert!(matches!(
            pipeline.manual_prompt("   "),
            Err(PipelineError::EmptyRequest)
        ));
        assert!(pipeline.manual_prompt("a bracket").unwrap().contains("a bracket"));
    }
}
